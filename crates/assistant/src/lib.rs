pub mod client;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod service;
pub mod session;
pub mod types;

pub use client::AssistantClient;
pub use service::{AssistantService, ServiceError};
pub use session::DocumentSession;
pub use types::{ConversationId, InvalidId, Message, MessageId, Role, RunHandle, RunState};

pub mod error;
pub mod executor;
pub mod extractor;
pub mod orchestrator;
pub mod poller;

pub use error::{OrchestratorError, Result};
pub use executor::{ExecutorPool, ExecutorScope, SerialExecutor};
pub use extractor::ResultExtractor;
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use poller::RunPoller;

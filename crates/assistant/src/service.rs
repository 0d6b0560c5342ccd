use async_trait::async_trait;
use thiserror::Error;

use crate::types::{ConversationId, InvalidId, Message, MessageId, Role, RunHandle, RunState};

/// Transport-level failures talking to the assistant service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{operation} failed with status {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("unexpected response from {operation}: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    InvalidId(#[from] InvalidId),
}

impl ServiceError {
    pub fn decode(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Decode {
            operation,
            message: message.into(),
        }
    }

    /// Whether repeating the same call could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode { .. } => false,
            Self::Config(_) => false,
            Self::InvalidId(_) => false,
        }
    }
}

/// The request/poll/fetch contract of a stateful assistant service.
#[async_trait]
pub trait AssistantService: Send + Sync {
    async fn create_message(
        &self,
        conversation: &ConversationId,
        role: Role,
        text: &str,
    ) -> Result<MessageId, ServiceError>;

    async fn start_run(&self, conversation: &ConversationId) -> Result<RunHandle, ServiceError>;

    async fn get_run_status(
        &self,
        conversation: &ConversationId,
        run: &RunHandle,
    ) -> Result<RunState, ServiceError>;

    /// Messages of the conversation, newest first.
    async fn list_messages(&self, conversation: &ConversationId)
    -> Result<Vec<Message>, ServiceError>;

    async fn cancel_run(
        &self,
        conversation: &ConversationId,
        run: &RunHandle,
    ) -> Result<(), ServiceError>;
}

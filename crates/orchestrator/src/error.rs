use assistant::{RunState, ServiceError};
use thiserror::Error;

/// Failures of one submitted operation. None of them stop the executor.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("transport failure: {0}")]
    TransportFailure(#[from] ServiceError),

    #[error("run ended with status: {0}")]
    RunTerminatedAbnormally(RunState),

    #[error("assistant requested a capability that is not implemented")]
    UnsupportedCapabilityRequested,

    #[error("polling timed out after {attempts} attempts")]
    PollingTimedOut { attempts: u32 },

    #[error("operation cancelled")]
    Cancelled,

    #[error("executor is no longer running")]
    ExecutorClosed,

    #[error("operation panicked: {0}")]
    ActionPanicked(String),
}

impl OrchestratorError {
    /// Whether the caller may sensibly ask again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransportFailure(_) => true,
            Self::RunTerminatedAbnormally(_) => true,
            Self::UnsupportedCapabilityRequested => false,
            Self::PollingTimedOut { .. } => true,
            Self::Cancelled => true,
            Self::ExecutorClosed => false,
            Self::ActionPanicked(_) => false,
        }
    }

    /// Short error code for logging and API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::TransportFailure(_) => "transport_failure",
            Self::RunTerminatedAbnormally(_) => "run_terminated_abnormally",
            Self::UnsupportedCapabilityRequested => "unsupported_capability_requested",
            Self::PollingTimedOut { .. } => "polling_timed_out",
            Self::Cancelled => "cancelled",
            Self::ExecutorClosed => "executor_closed",
            Self::ActionPanicked(_) => "action_panicked",
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

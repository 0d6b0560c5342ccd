use assistant::{AssistantService, ConversationId, RunHandle, RunState};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{OrchestratorError, Result};
use crate::extractor::ResultExtractor;

/// Polls a started run until it reaches a terminal state, then fetches the
/// assistant's reply.
#[derive(Clone)]
pub struct RunPoller {
    service: Arc<dyn AssistantService>,
    extractor: ResultExtractor,
    interval: Duration,
    max_attempts: Option<u32>,
}

impl RunPoller {
    pub fn new(service: Arc<dyn AssistantService>, interval: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            extractor: ResultExtractor::new(service.clone()),
            service,
            interval,
            max_attempts,
        }
    }

    /// Wait for `run` to finish. With no attempt bound this only ends on a
    /// terminal state or when `cancel` fires.
    pub async fn await_run(
        &self,
        conversation: &ConversationId,
        run: &RunHandle,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let mut attempts: u32 = 0;

        loop {
            let status = self.service.get_run_status(conversation, run).await?;
            attempts += 1;
            debug!(conversation = %conversation, run = %run, attempt = attempts, status = %status, "Polled run");

            match status {
                RunState::Completed => {
                    info!(conversation = %conversation, run = %run, attempts, "Run completed");
                    return self.extractor.fetch(conversation).await;
                }
                RunState::Failed | RunState::Cancelled | RunState::Expired => {
                    warn!(conversation = %conversation, run = %run, status = %status, "Run ended abnormally");
                    return Err(OrchestratorError::RunTerminatedAbnormally(status));
                }
                RunState::NeedsUnsupportedAction => {
                    warn!(conversation = %conversation, run = %run, "Run requires an action that is not implemented");
                    self.cancel_remote(conversation, run).await;
                    return Err(OrchestratorError::UnsupportedCapabilityRequested);
                }
                RunState::Queued | RunState::Running => {}
            }

            if self.max_attempts.is_some_and(|max| attempts >= max) {
                warn!(conversation = %conversation, run = %run, attempts, "Polling timed out");
                self.cancel_remote(conversation, run).await;
                return Err(OrchestratorError::PollingTimedOut { attempts });
            }

            tokio::select! {
                _ = sleep(self.interval) => {}
                _ = cancel.cancelled() => {
                    info!(conversation = %conversation, run = %run, "Polling cancelled");
                    self.cancel_remote(conversation, run).await;
                    return Err(OrchestratorError::Cancelled);
                }
            }
        }
    }

    /// Best effort: a run left active would block the next message on the
    /// same conversation.
    async fn cancel_remote(&self, conversation: &ConversationId, run: &RunHandle) {
        if let Err(e) = self.service.cancel_run(conversation, run).await {
            warn!(conversation = %conversation, run = %run, error = %e, "Failed to cancel run");
        }
    }
}

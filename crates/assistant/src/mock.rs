use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::service::{AssistantService, ServiceError};
use crate::types::{ConversationId, Message, MessageId, Role, RunHandle, RunState};

/// One pre-scripted run: the statuses reported by successive polls and the
/// message appended once the run completes.
#[derive(Debug, Clone)]
pub struct ScriptedRun {
    statuses: VecDeque<RunState>,
    reply: Option<Message>,
    fail_on_message: bool,
}

impl ScriptedRun {
    /// Reports each status in turn; the last one repeats.
    pub fn with_statuses(statuses: impl IntoIterator<Item = RunState>) -> Self {
        Self {
            statuses: statuses.into_iter().collect(),
            reply: None,
            fail_on_message: false,
        }
    }

    /// Completes on the first poll with an assistant text reply.
    pub fn completes_with(reply: impl Into<String>) -> Self {
        Self::with_statuses([RunState::Completed]).reply(Message::assistant(reply))
    }

    /// The message submission for this run fails with a 500.
    pub fn transport_failure() -> Self {
        Self {
            statuses: VecDeque::new(),
            reply: None,
            fail_on_message: true,
        }
    }

    pub fn reply(mut self, message: Message) -> Self {
        self.reply = Some(message);
        self
    }
}

/// Every call the mock received, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceCall {
    CreateMessage { conversation: ConversationId, text: String },
    StartRun { conversation: ConversationId, run: RunHandle },
    GetRunStatus { run: RunHandle },
    ListMessages { conversation: ConversationId },
    CancelRun { run: RunHandle },
}

#[derive(Default)]
struct ScriptState {
    pending: VecDeque<ScriptedRun>,
    active: HashMap<RunHandle, (ConversationId, ScriptedRun)>,
    messages: HashMap<ConversationId, Vec<Message>>,
    calls: Vec<ServiceCall>,
    next_run: usize,
}

/// Deterministic in-memory assistant service for tests. Each started run
/// consumes the next [`ScriptedRun`] from the front of the queue.
#[derive(Default)]
pub struct ScriptedAssistant {
    state: Mutex<ScriptState>,
    latency: Duration,
}

impl ScriptedAssistant {
    pub fn new(runs: impl IntoIterator<Item = ScriptedRun>) -> Self {
        Self {
            state: Mutex::new(ScriptState {
                pending: runs.into_iter().collect(),
                ..ScriptState::default()
            }),
            latency: Duration::ZERO,
        }
    }

    /// Delay every call, so that interleavings become observable.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn push_run(&self, run: ScriptedRun) {
        self.state().pending.push_back(run);
    }

    pub fn calls(&self) -> Vec<ServiceCall> {
        self.state().calls.clone()
    }

    /// Number of status polls issued so far.
    pub fn poll_count(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| matches!(c, ServiceCall::GetRunStatus { .. }))
            .count()
    }

    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl AssistantService for ScriptedAssistant {
    async fn create_message(
        &self,
        conversation: &ConversationId,
        role: Role,
        text: &str,
    ) -> Result<MessageId, ServiceError> {
        self.simulate_latency().await;
        let mut state = self.state();
        state.calls.push(ServiceCall::CreateMessage {
            conversation: conversation.clone(),
            text: text.to_string(),
        });

        if state.pending.front().is_some_and(|r| r.fail_on_message) {
            state.pending.pop_front();
            return Err(ServiceError::Status {
                operation: "create message",
                status: 500,
                body: "scripted failure".to_string(),
            });
        }

        let history = state.messages.entry(conversation.clone()).or_default();
        history.push(Message {
            role,
            text: Some(text.to_string()),
        });
        Ok(MessageId::new(format!("msg_{}", history.len())))
    }

    async fn start_run(&self, conversation: &ConversationId) -> Result<RunHandle, ServiceError> {
        self.simulate_latency().await;
        let mut state = self.state();
        let script = state
            .pending
            .pop_front()
            .ok_or_else(|| ServiceError::Config("no scripted run left".to_string()))?;

        state.next_run += 1;
        let run = RunHandle::new(format!("run_{}", state.next_run));
        state.calls.push(ServiceCall::StartRun {
            conversation: conversation.clone(),
            run: run.clone(),
        });
        state
            .active
            .insert(run.clone(), (conversation.clone(), script));
        Ok(run)
    }

    async fn get_run_status(
        &self,
        _conversation: &ConversationId,
        run: &RunHandle,
    ) -> Result<RunState, ServiceError> {
        self.simulate_latency().await;
        let mut guard = self.state();
        let state = &mut *guard;
        state
            .calls
            .push(ServiceCall::GetRunStatus { run: run.clone() });

        let (conversation, script) = state
            .active
            .get_mut(run)
            .ok_or_else(|| ServiceError::decode("get run", format!("unknown run {}", run)))?;

        let status = if script.statuses.len() > 1 {
            script.statuses.pop_front()
        } else {
            script.statuses.front().copied()
        }
        .unwrap_or(RunState::Completed);

        if status == RunState::Completed {
            if let Some(reply) = script.reply.take() {
                state
                    .messages
                    .entry(conversation.clone())
                    .or_default()
                    .push(reply);
            }
        }
        Ok(status)
    }

    async fn list_messages(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<Message>, ServiceError> {
        self.simulate_latency().await;
        let mut state = self.state();
        state.calls.push(ServiceCall::ListMessages {
            conversation: conversation.clone(),
        });

        let mut messages = state
            .messages
            .get(conversation)
            .cloned()
            .unwrap_or_default();
        messages.reverse();
        Ok(messages)
    }

    async fn cancel_run(
        &self,
        _conversation: &ConversationId,
        run: &RunHandle,
    ) -> Result<(), ServiceError> {
        let mut state = self.state();
        state.calls.push(ServiceCall::CancelRun { run: run.clone() });
        if let Some((_, script)) = state.active.get_mut(run) {
            script.statuses = VecDeque::from([RunState::Cancelled]);
            script.reply = None;
        }
        Ok(())
    }
}

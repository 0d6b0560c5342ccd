//! Serial execution of conversation operations.
//!
//! A [`SerialExecutor`] owns a FIFO queue and a single in-flight slot. Every
//! submitted action runs to completion before the next one starts, and each
//! outcome is routed back to the caller that submitted it.

use assistant::ConversationId;
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{OrchestratorError, Result};

type Action = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, Result<String>> + Send>;

/// Called by the worker whenever it finishes an operation.
type IdleHook = Box<dyn Fn() + Send + Sync>;

/// One queued unit of work. Consumed exactly once by the worker.
struct OperationDescriptor {
    conversation: ConversationId,
    action: Action,
    cancel: CancellationToken,
    reply: oneshot::Sender<Result<String>>,
}

#[derive(Default)]
struct ExecutorState {
    pending: AtomicUsize,
    busy: AtomicBool,
}

#[derive(Clone)]
pub struct SerialExecutor {
    queue: mpsc::UnboundedSender<OperationDescriptor>,
    state: Arc<ExecutorState>,
}

impl SerialExecutor {
    /// Start the worker. Must be called within a tokio runtime.
    pub fn new() -> Self {
        Self::spawn(None)
    }

    fn spawn(on_idle: Option<IdleHook>) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        let state = Arc::new(ExecutorState::default());
        tokio::spawn(run_worker(rx, state.clone(), on_idle));
        Self { queue, state }
    }

    /// Enqueue an action. The queue position is taken when this is called,
    /// not when the returned future is first polled.
    pub fn submit<F, Fut>(
        &self,
        conversation: &ConversationId,
        action: F,
    ) -> impl Future<Output = Result<String>> + Send + use<F, Fut>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        self.submit_with_token(conversation, CancellationToken::new(), action)
    }

    /// Like [`submit`](Self::submit), with a token the caller can cancel.
    /// Dropping the returned future cancels the token as well.
    pub fn submit_with_token<F, Fut>(
        &self,
        conversation: &ConversationId,
        cancel: CancellationToken,
        action: F,
    ) -> impl Future<Output = Result<String>> + Send + use<F, Fut>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        let (reply, receiver) = oneshot::channel();
        let descriptor = OperationDescriptor {
            conversation: conversation.clone(),
            action: Box::new(move |token: CancellationToken| -> BoxFuture<'static, Result<String>> {
                Box::pin(action(token))
            }),
            cancel,
            reply,
        };

        self.state.pending.fetch_add(1, Ordering::SeqCst);
        let queued = self.queue.send(descriptor).map_err(|_| {
            self.state.pending.fetch_sub(1, Ordering::SeqCst);
            OrchestratorError::ExecutorClosed
        });

        async move {
            queued?;
            receiver.await.map_err(|_| OrchestratorError::ExecutorClosed)?
        }
    }

    /// Operations waiting behind the in-flight one.
    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::SeqCst)
    }

    pub fn is_busy(&self) -> bool {
        self.state.busy.load(Ordering::SeqCst)
    }

    fn is_idle(&self) -> bool {
        self.pending() == 0 && !self.is_busy()
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<OperationDescriptor>,
    state: Arc<ExecutorState>,
    on_idle: Option<IdleHook>,
) {
    let settle = || {
        state.busy.store(false, Ordering::SeqCst);
        if let Some(hook) = &on_idle {
            hook();
        }
    };

    while let Some(mut op) = rx.recv().await {
        // Busy is raised before pending drops so the executor never looks
        // idle while an operation is being picked up.
        state.busy.store(true, Ordering::SeqCst);
        state.pending.fetch_sub(1, Ordering::SeqCst);

        if op.reply.is_closed() || op.cancel.is_cancelled() {
            debug!(conversation = %op.conversation, "Skipping abandoned operation");
            settle();
            let _ = op.reply.send(Err(OrchestratorError::Cancelled));
            continue;
        }

        debug!(conversation = %op.conversation, "Operation started");

        let cancel = op.cancel.clone();
        let mut task = tokio::spawn((op.action)(cancel.clone()));

        let joined = tokio::select! {
            joined = &mut task => joined,
            _ = op.reply.closed() => {
                debug!(conversation = %op.conversation, "Caller went away, cancelling operation");
                cancel.cancel();
                task.await
            }
        };

        let outcome = joined.unwrap_or_else(|e| {
            warn!(conversation = %op.conversation, error = %e, "Operation panicked");
            Err(OrchestratorError::ActionPanicked(e.to_string()))
        });

        if let Err(e) = &outcome {
            debug!(conversation = %op.conversation, error = %e, "Operation failed");
        }

        settle();
        let _ = op.reply.send(outcome);
    }
}

/// Whether operations are serialized across all conversations or only
/// within each conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorScope {
    #[default]
    Global,
    PerConversation,
}

/// Routes each operation to the executor responsible for its conversation.
///
/// In `PerConversation` scope an executor lives only while its conversation
/// has work queued or in flight. The worker drops its own map entry once it
/// drains, and the next submission for that conversation starts a new one.
pub struct ExecutorPool {
    scope: ExecutorScope,
    global: SerialExecutor,
    by_conversation: Arc<DashMap<ConversationId, SerialExecutor>>,
}

impl ExecutorPool {
    pub fn new(scope: ExecutorScope) -> Self {
        Self {
            scope,
            global: SerialExecutor::new(),
            by_conversation: Arc::new(DashMap::new()),
        }
    }

    pub fn scope(&self) -> ExecutorScope {
        self.scope
    }

    /// Conversations that currently hold an executor of their own.
    pub fn active_conversations(&self) -> usize {
        self.by_conversation.len()
    }

    pub fn submit<F, Fut>(
        &self,
        conversation: &ConversationId,
        action: F,
    ) -> impl Future<Output = Result<String>> + Send + use<F, Fut>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        self.submit_with_token(conversation, CancellationToken::new(), action)
    }

    pub fn submit_with_token<F, Fut>(
        &self,
        conversation: &ConversationId,
        cancel: CancellationToken,
        action: F,
    ) -> impl Future<Output = Result<String>> + Send + use<F, Fut>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        match self.scope {
            ExecutorScope::Global => {
                debug!(conversation = %conversation, pending = self.global.pending(), "Queueing operation");
                self.global.submit_with_token(conversation, cancel, action)
            }
            ExecutorScope::PerConversation => {
                // The entry guard is held until the operation is queued, so an
                // idle worker cannot remove the executor in between.
                let executor = self
                    .by_conversation
                    .entry(conversation.clone())
                    .or_insert_with(|| self.released_executor(conversation));
                debug!(conversation = %conversation, pending = executor.pending(), "Queueing operation");
                executor.submit_with_token(conversation, cancel, action)
            }
        }
    }

    fn released_executor(&self, conversation: &ConversationId) -> SerialExecutor {
        let map = Arc::downgrade(&self.by_conversation);
        let key = conversation.clone();
        SerialExecutor::spawn(Some(Box::new(move || {
            let Some(map) = map.upgrade() else {
                return;
            };
            if map.remove_if(&key, |_, executor| executor.is_idle()).is_some() {
                debug!(conversation = %key, "Released idle executor");
            }
        })))
    }
}

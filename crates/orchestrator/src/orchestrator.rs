use assistant::{AssistantService, ConversationId, Role};
use extract::{Graph, KeywordEntry, KeywordFormat, Parsed};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::Result;
use crate::executor::{ExecutorPool, ExecutorScope};
use crate::poller::RunPoller;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub poll_interval_ms: u64,
    /// `None` polls until the run ends or the caller gives up.
    pub max_poll_attempts: Option<u32>,
    pub scope: ExecutorScope,
    pub keyword_format: KeywordFormat,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_poll_attempts: Some(60),
            scope: ExecutorScope::Global,
            keyword_format: KeywordFormat::default(),
        }
    }
}

/// Runs every request against a conversation through the serial executor:
/// submit a message, start a run, poll it, fetch and parse the reply.
pub struct Orchestrator {
    service: Arc<dyn AssistantService>,
    executors: ExecutorPool,
    poller: RunPoller,
    keyword_format: KeywordFormat,
}

impl Orchestrator {
    /// Must be called within a tokio runtime.
    pub fn new(service: Arc<dyn AssistantService>, config: &OrchestratorConfig) -> Self {
        let poller = RunPoller::new(
            service.clone(),
            Duration::from_millis(config.poll_interval_ms),
            config.max_poll_attempts,
        );

        Self {
            service,
            executors: ExecutorPool::new(config.scope),
            poller,
            keyword_format: config.keyword_format,
        }
    }

    pub fn keyword_format(&self) -> KeywordFormat {
        self.keyword_format
    }

    pub async fn request_summary(&self, conversation: &ConversationId) -> Result<Parsed<String>> {
        let raw = self.ask(conversation, extract::prompt::SUMMARY_PROMPT).await?;
        Ok(extract::parse_summary(&raw))
    }

    pub async fn request_keywords(
        &self,
        conversation: &ConversationId,
    ) -> Result<Parsed<Vec<KeywordEntry>>> {
        let raw = self.ask(conversation, &self.keyword_format.prompt()).await?;
        Ok(self.keyword_format.parse(&raw))
    }

    pub async fn request_graph(&self, conversation: &ConversationId) -> Result<Parsed<Graph>> {
        let raw = self.ask(conversation, extract::prompt::GRAPH_PROMPT).await?;
        Ok(extract::parse_graph(&raw))
    }

    pub async fn request_chat_reply(
        &self,
        conversation: &ConversationId,
        user_text: &str,
    ) -> Result<Parsed<String>> {
        let raw = self.ask(conversation, user_text).await?;
        Ok(extract::parse_chat_reply(&raw))
    }

    /// Explain a passage selected in the document, in the given style.
    pub async fn request_explanation(
        &self,
        conversation: &ConversationId,
        selection: &str,
        style: Option<&str>,
    ) -> Result<Parsed<String>> {
        let prompt = extract::prompt::build_explain_prompt(selection, style);
        let raw = self.ask(conversation, &prompt).await?;
        Ok(extract::parse_chat_reply(&raw))
    }

    async fn ask(&self, conversation: &ConversationId, prompt: &str) -> Result<String> {
        self.run_prompt(conversation, prompt, CancellationToken::new())
            .await
    }

    /// Queue one message-and-run exchange and return the raw reply text.
    /// Cancelling `cancel` stops the exchange at its next suspension point.
    pub async fn run_prompt(
        &self,
        conversation: &ConversationId,
        prompt: &str,
        cancel: CancellationToken,
    ) -> Result<String> {
        let service = self.service.clone();
        let poller = self.poller.clone();
        let target = conversation.clone();
        let prompt = prompt.to_string();

        self.executors
            .submit_with_token(conversation, cancel, move |token| async move {
                if token.is_cancelled() {
                    return Err(crate::error::OrchestratorError::Cancelled);
                }
                service.create_message(&target, Role::User, &prompt).await?;
                let run = service.start_run(&target).await?;
                info!(conversation = %target, run = %run, "Run started");
                poller.await_run(&target, &run, &token).await
            })
            .await
    }
}

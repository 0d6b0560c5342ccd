use assistant::{AssistantService, ConversationId, Role};
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;

/// Reads the text of the newest assistant message of a conversation.
#[derive(Clone)]
pub struct ResultExtractor {
    service: Arc<dyn AssistantService>,
}

impl ResultExtractor {
    pub fn new(service: Arc<dyn AssistantService>) -> Self {
        Self { service }
    }

    /// Missing text is an empty result, not an error.
    pub async fn fetch(&self, conversation: &ConversationId) -> Result<String> {
        let messages = self.service.list_messages(conversation).await?;

        let text = messages
            .into_iter()
            .find(|m| m.role == Role::Assistant)
            .and_then(|m| m.text)
            .unwrap_or_default();

        if text.is_empty() {
            debug!(conversation = %conversation, "Newest assistant message has no text");
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assistant::mock::{ScriptedAssistant, ScriptedRun};
    use assistant::{Message, RunState};

    #[tokio::test]
    async fn test_fetch_without_messages_is_empty() {
        let service = Arc::new(ScriptedAssistant::default());
        let extractor = ResultExtractor::new(service);

        let text = extractor.fetch(&ConversationId::new("thread_1")).await.unwrap();
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn test_fetch_prefers_newest_assistant_message() {
        let conversation = ConversationId::new("thread_1");
        let service = Arc::new(ScriptedAssistant::new([
            ScriptedRun::completes_with("first answer"),
            ScriptedRun::completes_with("second answer"),
        ]));

        for _ in 0..2 {
            let run = service.start_run(&conversation).await.unwrap();
            assert_eq!(
                service.get_run_status(&conversation, &run).await.unwrap(),
                RunState::Completed
            );
        }
        service
            .create_message(&conversation, Role::User, "follow-up")
            .await
            .unwrap();

        let extractor = ResultExtractor::new(service);
        assert_eq!(extractor.fetch(&conversation).await.unwrap(), "second answer");
    }

    #[tokio::test]
    async fn test_fetch_non_text_payload_is_empty() {
        let conversation = ConversationId::new("thread_1");
        let service = Arc::new(ScriptedAssistant::new([ScriptedRun::with_statuses([
            RunState::Completed,
        ])
        .reply(Message {
            role: Role::Assistant,
            text: None,
        })]));

        let run = service.start_run(&conversation).await.unwrap();
        service.get_run_status(&conversation, &run).await.unwrap();

        let extractor = ResultExtractor::new(service);
        assert_eq!(extractor.fetch(&conversation).await.unwrap(), "");
    }
}

use serde::Serialize;
use tracing::info;

use crate::client::AssistantClient;
use crate::service::ServiceError;
use crate::types::ConversationId;

pub const ASSISTANT_NAME: &str = "PDF Reader Assistant";

pub const ASSISTANT_INSTRUCTIONS: &str = "You are a helpful assistant that analyzes PDF documents. \
You can provide summaries, generate keywords, and answer questions about the document.";

const VECTOR_STORE_NAME: &str = "PDF Analysis Store";

const INITIAL_MESSAGE: &str = "Please analyze this PDF document.";

/// Remote resources backing one uploaded document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSession {
    pub conversation: ConversationId,
    pub file_id: String,
    pub vector_store_id: String,
}

/// Create the assistant every conversation runs against.
pub async fn provision_assistant(client: &AssistantClient, model: &str) -> Result<String, ServiceError> {
    let assistant_id = client
        .create_assistant(ASSISTANT_NAME, ASSISTANT_INSTRUCTIONS, model)
        .await?;
    info!(assistant = %assistant_id, model, "Assistant provisioned");
    Ok(assistant_id)
}

/// Build a conversation around a file that has already been uploaded.
pub async fn open_session_with_file(
    client: &AssistantClient,
    file_id: String,
) -> Result<DocumentSession, ServiceError> {
    let vector_store_id = client.create_vector_store(VECTOR_STORE_NAME).await?;
    client
        .attach_file_to_vector_store(&vector_store_id, &file_id)
        .await?;

    let conversation = client.create_thread(&vector_store_id).await?;
    client
        .create_message_with_file(&conversation, INITIAL_MESSAGE, &file_id)
        .await?;

    info!(
        conversation = %conversation,
        file = %file_id,
        vector_store = %vector_store_id,
        "Document session opened"
    );

    Ok(DocumentSession {
        conversation,
        file_id,
        vector_store_id,
    })
}

/// Upload a document and open a conversation for it.
pub async fn open_session(
    client: &AssistantClient,
    file_name: &str,
    bytes: Vec<u8>,
) -> Result<DocumentSession, ServiceError> {
    let file_id = client.upload_file(file_name, bytes).await?;
    open_session_with_file(client, file_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_open_session_wires_file_store_and_thread() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "file_1"})))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/vector_stores"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "vs_1"})))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/vector_stores/vs_1/files"))
            .and(body_partial_json(json!({"file_id": "file_1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "file_1"})))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/threads"))
            .and(body_partial_json(json!({
                "tool_resources": {"file_search": {"vector_store_ids": ["vs_1"]}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "thread_1"})))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/threads/thread_1/messages"))
            .and(body_partial_json(json!({
                "role": "user",
                "attachments": [{"file_id": "file_1", "tools": [{"type": "file_search"}]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "msg_1"})))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            AssistantClient::new(server.uri(), "sk-test".to_string(), Duration::from_secs(5))
                .unwrap();

        let session = open_session(&client, "paper.pdf", b"%PDF-1.7".to_vec())
            .await
            .unwrap();

        assert_eq!(session.conversation.as_str(), "thread_1");
        assert_eq!(session.file_id, "file_1");
        assert_eq!(session.vector_store_id, "vs_1");
    }
}

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::service::{AssistantService, ServiceError};
use crate::types::{is_path_safe, ConversationId, InvalidId, Message, MessageId, Role, RunHandle, RunState};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// HTTP client for an OpenAI-Assistants-compatible service.
#[derive(Clone)]
pub struct AssistantClient {
    base_url: String,
    api_key: String,
    assistant_id: Option<String>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct CreateMessageRequest<'a> {
    role: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<Attachment<'a>>,
}

#[derive(Serialize)]
struct Attachment<'a> {
    file_id: &'a str,
    tools: Vec<ToolSpec>,
}

#[derive(Serialize, Clone)]
struct ToolSpec {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct CreateRunRequest<'a> {
    assistant_id: &'a str,
}

#[derive(Serialize)]
struct CreateAssistantRequest<'a> {
    name: &'a str,
    instructions: &'a str,
    model: &'a str,
    tools: Vec<ToolSpec>,
}

#[derive(Serialize)]
struct CreateVectorStoreRequest<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct AttachFileRequest<'a> {
    file_id: &'a str,
}

#[derive(Serialize)]
struct CreateThreadRequest<'a> {
    tool_resources: ThreadToolResources<'a>,
}

#[derive(Serialize)]
struct ThreadToolResources<'a> {
    file_search: FileSearchResources<'a>,
}

#[derive(Serialize)]
struct FileSearchResources<'a> {
    vector_store_ids: Vec<&'a str>,
}

#[derive(Deserialize)]
struct ObjectRef {
    id: String,
}

#[derive(Deserialize)]
struct RunObject {
    id: String,
    status: String,
}

#[derive(Deserialize)]
struct MessageList {
    data: Vec<WireMessage>,
}

#[derive(Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: Option<WireContent>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Parts(Vec<WirePart>),
}

#[derive(Deserialize)]
struct WirePart {
    #[serde(rename = "type")]
    kind: String,
    text: Option<WireText>,
}

#[derive(Deserialize)]
struct WireText {
    value: String,
}

impl WireMessage {
    fn into_message(self) -> Message {
        let role = if self.role == "assistant" {
            Role::Assistant
        } else {
            Role::User
        };

        let text = match self.content {
            Some(WireContent::Text(text)) => Some(text),
            Some(WireContent::Parts(parts)) => parts
                .into_iter()
                .find(|p| p.kind == "text")
                .and_then(|p| p.text)
                .map(|t| t.value),
            None => None,
        };

        Message { role, text }
    }
}

impl AssistantClient {
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            assistant_id: None,
            client,
        })
    }

    /// Bind runs started by this client to an existing assistant.
    pub fn with_assistant(mut self, assistant_id: impl Into<String>) -> Self {
        self.assistant_id = Some(assistant_id.into());
        self
    }

    pub fn assistant_id(&self) -> Option<&str> {
        self.assistant_id.as_deref()
    }

    pub async fn create_assistant(
        &self,
        name: &str,
        instructions: &str,
        model: &str,
    ) -> Result<String, ServiceError> {
        let request = CreateAssistantRequest {
            name,
            instructions,
            model,
            tools: vec![
                ToolSpec { kind: "code_interpreter" },
                ToolSpec { kind: "file_search" },
            ],
        };

        let created: ObjectRef = self
            .send("create assistant", self.post("/assistants").json(&request))
            .await?;
        Ok(created.id)
    }

    pub async fn upload_file(&self, file_name: &str, bytes: Vec<u8>) -> Result<String, ServiceError> {
        let part = Part::bytes(bytes).file_name(file_name.to_string());
        let form = Form::new().text("purpose", "assistants").part("file", part);

        let uploaded: ObjectRef = self
            .send("upload file", self.post("/files").multipart(form))
            .await?;
        Ok(uploaded.id)
    }

    pub async fn create_vector_store(&self, name: &str) -> Result<String, ServiceError> {
        let created: ObjectRef = self
            .send(
                "create vector store",
                self.post("/vector_stores")
                    .json(&CreateVectorStoreRequest { name }),
            )
            .await?;
        Ok(created.id)
    }

    pub async fn attach_file_to_vector_store(
        &self,
        vector_store_id: &str,
        file_id: &str,
    ) -> Result<(), ServiceError> {
        let _: ObjectRef = self
            .send(
                "attach file",
                self.post(&format!("/vector_stores/{}/files", vector_store_id))
                    .json(&AttachFileRequest { file_id }),
            )
            .await?;
        Ok(())
    }

    /// Create a thread whose file search is scoped to one vector store.
    pub async fn create_thread(&self, vector_store_id: &str) -> Result<ConversationId, ServiceError> {
        let request = CreateThreadRequest {
            tool_resources: ThreadToolResources {
                file_search: FileSearchResources {
                    vector_store_ids: vec![vector_store_id],
                },
            },
        };

        let created: ObjectRef = self
            .send("create thread", self.post("/threads").json(&request))
            .await?;
        Ok(ConversationId::new(created.id))
    }

    /// Post a user message that carries a file for file search.
    pub async fn create_message_with_file(
        &self,
        conversation: &ConversationId,
        text: &str,
        file_id: &str,
    ) -> Result<MessageId, ServiceError> {
        let request = CreateMessageRequest {
            role: Role::User.as_str(),
            content: text,
            attachments: vec![Attachment {
                file_id,
                tools: vec![ToolSpec { kind: "file_search" }],
            }],
        };

        let created: ObjectRef = self
            .send(
                "create message",
                self.post(&thread_path(conversation, &["messages"])?)
                    .json(&request),
            )
            .await?;
        Ok(MessageId::new(created.id))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.post(self.url(path))
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(self.url(path))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ServiceError> {
        let response = request
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                operation,
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ServiceError::decode(operation, e.to_string()))
    }
}

/// `/threads/{conversation}/...`, refusing ids that would change the path.
fn thread_path(conversation: &ConversationId, rest: &[&str]) -> Result<String, ServiceError> {
    let mut path = format!("/threads/{}", checked(conversation.as_str())?);
    for segment in rest {
        path.push('/');
        path.push_str(checked(segment)?);
    }
    Ok(path)
}

fn checked(segment: &str) -> Result<&str, InvalidId> {
    if is_path_safe(segment) {
        Ok(segment)
    } else {
        Err(InvalidId(segment.to_string()))
    }
}

#[async_trait]
impl AssistantService for AssistantClient {
    async fn create_message(
        &self,
        conversation: &ConversationId,
        role: Role,
        text: &str,
    ) -> Result<MessageId, ServiceError> {
        let request = CreateMessageRequest {
            role: role.as_str(),
            content: text,
            attachments: Vec::new(),
        };

        let created: ObjectRef = self
            .send(
                "create message",
                self.post(&thread_path(conversation, &["messages"])?)
                    .json(&request),
            )
            .await?;
        debug!(conversation = %conversation, message = %created.id, "Message created");
        Ok(MessageId::new(created.id))
    }

    async fn start_run(&self, conversation: &ConversationId) -> Result<RunHandle, ServiceError> {
        let assistant_id = self
            .assistant_id
            .as_deref()
            .ok_or_else(|| ServiceError::Config("no assistant configured".to_string()))?;

        let run: RunObject = self
            .send(
                "start run",
                self.post(&thread_path(conversation, &["runs"])?)
                    .json(&CreateRunRequest { assistant_id }),
            )
            .await?;
        debug!(conversation = %conversation, run = %run.id, status = %run.status, "Run created");
        Ok(RunHandle::new(run.id))
    }

    async fn get_run_status(
        &self,
        conversation: &ConversationId,
        run: &RunHandle,
    ) -> Result<RunState, ServiceError> {
        let run: RunObject = self
            .send(
                "get run",
                self.get(&thread_path(conversation, &["runs", run.as_str()])?),
            )
            .await?;

        RunState::from_wire(&run.status).ok_or_else(|| {
            ServiceError::decode("get run", format!("unrecognized run status '{}'", run.status))
        })
    }

    async fn list_messages(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<Message>, ServiceError> {
        let list: MessageList = self
            .send(
                "list messages",
                self.get(&thread_path(conversation, &["messages"])?)
                    .query(&[("order", "desc")]),
            )
            .await?;

        Ok(list.data.into_iter().map(WireMessage::into_message).collect())
    }

    async fn cancel_run(
        &self,
        conversation: &ConversationId,
        run: &RunHandle,
    ) -> Result<(), ServiceError> {
        let _: RunObject = self
            .send(
                "cancel run",
                self.post(&thread_path(conversation, &["runs", run.as_str(), "cancel"])?),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> AssistantClient {
        AssistantClient::new(server.uri(), "sk-test".to_string(), Duration::from_secs(5))
            .unwrap()
            .with_assistant("asst_1")
    }

    #[tokio::test]
    async fn test_start_run_and_poll_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/threads/thread_1/runs"))
            .and(header("OpenAI-Beta", "assistants=v2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "run_1", "status": "queued"})),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/threads/thread_1/runs/run_1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": "run_1", "status": "in_progress"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let conversation = ConversationId::new("thread_1");

        let run = client.start_run(&conversation).await.unwrap();
        assert_eq!(run.as_str(), "run_1");

        let status = client.get_run_status(&conversation, &run).await.unwrap();
        assert_eq!(status, RunState::Running);
    }

    #[tokio::test]
    async fn test_list_messages_reduces_content_to_text() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/threads/thread_1/messages"))
            .and(query_param("order", "desc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {
                        "role": "assistant",
                        "content": [
                            {"type": "image_file", "image_file": {"file_id": "f"}},
                            {"type": "text", "text": {"value": "the answer", "annotations": []}}
                        ]
                    },
                    {"role": "assistant", "content": [{"type": "image_file"}]},
                    {"role": "user", "content": "plain question"}
                ]
            })))
            .mount(&server)
            .await;

        let messages = client_for(&server)
            .list_messages(&ConversationId::new("thread_1"))
            .await
            .unwrap();

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], Message::assistant("the answer"));
        assert_eq!(messages[1].text, None);
        assert_eq!(messages[2], Message::user("plain question"));
    }

    #[tokio::test]
    async fn test_error_status_is_reported_with_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/threads/thread_1/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_string("run is active"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .create_message(&ConversationId::new("thread_1"), Role::User, "hi")
            .await
            .unwrap_err();

        match &err {
            ServiceError::Status { status, body, .. } => {
                assert_eq!(*status, 400);
                assert_eq!(body, "run is active");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_unknown_run_status_is_a_decode_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/threads/thread_1/runs/run_1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "run_1", "status": "paused"})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .get_run_status(&ConversationId::new("thread_1"), &RunHandle::new("run_1"))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_start_run_requires_assistant() {
        let client = AssistantClient::new(
            "http://localhost:1".to_string(),
            "sk-test".to_string(),
            Duration::from_secs(1),
        )
        .unwrap();

        let err = client
            .start_run(&ConversationId::new("thread_1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
    }

    #[tokio::test]
    async fn test_conversation_id_cannot_escape_thread_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "hit"})))
            .mount(&server)
            .await;
        let client = client_for(&server);

        let err = client
            .create_message(
                &ConversationId::new("../assistants/asst_1"),
                Role::User,
                "hello",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::InvalidId(_)));
        assert!(!err.is_retryable());
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}

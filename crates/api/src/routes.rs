use assistant::{AssistantClient, ConversationId, ServiceError};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use extract::{Graph, KeywordEntry, Parsed};
use orchestrator::{Orchestrator, OrchestratorError};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::{ArtifactCache, CacheStats, CachedArtifact};
use crate::metrics::{ArtifactKind, Metrics, MetricsSnapshot, Outcome, TimedOperation};
use crate::retry::RetryPolicy;

const DEFAULT_FILE_NAME: &str = "document.pdf";

const MAX_DOCUMENT_BYTES: usize = 64 * 1024 * 1024;

pub struct AppState {
    pub orchestrator: Orchestrator,
    pub client: Arc<AssistantClient>,
    pub cache: ArtifactCache,
    pub metrics: Arc<Metrics>,
    pub retry: RetryPolicy,
}

impl AppState {
    /// Await one orchestrated request, recording how it ended.
    async fn observe<T>(
        &self,
        kind: ArtifactKind,
        conversation: &ConversationId,
        request: impl Future<Output = orchestrator::Result<Parsed<T>>>,
    ) -> Result<Parsed<T>, ApiError> {
        let timer = TimedOperation::start();
        let result = request.await;

        let outcome = match &result {
            Ok(parsed) if parsed.is_fallback() => Outcome::Fallback,
            Ok(_) => Outcome::Success,
            Err(_) => Outcome::Failure,
        };
        self.metrics.record(kind, outcome, timer.elapsed());

        match result {
            Ok(parsed) => {
                if let Some(reason) = parsed.fallback_reason() {
                    warn!(
                        conversation = %conversation,
                        kind = kind.as_str(),
                        reason = %reason,
                        "Answered with fallback"
                    );
                }
                Ok(parsed)
            }
            Err(error) => {
                warn!(
                    conversation = %conversation,
                    kind = kind.as_str(),
                    code = error.code(),
                    error = %error,
                    "Request failed"
                );
                Err(ApiError::Orchestration { kind, error })
            }
        }
    }

    fn cached(&self, conversation: &ConversationId, kind: ArtifactKind, refresh: bool) -> Option<CachedArtifact> {
        if refresh {
            return None;
        }
        let hit = self.cache.get(conversation, kind)?;
        self.metrics.record_cache_hit(kind);
        Some(hit)
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/sessions", post(open_session))
        .route("/sessions/:id/summary", get(get_summary))
        .route("/sessions/:id/keywords", get(get_keywords))
        .route("/sessions/:id/graph", get(get_graph))
        .route("/sessions/:id/chat", post(chat))
        .route("/sessions/:id/explain", post(explain))
        .route("/metrics", get(get_metrics))
        .layer(DefaultBodyLimit::max(MAX_DOCUMENT_BYTES))
        .with_state(state)
}

pub enum ApiError {
    Orchestration {
        kind: ArtifactKind,
        error: OrchestratorError,
    },
    Session(ServiceError),
    BadRequest(&'static str),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    retryable: bool,
    message: String,
}

fn failure_message(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::Session => "Failed to upload document. Please try again.",
        ArtifactKind::Summary => "Failed to generate summary. Please try again.",
        ArtifactKind::Keywords => "Failed to generate keywords. Please try again.",
        ArtifactKind::Graph => "Failed to generate mind map. Please try again.",
        ArtifactKind::Chat => "Failed to get a response. Please try again.",
        ArtifactKind::Explain => "Failed to explain the selection. Please try again.",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Orchestration { kind, error } => {
                let status = match &error {
                    OrchestratorError::TransportFailure(_)
                    | OrchestratorError::RunTerminatedAbnormally(_) => StatusCode::BAD_GATEWAY,
                    OrchestratorError::PollingTimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
                    OrchestratorError::UnsupportedCapabilityRequested => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                    OrchestratorError::Cancelled
                    | OrchestratorError::ExecutorClosed
                    | OrchestratorError::ActionPanicked(_) => StatusCode::SERVICE_UNAVAILABLE,
                };
                let body = ErrorBody {
                    error: error.code(),
                    retryable: error.is_retryable(),
                    message: failure_message(kind).to_string(),
                };
                (status, body)
            }
            ApiError::Session(error) => {
                let body = ErrorBody {
                    error: "transport_failure",
                    retryable: error.is_retryable(),
                    message: failure_message(ArtifactKind::Session).to_string(),
                };
                (StatusCode::BAD_GATEWAY, body)
            }
            ApiError::BadRequest(message) => {
                let body = ErrorBody {
                    error: "invalid_request",
                    retryable: false,
                    message: message.to_string(),
                };
                (StatusCode::BAD_REQUEST, body)
            }
        };

        (status, Json(body)).into_response()
    }
}

fn conversation_id(raw: &str) -> Result<ConversationId, ApiError> {
    ConversationId::parse(raw).map_err(|e| {
        warn!(error = %e, "Rejected conversation id");
        ApiError::BadRequest("Invalid conversation id.")
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    assistant_id: Option<String>,
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        assistant_id: state.client.assistant_id().map(str::to_string),
    })
}

#[derive(Deserialize)]
struct SessionQuery {
    file_name: Option<String>,
}

#[derive(Serialize)]
struct SessionResponse {
    conversation_id: ConversationId,
}

async fn open_session(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionQuery>,
    body: Bytes,
) -> Result<Json<SessionResponse>, ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("Document body is empty."));
    }

    let file_name = query
        .file_name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string());
    let timer = TimedOperation::start();

    let client = state.client.as_ref();
    let name = file_name.as_str();
    let uploaded = state
        .retry
        .retry_when("upload file", ServiceError::is_retryable, || {
            client.upload_file(name, body.to_vec())
        })
        .await;

    let result = match uploaded {
        Ok(file_id) => assistant::session::open_session_with_file(client, file_id).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(session) => {
            state
                .metrics
                .record(ArtifactKind::Session, Outcome::Success, timer.elapsed());
            info!(conversation = %session.conversation, file_name = %file_name, "Session opened");
            Ok(Json(SessionResponse {
                conversation_id: session.conversation,
            }))
        }
        Err(e) => {
            state
                .metrics
                .record(ArtifactKind::Session, Outcome::Failure, timer.elapsed());
            warn!(file_name = %file_name, error = %e, "Failed to open session");
            Err(ApiError::Session(e))
        }
    }
}

#[derive(Deserialize, Default)]
struct RefreshQuery {
    #[serde(default)]
    refresh: bool,
}

#[derive(Serialize)]
struct SummaryResponse {
    summary: String,
    fallback: bool,
}

async fn get_summary(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<RefreshQuery>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let conversation = conversation_id(&id)?;
    if let Some(CachedArtifact::Summary(summary)) =
        state.cached(&conversation, ArtifactKind::Summary, query.refresh)
    {
        return Ok(Json(SummaryResponse {
            summary,
            fallback: false,
        }));
    }

    let parsed = state
        .observe(
            ArtifactKind::Summary,
            &conversation,
            state.orchestrator.request_summary(&conversation),
        )
        .await?;

    let fallback = parsed.is_fallback();
    let summary = parsed.into_value();
    if !fallback {
        state
            .cache
            .insert(&conversation, CachedArtifact::Summary(summary.clone()));
    }
    Ok(Json(SummaryResponse { summary, fallback }))
}

#[derive(Serialize)]
struct KeywordsResponse {
    keywords: Vec<KeywordEntry>,
    fallback: bool,
}

async fn get_keywords(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<RefreshQuery>,
) -> Result<Json<KeywordsResponse>, ApiError> {
    let conversation = conversation_id(&id)?;
    if let Some(CachedArtifact::Keywords(keywords)) =
        state.cached(&conversation, ArtifactKind::Keywords, query.refresh)
    {
        return Ok(Json(KeywordsResponse {
            keywords,
            fallback: false,
        }));
    }

    let parsed = state
        .observe(
            ArtifactKind::Keywords,
            &conversation,
            state.orchestrator.request_keywords(&conversation),
        )
        .await?;

    let fallback = parsed.is_fallback();
    let keywords = parsed.into_value();
    if !fallback {
        state
            .cache
            .insert(&conversation, CachedArtifact::Keywords(keywords.clone()));
    }
    Ok(Json(KeywordsResponse { keywords, fallback }))
}

#[derive(Serialize)]
struct GraphResponse {
    graph: Graph,
    fallback: bool,
}

async fn get_graph(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<RefreshQuery>,
) -> Result<Json<GraphResponse>, ApiError> {
    let conversation = conversation_id(&id)?;
    if let Some(CachedArtifact::Graph(graph)) =
        state.cached(&conversation, ArtifactKind::Graph, query.refresh)
    {
        return Ok(Json(GraphResponse {
            graph,
            fallback: false,
        }));
    }

    let parsed = state
        .observe(
            ArtifactKind::Graph,
            &conversation,
            state.orchestrator.request_graph(&conversation),
        )
        .await?;

    let fallback = parsed.is_fallback();
    let graph = parsed.into_value();
    if !fallback {
        state
            .cache
            .insert(&conversation, CachedArtifact::Graph(graph.clone()));
    }
    Ok(Json(GraphResponse { graph, fallback }))
}

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
}

#[derive(Serialize)]
struct ChatResponse {
    reply: String,
    fallback: bool,
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if req.message.trim().is_empty() {
        return Err(ApiError::BadRequest("Message is empty."));
    }

    let conversation = conversation_id(&id)?;
    let parsed = state
        .observe(
            ArtifactKind::Chat,
            &conversation,
            state.orchestrator.request_chat_reply(&conversation, &req.message),
        )
        .await?;

    Ok(Json(ChatResponse {
        fallback: parsed.is_fallback(),
        reply: parsed.into_value(),
    }))
}

#[derive(Deserialize)]
struct ExplainRequest {
    selection: String,
    prompt: Option<String>,
}

#[derive(Serialize)]
struct ExplainResponse {
    explanation: String,
    fallback: bool,
}

async fn explain(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ExplainRequest>,
) -> Result<Json<ExplainResponse>, ApiError> {
    if req.selection.trim().is_empty() {
        return Err(ApiError::BadRequest("Selection is empty."));
    }

    let conversation = conversation_id(&id)?;
    let style = req.prompt.as_deref().filter(|p| !p.trim().is_empty());
    let parsed = state
        .observe(
            ArtifactKind::Explain,
            &conversation,
            state
                .orchestrator
                .request_explanation(&conversation, &req.selection, style),
        )
        .await?;

    Ok(Json(ExplainResponse {
        fallback: parsed.is_fallback(),
        explanation: parsed.into_value(),
    }))
}

#[derive(Serialize)]
struct MetricsResponse {
    #[serde(flatten)]
    metrics: MetricsSnapshot,
    cache: CacheStats,
}

async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        metrics: state.metrics.snapshot(),
        cache: state.cache.stats(),
    })
}

mod cache;
mod config;
mod metrics;
mod retry;
mod routes;

use anyhow::{Context, Result};
use assistant::{AssistantClient, ServiceError};
use orchestrator::Orchestrator;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::cache::ArtifactCache;
use crate::config::{AppConfig, LogFormat};
use crate::metrics::Metrics;
use crate::retry::RetryPolicy;
use crate::routes::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing(config.server.log_format);

    let api_key = std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY is not set")?;
    let retry = RetryPolicy::from_config(&config.retry);

    let client = AssistantClient::new(
        config.service.base_url.clone(),
        api_key,
        Duration::from_secs(config.service.request_timeout_secs),
    )
    .context("Failed to build assistant client")?;

    let assistant_id = match &config.service.assistant_id {
        Some(id) => {
            tracing::info!(assistant = %id, "Using configured assistant");
            id.clone()
        }
        None => retry
            .retry_when("provision assistant", ServiceError::is_retryable, || {
                assistant::session::provision_assistant(&client, &config.service.model)
            })
            .await
            .context("Failed to provision assistant")?,
    };
    let client = Arc::new(client.with_assistant(assistant_id));

    let orchestrator = Orchestrator::new(client.clone(), &config.orchestration);
    tracing::info!(
        scope = ?config.orchestration.scope,
        poll_interval_ms = config.orchestration.poll_interval_ms,
        max_poll_attempts = ?config.orchestration.max_poll_attempts,
        "Orchestrator ready"
    );

    let state = Arc::new(AppState {
        orchestrator,
        client,
        cache: ArtifactCache::from_config(&config.cache),
        metrics: Metrics::new(),
        retry,
    });

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;

    tracing::info!("Server listening on http://{}", config.server.bind_addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

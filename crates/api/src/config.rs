use anyhow::{Context, Result};
use orchestrator::{ExecutorScope, OrchestratorConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub service: ServiceConfig,
    pub orchestration: OrchestratorConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,
    pub model: String,
    /// Reuse this assistant instead of provisioning one at startup.
    pub assistant_id: Option<String>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: assistant::client::DEFAULT_BASE_URL.to_string(),
            model: "gpt-4o".to_string(),
            assistant_id: None,
            request_timeout_secs: 60,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 10000,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10000,
        }
    }
}

impl AppConfig {
    /// Short poll interval, tight bound, conversations run independently.
    pub fn responsive() -> Self {
        Self {
            orchestration: OrchestratorConfig {
                poll_interval_ms: 500,
                max_poll_attempts: Some(90),
                scope: ExecutorScope::PerConversation,
                ..OrchestratorConfig::default()
            },
            retry: RetryConfig {
                max_retries: 2,
                initial_backoff_ms: 500,
                max_backoff_ms: 5000,
            },
            ..Self::default()
        }
    }

    /// One exchange at a time across all conversations, long runs tolerated.
    pub fn conservative() -> Self {
        Self {
            orchestration: OrchestratorConfig {
                poll_interval_ms: 2000,
                max_poll_attempts: Some(300),
                scope: ExecutorScope::Global,
                ..OrchestratorConfig::default()
            },
            retry: RetryConfig {
                max_retries: 5,
                initial_backoff_ms: 2000,
                max_backoff_ms: 20000,
            },
            ..Self::default()
        }
    }

    pub fn preset(name: Option<&str>) -> Self {
        match name {
            Some("responsive") => Self::responsive(),
            Some("conservative") => Self::conservative(),
            _ => Self::default(),
        }
    }

    /// The JSON file named by `DOCREADER_CONFIG`, or else the preset named by
    /// `DOCREADER_PRESET`, then environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("DOCREADER_CONFIG") {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {}", path))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("Failed to parse config file {}", path))?
            }
            Err(_) => Self::preset(std::env::var("DOCREADER_PRESET").ok().as_deref()),
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(base_url) = lookup("OPENAI_BASE_URL") {
            self.service.base_url = base_url;
        }
        if let Some(assistant_id) = lookup("OPENAI_ASSISTANT_ID") {
            self.service.assistant_id = Some(assistant_id);
        }
        if let Some(bind_addr) = lookup("DOCREADER_BIND") {
            self.server.bind_addr = bind_addr;
        }
    }
}

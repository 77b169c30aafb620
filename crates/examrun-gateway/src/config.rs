//! Backend configuration and factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use examrun_core::clock::Clock;
use examrun_core::engine::EngineConfig;
use examrun_core::model::ExamDefinition;
use examrun_core::traits::{ExamService, SubmissionGateway};

use crate::http::HttpExamService;
use crate::memory::InMemoryExamService;

/// Which exam service to talk to.
///
/// Note: Custom Debug impl masks the API token to prevent accidental exposure in logs.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// In-process service seeded from exam files.
    #[default]
    Memory,
    Http {
        base_url: String,
        #[serde(default)]
        api_token: Option<String>,
    },
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendConfig::Memory => f.write_str("Memory"),
            BackendConfig::Http {
                base_url,
                api_token,
            } => f
                .debug_struct("Http")
                .field("base_url", base_url)
                .field("api_token", &api_token.as_ref().map(|_| "***"))
                .finish(),
        }
    }
}

/// Top-level examrun configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamrunConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    /// Participant used when the CLI is not given one.
    #[serde(default)]
    pub participant_id: Option<String>,
    /// How often a session re-checks its deadline.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Upper bound on a single submission call.
    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_ms: u64,
    /// Late-submission window of the in-memory service.
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: i64,
    /// Explicit retries allowed after a transient submission failure.
    #[serde(default = "default_manual_retries")]
    pub max_manual_retries: u32,
    /// Output directory for results and reviews.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_tick_interval() -> u64 {
    1000
}
fn default_submit_timeout() -> u64 {
    10_000
}
fn default_grace_period() -> i64 {
    crate::memory::DEFAULT_GRACE_SECS
}
fn default_manual_retries() -> u32 {
    1
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./examrun-results")
}

impl Default for ExamrunConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            participant_id: None,
            tick_interval_ms: default_tick_interval(),
            submit_timeout_ms: default_submit_timeout(),
            grace_period_secs: default_grace_period(),
            max_manual_retries: default_manual_retries(),
            output_dir: default_output_dir(),
        }
    }
}

impl ExamrunConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::from_millis(
            self.tick_interval_ms,
            self.submit_timeout_ms,
            self.max_manual_retries,
        )
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        let var_name = &rest[start + 2..start + end];
        result.push_str(&rest[..start]);
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + end + 1..];
    }
    result.push_str(rest);
    result
}

fn resolve_backend_config(config: &BackendConfig) -> BackendConfig {
    match config {
        BackendConfig::Memory => BackendConfig::Memory,
        BackendConfig::Http {
            base_url,
            api_token,
        } => BackendConfig::Http {
            base_url: resolve_env_vars(base_url),
            api_token: api_token.as_ref().map(|t| resolve_env_vars(t)),
        },
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `examrun.toml` in the current directory
/// 2. `~/.config/examrun/config.toml`
///
/// Environment variable override: `EXAMRUN_API_TOKEN`.
pub fn load_config() -> Result<ExamrunConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<ExamrunConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("examrun.toml");
        if local.exists() {
            Some(local)
        } else if let Some(home) = dirs_path() {
            let global = home.join("config.toml");
            if global.exists() {
                Some(global)
            } else {
                None
            }
        } else {
            None
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            parse_config_str(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => ExamrunConfig::default(),
    };

    if let Ok(token) = std::env::var("EXAMRUN_API_TOKEN") {
        if let BackendConfig::Http { api_token, .. } = &mut config.backend {
            *api_token = Some(token);
        }
    }

    Ok(config)
}

/// Parse a config string and resolve `${VAR}` references.
pub fn parse_config_str(content: &str) -> Result<ExamrunConfig> {
    let mut config: ExamrunConfig = toml::from_str(content)?;
    config.backend = resolve_backend_config(&config.backend);
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("examrun"))
}

/// The two collaborators an engine needs, backed by the same service.
pub struct Backend {
    pub service: Arc<dyn ExamService>,
    pub gateway: Arc<dyn SubmissionGateway>,
}

/// Create the configured backend.
///
/// `exams` seeds the memory backend and is ignored by the HTTP backend.
pub fn create_backend(
    config: &ExamrunConfig,
    clock: Arc<dyn Clock>,
    exams: Vec<ExamDefinition>,
) -> Result<Backend> {
    match &config.backend {
        BackendConfig::Memory => {
            let service = Arc::new(
                InMemoryExamService::new(clock)
                    .with_grace_period(chrono::Duration::seconds(config.grace_period_secs))
                    .with_exams(exams),
            );
            Ok(Backend {
                service: service.clone(),
                gateway: service,
            })
        }
        BackendConfig::Http {
            base_url,
            api_token,
        } => {
            let service = Arc::new(HttpExamService::with_timeout(
                base_url,
                api_token.clone(),
                std::time::Duration::from_millis(config.submit_timeout_ms),
            )?);
            Ok(Backend {
                service: service.clone(),
                gateway: service,
            })
        }
    }
}

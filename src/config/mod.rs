//! Process configuration.
//!
//! Settings come from the environment (after `.env` is loaded) and are read
//! once at startup. Command-line flags override them. Targets live in a TOML
//! file; see [`targets`].

pub mod targets;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::extract::SchemaError;
use crate::fetch::RenderService;
use crate::http_client::USER_AGENT;
use crate::pipeline::PipelineOptions;
use crate::repository::util::is_postgres_url;

pub use targets::{load_targets, parse_targets};

pub const DEFAULT_TARGETS_FILE: &str = "targets.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("DATABASE_URL is not set")]
    MissingDatabaseUrl,
    #[error("unsupported database URL '{0}': only sqlite is supported")]
    UnsupportedDatabase(String),
    #[error("invalid value for {var}: '{value}'")]
    InvalidValue { var: String, value: String },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid targets file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },
    #[error("target '{target}': {source}")]
    Schema {
        target: String,
        #[source]
        source: SchemaError,
    },
    #[error("duplicate target id '{0}'")]
    DuplicateTarget(String),
    #[error("target '{0}' needs rendering but RENDER_API_URL is not set")]
    RenderNotConfigured(String),
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Store location. Only `sqlite:` URLs and plain paths are accepted.
    pub database_url: Option<String>,
    pub targets_path: PathBuf,
    pub render_api_url: Option<String>,
    pub render_api_key: Option<String>,
    pub alert_webhook_url: Option<String>,
    /// Consecutive failures before an alert is raised.
    pub alert_threshold: u32,
    pub workers: usize,
    /// Watchdog for a single target run.
    pub run_timeout: Duration,
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: None,
            targets_path: PathBuf::from(DEFAULT_TARGETS_FILE),
            render_api_url: None,
            render_api_key: None,
            alert_webhook_url: None,
            alert_threshold: 3,
            workers: 1,
            run_timeout: Duration::from_secs(300),
            user_agent: USER_AGENT.to_string(),
        }
    }
}

fn parse_number<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var: var.to_string(),
        value: value.to_string(),
    })
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut settings = Self::default();

        settings.database_url = get("DATABASE_URL");
        if let Some(path) = get("YJT_TARGETS") {
            settings.targets_path = PathBuf::from(path);
        }
        settings.render_api_url = get("RENDER_API_URL");
        settings.render_api_key = get("RENDER_API_KEY");
        settings.alert_webhook_url = get("ALERT_WEBHOOK_URL");
        if let Some(v) = get("YJT_ALERT_THRESHOLD") {
            settings.alert_threshold = parse_number("YJT_ALERT_THRESHOLD", &v)?;
        }
        if let Some(v) = get("YJT_WORKERS") {
            settings.workers = parse_number("YJT_WORKERS", &v)?;
        }
        if let Some(v) = get("YJT_RUN_TIMEOUT_SECS") {
            settings.run_timeout = Duration::from_secs(parse_number("YJT_RUN_TIMEOUT_SECS", &v)?);
        }
        if let Some(ua) = get("YJT_USER_AGENT") {
            settings.user_agent = ua;
        }

        if let Some(url) = &settings.database_url {
            if is_postgres_url(url) {
                return Err(ConfigError::UnsupportedDatabase(url.clone()));
            }
        }
        Ok(settings)
    }

    /// The database URL, or an error for commands that need the store.
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::MissingDatabaseUrl)
    }

    /// The hosted rendering service, when configured.
    pub fn render_service(&self) -> Result<Option<RenderService>, ConfigError> {
        let Some(raw) = &self.render_api_url else {
            return Ok(None);
        };
        let endpoint = Url::parse(raw).map_err(|_| ConfigError::InvalidValue {
            var: "RENDER_API_URL".to_string(),
            value: raw.clone(),
        })?;
        Ok(Some(RenderService::new(
            endpoint,
            self.render_api_key.clone(),
        )))
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            workers: self.workers.max(1),
            run_timeout: self.run_timeout,
            alert_threshold: self.alert_threshold,
            ..Default::default()
        }
    }
}

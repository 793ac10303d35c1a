//! Process-wide runtime settings.
//!
//! `lookoutd` fills these from its command line and environment; library
//! crates only read them. Defaults match a local development setup.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" => Ok(LogFormat::Text),
            other => Err(ConfigError::InvalidSetting {
                name: "LOG_FORMAT",
                reason: format!("expected 'json' or 'text', got '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub service_name: String,
    pub service_title: String,
    pub env_name: String,
    pub config_file: PathBuf,
    pub version_file: PathBuf,

    pub default_ttl: Duration,
    pub default_request_headers: BTreeMap<String, String>,
    pub github_token: Option<String>,
    pub refresh_secret: Option<String>,

    pub requests_timeout: Duration,
    pub requests_max_retries: u32,
    pub limit_request_concurrency: usize,
    pub limit_worker_concurrency: usize,
    pub limit_checks_concurrency: usize,

    pub cache_lock_enabled: bool,
    pub redis_cache_url: Option<String>,
    pub redis_key_prefix: String,
    /// Lease of a distributed lock; expired holders lose it.
    pub redis_lock_timeout: Duration,
    /// How long a caller waits for a distributed lock before giving up.
    pub redis_lock_blocking_timeout: Duration,

    pub bugtracker_url: Option<String>,
    pub bugtracker_api_key: Option<String>,
    pub bugtracker_ttl: Duration,
    pub history_days: u32,
    pub history_ttl: Duration,

    pub troubleshooting_link_template: Option<String>,
    pub metrics_prefix: String,
    /// Zero disables the scheduler-lag observer.
    pub scheduler_lag_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            service_name: "lookout".to_string(),
            service_title: "Lookout".to_string(),
            env_name: "local".to_string(),
            config_file: PathBuf::from("config.toml"),
            version_file: PathBuf::from("version.json"),
            default_ttl: Duration::from_secs(60),
            default_request_headers: BTreeMap::new(),
            github_token: None,
            refresh_secret: None,
            requests_timeout: Duration::from_secs(10),
            requests_max_retries: 2,
            limit_request_concurrency: 16,
            limit_worker_concurrency: 8,
            limit_checks_concurrency: 4,
            cache_lock_enabled: true,
            redis_cache_url: None,
            redis_key_prefix: "lookout".to_string(),
            redis_lock_timeout: Duration::from_secs(300),
            redis_lock_blocking_timeout: Duration::from_secs(120),
            bugtracker_url: None,
            bugtracker_api_key: None,
            bugtracker_ttl: Duration::from_secs(3600),
            history_days: 0,
            history_ttl: Duration::from_secs(3600),
            troubleshooting_link_template: None,
            metrics_prefix: "lookout".to_string(),
            scheduler_lag_interval: Duration::ZERO,
        }
    }
}

impl Settings {
    /// Parse `DEFAULT_REQUEST_HEADERS`, a JSON object of string values.
    pub fn parse_headers(raw: &str) -> Result<BTreeMap<String, String>, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(raw).map_err(|e| ConfigError::InvalidSetting {
            name: "DEFAULT_REQUEST_HEADERS",
            reason: e.to_string(),
        })
    }

    /// Reject combinations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("LIMIT_REQUEST_CONCURRENCY", self.limit_request_concurrency),
            ("LIMIT_WORKER_CONCURRENCY", self.limit_worker_concurrency),
            ("LIMIT_CHECKS_CONCURRENCY", self.limit_checks_concurrency),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidSetting {
                    name,
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        if self.redis_cache_url.is_some() && self.redis_lock_timeout.is_zero() {
            return Err(ConfigError::InvalidSetting {
                name: "REDIS_LOCK_TIMEOUT_SECONDS",
                reason: "lease must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    /// Render the troubleshooting link of a check, if a template is configured.
    pub fn troubleshooting_url(&self, project: &str, check: &str) -> Option<String> {
        self.troubleshooting_link_template.as_ref().map(|template| {
            template
                .replace("{project}", project)
                .replace("{check}", check)
        })
    }
}

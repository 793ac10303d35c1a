//! Command line, backed by environment variables.

use std::path::PathBuf;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};
use lookout_core::{LogFormat, Settings};

#[derive(Parser)]
#[command(name = "lookoutd", about = "lookout health-check service", version)]
pub struct Cli {
    #[command(flatten)]
    pub settings: SettingsArgs,

    /// Log filter directives.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// `json` or `text`.
    #[arg(long, env = "LOG_FORMAT", default_value = "json")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Serve the HTTP API (default).
    Serve,
    /// Run the selected checks once and exit.
    Check {
        project: Option<String>,
        name: Option<String>,
        /// Ignore cached results.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
pub struct SettingsArgs {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    #[arg(long, env = "SERVICE_NAME", default_value = "lookout")]
    pub service_name: String,

    /// Defaults to the capitalized service name.
    #[arg(long, env = "SERVICE_TITLE")]
    pub service_title: Option<String>,

    #[arg(long, env = "ENV_NAME", default_value = "local")]
    pub env_name: String,

    /// Checks file.
    #[arg(long, env = "CONFIG_FILE", default_value = "config.toml")]
    pub config_file: PathBuf,

    #[arg(long, env = "VERSION_FILE", default_value = "version.json")]
    pub version_file: PathBuf,

    /// Seconds.
    #[arg(long, env = "DEFAULT_TTL", default_value_t = 60)]
    pub default_ttl: u64,

    /// JSON object of headers sent with every outbound request.
    #[arg(long, env = "DEFAULT_REQUEST_HEADERS", default_value = "")]
    pub default_request_headers: String,

    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    #[arg(long, env = "REFRESH_SECRET", hide_env_values = true)]
    pub refresh_secret: Option<String>,

    #[arg(long, env = "REQUESTS_TIMEOUT_SECONDS", default_value_t = 10)]
    pub requests_timeout_seconds: u64,

    #[arg(long, env = "REQUESTS_MAX_RETRIES", default_value_t = 2)]
    pub requests_max_retries: u32,

    #[arg(long, env = "LIMIT_REQUEST_CONCURRENCY", default_value_t = 16)]
    pub limit_request_concurrency: usize,

    #[arg(long, env = "LIMIT_WORKER_CONCURRENCY", default_value_t = 8)]
    pub limit_worker_concurrency: usize,

    #[arg(long, env = "LIMIT_CHECKS_CONCURRENCY", default_value_t = 4)]
    pub limit_checks_concurrency: usize,

    #[arg(
        long,
        env = "CACHE_LOCK_ENABLED",
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub cache_lock_enabled: bool,

    /// Memory cache when unset.
    #[arg(long, env = "REDIS_CACHE_URL", hide_env_values = true)]
    pub redis_cache_url: Option<String>,

    #[arg(long, env = "REDIS_KEY_PREFIX", default_value = "lookout")]
    pub redis_key_prefix: String,

    /// Lock lease, seconds.
    #[arg(long, env = "REDIS_LOCK_TIMEOUT_SECONDS", default_value_t = 300)]
    pub redis_lock_timeout_seconds: u64,

    /// Maximum wait for a held lock, seconds.
    #[arg(long, env = "REDIS_LOCK_BLOCKING_TIMEOUT_SECONDS", default_value_t = 120)]
    pub redis_lock_blocking_timeout_seconds: u64,

    #[arg(long, env = "BUGTRACKER_URL")]
    pub bugtracker_url: Option<String>,

    #[arg(long, env = "BUGTRACKER_API_KEY", hide_env_values = true)]
    pub bugtracker_api_key: Option<String>,

    #[arg(long, env = "BUGTRACKER_TTL", default_value_t = 3600)]
    pub bugtracker_ttl: u64,

    /// 0 disables history.
    #[arg(long, env = "HISTORY_DAYS", default_value_t = 0)]
    pub history_days: u32,

    #[arg(long, env = "HISTORY_TTL", default_value_t = 3600)]
    pub history_ttl: u64,

    /// Link with `{project}` and `{check}` placeholders.
    #[arg(long, env = "TROUBLESHOOTING_LINK_TEMPLATE")]
    pub troubleshooting_link_template: Option<String>,

    #[arg(long, env = "METRICS_PREFIX", default_value = "lookout")]
    pub metrics_prefix: String,

    /// 0 disables the scheduler lag observer.
    #[arg(long, env = "SCHEDULER_LAG_INTERVAL_SECONDS", default_value_t = 0)]
    pub scheduler_lag_interval_seconds: u64,
}

impl SettingsArgs {
    pub fn into_settings(self) -> anyhow::Result<Settings> {
        let settings = Settings {
            host: self.host,
            port: self.port,
            service_title: non_empty(self.service_title).unwrap_or_default(),
            service_name: self.service_name,
            env_name: self.env_name,
            config_file: self.config_file,
            version_file: self.version_file,
            default_ttl: Duration::from_secs(self.default_ttl),
            default_request_headers: Settings::parse_headers(&self.default_request_headers)?,
            github_token: non_empty(self.github_token),
            refresh_secret: non_empty(self.refresh_secret),
            requests_timeout: Duration::from_secs(self.requests_timeout_seconds),
            requests_max_retries: self.requests_max_retries,
            limit_request_concurrency: self.limit_request_concurrency,
            limit_worker_concurrency: self.limit_worker_concurrency,
            limit_checks_concurrency: self.limit_checks_concurrency,
            cache_lock_enabled: self.cache_lock_enabled,
            redis_cache_url: non_empty(self.redis_cache_url),
            redis_key_prefix: self.redis_key_prefix,
            redis_lock_timeout: Duration::from_secs(self.redis_lock_timeout_seconds),
            redis_lock_blocking_timeout: Duration::from_secs(
                self.redis_lock_blocking_timeout_seconds,
            ),
            bugtracker_url: non_empty(self.bugtracker_url),
            bugtracker_api_key: non_empty(self.bugtracker_api_key),
            bugtracker_ttl: Duration::from_secs(self.bugtracker_ttl),
            history_days: self.history_days,
            history_ttl: Duration::from_secs(self.history_ttl),
            troubleshooting_link_template: non_empty(self.troubleshooting_link_template),
            metrics_prefix: self.metrics_prefix,
            scheduler_lag_interval: Duration::from_secs(self.scheduler_lag_interval_seconds),
        };
        settings.validate()?;
        Ok(settings)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

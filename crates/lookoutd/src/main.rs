//! lookoutd — the lookout daemon.
//!
//! Loads the checks file, assembles the cache, limits, fetcher, runner and
//! collaborators, then either serves the HTTP API or runs checks once.
//!
//! # Usage
//!
//! ```text
//! lookoutd --config-file checks.toml serve
//! lookoutd check core heartbeat --force
//! ```

mod bootstrap;
mod cli;
mod run_once;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use lookout_core::{LogFormat, Settings};
use lookout_metrics::observe_scheduler_lag;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::bootstrap::Services;
use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format)?;
    let settings = cli.settings.into_settings()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            serve(settings).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Check {
            project,
            name,
            force,
        } => {
            let services = Services::build(settings).await?;
            let code = run_once::run(
                &services,
                project.as_deref(),
                name.as_deref(),
                force,
                &mut std::io::stdout(),
            )
            .await?;
            Ok(ExitCode::from(code))
        }
    }
}

/// Logs go to stderr so `check` output stays clean.
fn init_logging(level: &str, format: LogFormat) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_new(level).with_context(|| format!("invalid LOG_LEVEL '{level}'"))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = match format {
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
        LogFormat::Text => builder.try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("installing log subscriber: {e}"))
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    info!(service = %settings.service_name, env = %settings.env_name, "lookout starting");
    let services = Services::build(settings).await?;
    let settings = services.settings.clone();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let lag_handle = if settings.scheduler_lag_interval.is_zero() {
        None
    } else {
        Some(tokio::spawn(observe_scheduler_lag(
            services.metrics.scheduler_lag.with(&["main"]),
            settings.scheduler_lag_interval,
            shutdown_rx,
        )))
    };

    let router = lookout_api::build_router(services.api_state());
    let listener = tokio::net::TcpListener::bind((settings.host.as_str(), settings.port))
        .await
        .with_context(|| format!("binding {}:{}", settings.host, settings.port))?;
    info!(addr = %listener.local_addr()?, "API server starting");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for Ctrl-C, serving until killed");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    if let Some(handle) = lag_handle {
        let _ = handle.await;
    }

    info!("lookout stopped");
    Ok(())
}

mod bootstrap;
mod health;
mod scheduler;
mod webhooks;

#[cfg(test)]
mod test_support;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use outreach_core::config::{AppConfig, LoadOptions};
use outreach_core::pipeline::BatchLimits;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::health::HealthState;
use crate::scheduler::Scheduler;
use crate::webhooks::WebhookState;

#[derive(Debug, Parser)]
#[command(name = "outreach-server", about = "Outreach pipeline scheduler and webhook receiver")]
struct Args {
    /// Run the pipeline and follow-ups once, then exit (1 if any batch reported errors).
    #[arg(long, conflicts_with = "watch")]
    once: bool,
    /// Run on the configured intervals and serve webhooks until interrupted (default).
    #[arg(long)]
    watch: bool,
    /// Use small batch sizes.
    #[arg(long)]
    fast: bool,
    /// Path to the TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn init_logging(config: &AppConfig) {
    use outreach_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    run(args).await
}

async fn run(args: Args) -> Result<ExitCode> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions {
        require_file: args.config.is_some(),
        config_path: args.config.clone(),
        ..LoadOptions::default()
    })?;
    init_logging(&config);

    let limits = if args.fast { BatchLimits::fast() } else { BatchLimits::standard() };
    let app = bootstrap::bootstrap_with_config(config, limits).await?;
    let scheduler = Scheduler::from_config(app.pipeline.clone(), &app.config.pipeline);

    if args.once {
        let summaries = scheduler.run_once().await;
        let failed = summaries.iter().any(|summary| summary.has_errors());
        app.db_pool.close().await;
        return Ok(if failed { ExitCode::from(1) } else { ExitCode::SUCCESS });
    }

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {address}"))?;
    let router = health::router(HealthState::new(app.db_pool.clone(), app.pipeline.clone())).merge(
        webhooks::router(WebhookState::new(
            app.pipeline.clone(),
            app.config.server.webhook_secret.clone(),
        )),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut server_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        fast = args.fast,
        "outreach-server started"
    );

    let tickers = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    wait_for_shutdown().await?;
    tracing::info!(event_name = "system.server.stopping", correlation_id = "shutdown", "outreach-server stopping");
    shutdown_tx.send(true).ok();

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    match tokio::time::timeout(grace, async { (tickers.await, server.await) }).await {
        Ok((tickers, server)) => {
            let runs = tickers.context("scheduler task panicked")?;
            server.context("server task panicked")?.context("server terminated")?;
            tracing::info!(
                event_name = "system.server.stopped",
                pipeline_runs = runs.pipeline,
                follow_up_runs = runs.follow_up,
                "outreach-server stopped"
            );
        }
        Err(_) => {
            tracing::warn!(
                event_name = "system.server.shutdown_timeout",
                grace_secs = grace.as_secs(),
                "in-flight work did not finish before the shutdown grace period"
            );
        }
    }
    app.db_pool.close().await;
    Ok(ExitCode::SUCCESS)
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

use std::sync::Arc;

use outreach_core::config::AppConfig;
use outreach_core::pipeline::{BatchLimits, Pipeline};
use outreach_db::{connect_with_settings, migrations, DbPool};
use outreach_runtime::{build_pipeline, AssemblyError};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub pipeline: Arc<Pipeline>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
}

/// Connects, migrates and assembles the pipeline for an already-loaded config.
pub async fn bootstrap_with_config(
    config: AppConfig,
    limits: BatchLimits,
) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", correlation_id = "bootstrap", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let pipeline = build_pipeline(&config, db_pool.clone())?.with_limits(limits);
    Ok(Application { config, db_pool, pipeline: Arc::new(pipeline) })
}

use std::future::Future;

use outreach_core::config::{AppConfig, LoadOptions};
use outreach_core::pipeline::Pipeline;
use outreach_db::{connect_with_settings, migrations, DbPool};
use outreach_runtime::build_pipeline;
use tokio::runtime::Runtime;

use crate::commands::{CommandResult, EXIT_CONFIG, EXIT_DB, EXIT_MIGRATION, EXIT_RUNTIME};

/// Loaded config, a migrated pool and the assembled pipeline for one command.
pub struct Session {
    runtime: Runtime,
    pub config: AppConfig,
    pub pool: DbPool,
    pub pipeline: Pipeline,
}

impl Session {
    pub fn open(command: &str) -> Result<Self, CommandResult> {
        let config = load_config(command)?;
        let runtime = current_thread_runtime(command)?;

        let pool = runtime.block_on(connect_and_migrate(command, &config))?;
        let pipeline = build_pipeline(&config, pool.clone()).map_err(|error| {
            CommandResult::failure(command, "config_validation", error.to_string(), EXIT_CONFIG)
        })?;

        Ok(Self { runtime, config, pool, pipeline })
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    pub fn close(self) {
        let Self { runtime, pool, .. } = self;
        runtime.block_on(pool.close());
    }
}

pub fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_CONFIG,
        )
    })
}

pub fn current_thread_runtime(command: &str) -> Result<Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            EXIT_RUNTIME,
        )
    })
}

pub async fn connect_and_migrate(command: &str, config: &AppConfig) -> Result<DbPool, CommandResult> {
    let pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(|error| CommandResult::failure(command, "db_connectivity", error.to_string(), EXIT_DB))?;

    migrations::run_pending(&pool)
        .await
        .map_err(|error| CommandResult::failure(command, "migration", error.to_string(), EXIT_MIGRATION))?;

    Ok(pool)
}

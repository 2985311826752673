use std::sync::Arc;

use outreach_agent::{HttpLlmClient, LlmClient, LlmContentGenerator, LlmReplyClassifier};
use outreach_core::clock::SystemClock;
use outreach_core::config::{AppConfig, ConfigError};
use outreach_core::errors::IntegrationError;
use outreach_core::pipeline::{Pipeline, PipelineDeps};
use outreach_db::{DbPool, SqlEventRepository, SqlLeadRepository};
use outreach_slack::notifier_from_config;
use thiserror::Error;
use tracing::info;

use crate::mailer::HttpMailSender;
use crate::scraper::ActorLeadSource;

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not build {component} client: {source}")]
    Client {
        component: &'static str,
        #[source]
        source: IntegrationError,
    },
}

fn client<T>(component: &'static str, result: Result<T, IntegrationError>) -> Result<T, AssemblyError> {
    result.map_err(|source| AssemblyError::Client { component, source })
}

/// Production collaborators: SQLite persistence, the configured LLM provider,
/// the mail API, the scraping actor and Slack.
pub fn production_deps(config: &AppConfig, pool: DbPool) -> Result<PipelineDeps, AssemblyError> {
    let llm: Arc<dyn LlmClient> = Arc::new(client("llm", HttpLlmClient::from_config(&config.llm))?);

    Ok(PipelineDeps {
        store: Arc::new(SqlLeadRepository::new(pool.clone())),
        events: Arc::new(SqlEventRepository::new(pool)),
        lead_source: Arc::new(client("scraper", ActorLeadSource::from_config(&config.scraper))?),
        generator: Arc::new(LlmContentGenerator::new(llm.clone())),
        sender: Arc::new(client("mail", HttpMailSender::from_config(&config.mail))?),
        classifier: Arc::new(LlmReplyClassifier::new(llm)),
        notifier: client("slack", notifier_from_config(&config.slack))?,
        clock: Arc::new(SystemClock),
    })
}

pub fn build_pipeline(config: &AppConfig, pool: DbPool) -> Result<Pipeline, AssemblyError> {
    let settings = config.pipeline_settings()?;
    let deps = production_deps(config, pool)?;
    info!(
        event_name = "runtime.pipeline.assembled",
        llm_provider = %config.llm.provider,
        senders = settings.senders.len(),
        "pipeline assembled"
    );
    Ok(Pipeline::new(deps, settings))
}

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::contact::SearchCriteria;
use crate::pipeline::{BatchLimits, Pacing, PipelineSettings};
use crate::ports::ResearchContext;
use crate::quarantine::QuarantinePolicy;
use crate::window::{parse_rest_day, SendingWindow};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub mail: MailConfig,
    pub scraper: ScraperConfig,
    pub slack: SlackConfig,
    pub pipeline: PipelineConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct MailConfig {
    pub api_key: SecretString,
    pub base_url: String,
    /// Sender identities used round-robin for new sequences.
    pub senders: Vec<String>,
    pub reply_to: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ScraperConfig {
    pub api_token: SecretString,
    pub base_url: String,
    pub actor_id: String,
    pub poll_interval_secs: u64,
    pub max_wait_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    /// Without a webhook, notifications are only logged.
    pub webhook_url: Option<SecretString>,
    pub channel: Option<String>,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub quarantine_threshold: u32,
    pub window_start_hour: u32,
    pub window_end_hour: u32,
    pub rest_day: String,
    pub follow_up_2_delay_days: u32,
    pub follow_up_3_delay_days: u32,
    pub lead_delay_ms: u64,
    pub send_delay_ms: u64,
    pub research_concurrency: usize,
    pub research_chunk_pause_ms: u64,
    pub tick_interval_secs: u64,
    pub follow_up_interval_secs: u64,
    pub offering: String,
    pub search: SearchCriteria,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
    /// Shared secret for `X-Outreach-Signature` on inbound webhooks. Unset disables checking.
    pub webhook_secret: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub mail_api_key: Option<String>,
    pub scraper_api_token: Option<String>,
    pub quarantine_threshold: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://outreach.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 60,
                max_retries: 3,
            },
            mail: MailConfig {
                api_key: String::new().into(),
                base_url: "https://api.resend.com".to_string(),
                senders: Vec::new(),
                reply_to: None,
            },
            scraper: ScraperConfig {
                api_token: String::new().into(),
                base_url: "https://api.apify.com/v2".to_string(),
                actor_id: "code_crafter~leads-finder".to_string(),
                poll_interval_secs: 10,
                max_wait_secs: 600,
            },
            slack: SlackConfig { webhook_url: None, channel: None },
            pipeline: PipelineConfig {
                quarantine_threshold: 3,
                window_start_hour: 9,
                window_end_hour: 17,
                rest_day: "sunday".to_string(),
                follow_up_2_delay_days: 3,
                follow_up_3_delay_days: 4,
                lead_delay_ms: 500,
                send_delay_ms: 600,
                research_concurrency: 5,
                research_chunk_pause_ms: 500,
                tick_interval_secs: 600,
                follow_up_interval_secs: 3600,
                offering: String::new(),
                search: SearchCriteria::default(),
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
                webhook_secret: None,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("outreach.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Stage settings derived from the `pipeline`, `mail` and search sections.
    pub fn pipeline_settings(&self) -> Result<PipelineSettings, ConfigError> {
        let pipeline = &self.pipeline;
        let rest_day = parse_rest_day(&pipeline.rest_day).map_err(ConfigError::Validation)?;
        Ok(PipelineSettings {
            quarantine: QuarantinePolicy::new(pipeline.quarantine_threshold),
            window: SendingWindow::new(
                pipeline.window_start_hour,
                pipeline.window_end_hour,
                rest_day,
            ),
            limits: BatchLimits::standard(),
            follow_up_2_delay: chrono::Duration::days(i64::from(pipeline.follow_up_2_delay_days)),
            follow_up_3_delay: chrono::Duration::days(i64::from(pipeline.follow_up_3_delay_days)),
            lead_pacing: Pacing::sequential(Duration::from_millis(pipeline.lead_delay_ms)),
            research_pacing: Pacing::fan_out(
                pipeline.research_concurrency,
                Duration::from_millis(pipeline.research_chunk_pause_ms),
            ),
            send_pacing: Pacing::sequential(Duration::from_millis(pipeline.send_delay_ms)),
            senders: self.mail.senders.clone(),
            reply_to: self.mail.reply_to.clone(),
            criteria: pipeline.search.clone(),
            research_context: ResearchContext { offering: pipeline.offering.clone() },
        })
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(mail) = patch.mail {
            if let Some(api_key) = mail.api_key {
                self.mail.api_key = secret_value(api_key);
            }
            if let Some(base_url) = mail.base_url {
                self.mail.base_url = base_url;
            }
            if let Some(senders) = mail.senders {
                self.mail.senders = senders;
            }
            if let Some(reply_to) = mail.reply_to {
                self.mail.reply_to = Some(reply_to);
            }
        }

        if let Some(scraper) = patch.scraper {
            if let Some(api_token) = scraper.api_token {
                self.scraper.api_token = secret_value(api_token);
            }
            if let Some(base_url) = scraper.base_url {
                self.scraper.base_url = base_url;
            }
            if let Some(actor_id) = scraper.actor_id {
                self.scraper.actor_id = actor_id;
            }
            if let Some(poll_interval_secs) = scraper.poll_interval_secs {
                self.scraper.poll_interval_secs = poll_interval_secs;
            }
            if let Some(max_wait_secs) = scraper.max_wait_secs {
                self.scraper.max_wait_secs = max_wait_secs;
            }
        }

        if let Some(slack) = patch.slack {
            if let Some(webhook_url) = slack.webhook_url {
                self.slack.webhook_url = Some(secret_value(webhook_url));
            }
            if let Some(channel) = slack.channel {
                self.slack.channel = Some(channel);
            }
        }

        if let Some(pipeline) = patch.pipeline {
            self.apply_pipeline_patch(pipeline);
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
            if let Some(webhook_secret) = server.webhook_secret {
                self.server.webhook_secret = Some(secret_value(webhook_secret));
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_pipeline_patch(&mut self, patch: PipelinePatch) {
        let pipeline = &mut self.pipeline;
        if let Some(value) = patch.quarantine_threshold {
            pipeline.quarantine_threshold = value;
        }
        if let Some(value) = patch.window_start_hour {
            pipeline.window_start_hour = value;
        }
        if let Some(value) = patch.window_end_hour {
            pipeline.window_end_hour = value;
        }
        if let Some(value) = patch.rest_day {
            pipeline.rest_day = value;
        }
        if let Some(value) = patch.follow_up_2_delay_days {
            pipeline.follow_up_2_delay_days = value;
        }
        if let Some(value) = patch.follow_up_3_delay_days {
            pipeline.follow_up_3_delay_days = value;
        }
        if let Some(value) = patch.lead_delay_ms {
            pipeline.lead_delay_ms = value;
        }
        if let Some(value) = patch.send_delay_ms {
            pipeline.send_delay_ms = value;
        }
        if let Some(value) = patch.research_concurrency {
            pipeline.research_concurrency = value;
        }
        if let Some(value) = patch.research_chunk_pause_ms {
            pipeline.research_chunk_pause_ms = value;
        }
        if let Some(value) = patch.tick_interval_secs {
            pipeline.tick_interval_secs = value;
        }
        if let Some(value) = patch.follow_up_interval_secs {
            pipeline.follow_up_interval_secs = value;
        }
        if let Some(value) = patch.offering {
            pipeline.offering = value;
        }
        if let Some(search) = patch.search {
            pipeline.search = search;
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("OUTREACH_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("OUTREACH_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("OUTREACH_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("OUTREACH_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("OUTREACH_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("OUTREACH_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("OUTREACH_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("OUTREACH_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("OUTREACH_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("OUTREACH_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("OUTREACH_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("OUTREACH_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("OUTREACH_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("OUTREACH_MAIL_API_KEY") {
            self.mail.api_key = secret_value(value);
        }
        if let Some(value) = read_env("OUTREACH_MAIL_BASE_URL") {
            self.mail.base_url = value;
        }
        if let Some(value) = read_env("OUTREACH_MAIL_SENDERS") {
            self.mail.senders = split_list(&value);
        }
        if let Some(value) = read_env("OUTREACH_MAIL_REPLY_TO") {
            self.mail.reply_to = Some(value);
        }

        if let Some(value) = read_env("OUTREACH_SCRAPER_API_TOKEN") {
            self.scraper.api_token = secret_value(value);
        }
        if let Some(value) = read_env("OUTREACH_SCRAPER_BASE_URL") {
            self.scraper.base_url = value;
        }
        if let Some(value) = read_env("OUTREACH_SCRAPER_ACTOR_ID") {
            self.scraper.actor_id = value;
        }

        if let Some(value) = read_env("OUTREACH_SLACK_WEBHOOK_URL") {
            self.slack.webhook_url = Some(secret_value(value));
        }
        if let Some(value) = read_env("OUTREACH_SLACK_CHANNEL") {
            self.slack.channel = Some(value);
        }

        if let Some(value) = read_env("OUTREACH_PIPELINE_QUARANTINE_THRESHOLD") {
            self.pipeline.quarantine_threshold =
                parse_u32("OUTREACH_PIPELINE_QUARANTINE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("OUTREACH_PIPELINE_REST_DAY") {
            self.pipeline.rest_day = value;
        }
        if let Some(value) = read_env("OUTREACH_PIPELINE_OFFERING") {
            self.pipeline.offering = value;
        }
        if let Some(value) = read_env("OUTREACH_PIPELINE_TICK_INTERVAL_SECS") {
            self.pipeline.tick_interval_secs =
                parse_u64("OUTREACH_PIPELINE_TICK_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("OUTREACH_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("OUTREACH_SERVER_PORT") {
            self.server.port = parse_u16("OUTREACH_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("OUTREACH_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("OUTREACH_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("OUTREACH_SERVER_WEBHOOK_SECRET") {
            self.server.webhook_secret = Some(secret_value(value));
        }

        let log_level =
            read_env("OUTREACH_LOGGING_LEVEL").or_else(|| read_env("OUTREACH_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("OUTREACH_LOGGING_FORMAT").or_else(|| read_env("OUTREACH_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(mail_api_key) = overrides.mail_api_key {
            self.mail.api_key = secret_value(mail_api_key);
        }
        if let Some(scraper_api_token) = overrides.scraper_api_token {
            self.scraper.api_token = secret_value(scraper_api_token);
        }
        if let Some(threshold) = overrides.quarantine_threshold {
            self.pipeline.quarantine_threshold = threshold;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_mail(&self.mail)?;
        validate_scraper(&self.scraper)?;
        validate_pipeline(&self.pipeline)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("outreach.toml"), PathBuf::from("config/outreach.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty()).map(str::to_owned).collect()
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_mail(mail: &MailConfig) -> Result<(), ConfigError> {
    if mail.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "mail.api_key is required (set OUTREACH_MAIL_API_KEY)".to_string(),
        ));
    }
    validate_http_url("mail.base_url", &mail.base_url)?;

    if mail.senders.iter().all(|sender| sender.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "mail.senders must list at least one sender address".to_string(),
        ));
    }
    if let Some(sender) = mail.senders.iter().find(|sender| !sender.contains('@')) {
        return Err(ConfigError::Validation(format!(
            "mail.senders entry `{sender}` is not an email address"
        )));
    }

    Ok(())
}

fn validate_scraper(scraper: &ScraperConfig) -> Result<(), ConfigError> {
    if scraper.api_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "scraper.api_token is required (set OUTREACH_SCRAPER_API_TOKEN)".to_string(),
        ));
    }
    validate_http_url("scraper.base_url", &scraper.base_url)?;

    if scraper.actor_id.trim().is_empty() {
        return Err(ConfigError::Validation("scraper.actor_id must not be empty".to_string()));
    }
    if scraper.poll_interval_secs == 0 || scraper.max_wait_secs < scraper.poll_interval_secs {
        return Err(ConfigError::Validation(
            "scraper.poll_interval_secs must be positive and not exceed scraper.max_wait_secs"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_pipeline(pipeline: &PipelineConfig) -> Result<(), ConfigError> {
    if pipeline.quarantine_threshold == 0 {
        return Err(ConfigError::Validation(
            "pipeline.quarantine_threshold must be greater than zero".to_string(),
        ));
    }

    if pipeline.window_end_hour > 24 || pipeline.window_start_hour >= pipeline.window_end_hour {
        return Err(ConfigError::Validation(
            "pipeline.window_start_hour must be before pipeline.window_end_hour (hours 0..=24)"
                .to_string(),
        ));
    }

    parse_rest_day(&pipeline.rest_day)
        .map_err(|message| ConfigError::Validation(format!("pipeline.rest_day: {message}")))?;

    if pipeline.research_concurrency == 0 {
        return Err(ConfigError::Validation(
            "pipeline.research_concurrency must be greater than zero".to_string(),
        ));
    }

    if pipeline.tick_interval_secs == 0 || pipeline.follow_up_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "pipeline tick intervals must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_http_url(field: &str, url: &str) -> Result<(), ConfigError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("{field} must start with http:// or https://")))
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    mail: Option<MailPatch>,
    scraper: Option<ScraperPatch>,
    slack: Option<SlackPatch>,
    pipeline: Option<PipelinePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct MailPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    senders: Option<Vec<String>>,
    reply_to: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ScraperPatch {
    api_token: Option<String>,
    base_url: Option<String>,
    actor_id: Option<String>,
    poll_interval_secs: Option<u64>,
    max_wait_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    webhook_url: Option<String>,
    channel: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelinePatch {
    quarantine_threshold: Option<u32>,
    window_start_hour: Option<u32>,
    window_end_hour: Option<u32>,
    rest_day: Option<String>,
    follow_up_2_delay_days: Option<u32>,
    follow_up_3_delay_days: Option<u32>,
    lead_delay_ms: Option<u64>,
    send_delay_ms: Option<u64>,
    research_concurrency: Option<usize>,
    research_chunk_pause_ms: Option<u64>,
    tick_interval_secs: Option<u64>,
    follow_up_interval_secs: Option<u64>,
    offering: Option<String>,
    search: Option<SearchCriteria>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
    webhook_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use chrono::Weekday;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const REQUIRED_VARS: [&str; 3] =
        ["OUTREACH_MAIL_API_KEY", "OUTREACH_MAIL_SENDERS", "OUTREACH_SCRAPER_API_TOKEN"];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn set_required() {
        env::set_var("OUTREACH_MAIL_API_KEY", "re_test_key");
        env::set_var("OUTREACH_MAIL_SENDERS", "a@seller.test, b@seller.test");
        env::set_var("OUTREACH_SCRAPER_API_TOKEN", "apify_test_token");
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        env::set_var("TEST_MAIL_KEY", "re_from_env");
        env::set_var("TEST_SCRAPER_TOKEN", "apify_from_env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("outreach.toml");
            fs::write(
                &path,
                r#"
[mail]
api_key = "${TEST_MAIL_KEY}"
senders = ["sdr@seller.test"]

[scraper]
api_token = "${TEST_SCRAPER_TOKEN}"

[pipeline]
offering = "observability for data teams"
rest_day = "saturday"

[pipeline.search]
locations = ["Germany"]
titles = ["CTO", "VP Engineering"]
max_results = 0
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.mail.api_key.expose_secret() == "re_from_env",
                "mail key should be loaded from environment",
            )?;
            ensure(
                config.scraper.api_token.expose_secret() == "apify_from_env",
                "scraper token should be loaded from environment",
            )?;
            ensure(config.pipeline.search.titles.len() == 2, "search titles should be parsed")?;

            let settings =
                config.pipeline_settings().map_err(|err| format!("settings failed: {err}"))?;
            ensure(
                settings.window.rest_day == Some(Weekday::Sat),
                "rest day should come from the file",
            )?;
            ensure(
                settings.research_context.offering == "observability for data teams",
                "offering should reach the research context",
            )?;
            ensure(settings.senders == vec!["sdr@seller.test"], "senders should carry over")?;
            Ok(())
        })();

        clear_vars(&["TEST_MAIL_KEY", "TEST_SCRAPER_TOKEN"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        set_required();
        env::set_var("OUTREACH_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("OUTREACH_PIPELINE_QUARANTINE_THRESHOLD", "5");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("outreach.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[pipeline]
quarantine_threshold = 2

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.pipeline.quarantine_threshold == 5,
                "env threshold should win over the file",
            )?;
            ensure(config.mail.senders.len() == 2, "comma separated senders should be split")?;
            Ok(())
        })();

        clear_vars(&REQUIRED_VARS);
        clear_vars(&["OUTREACH_DATABASE_URL", "OUTREACH_PIPELINE_QUARANTINE_THRESHOLD"]);
        result
    }

    #[test]
    fn missing_mail_key_fails_fast() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        set_required();
        env::remove_var("OUTREACH_MAIL_API_KEY");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::Validation(ref message) if message.contains("mail.api_key")),
                "validation failure should mention mail.api_key",
            )
        })();

        clear_vars(&REQUIRED_VARS);
        result
    }

    #[test]
    fn invalid_window_and_rest_day_are_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        set_required();

        let result = (|| -> Result<(), String> {
            let mut config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            config.pipeline.window_start_hour = 18;
            ensure(config.validate().is_err(), "start after end should be rejected")?;

            config.pipeline.window_start_hour = 9;
            config.pipeline.rest_day = "funday".to_string();
            let rejected = matches!(
                config.validate(),
                Err(ConfigError::Validation(ref message)) if message.contains("rest_day")
            );
            ensure(rejected, "unknown rest day should be rejected")?;

            config.pipeline.rest_day = "none".to_string();
            let settings =
                config.pipeline_settings().map_err(|err| format!("settings failed: {err}"))?;
            ensure(settings.window.rest_day.is_none(), "`none` should disable the rest day")
        })();

        clear_vars(&REQUIRED_VARS);
        result
    }

    #[test]
    fn invalid_numeric_env_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        set_required();
        env::set_var("OUTREACH_SERVER_PORT", "eighty");

        let result = (|| -> Result<(), String> {
            let rejected = matches!(
                AppConfig::load(LoadOptions::default()),
                Err(ConfigError::InvalidEnvOverride { ref key, .. }) if key == "OUTREACH_SERVER_PORT"
            );
            ensure(rejected, "non-numeric port should be an invalid override")
        })();

        clear_vars(&REQUIRED_VARS);
        clear_vars(&["OUTREACH_SERVER_PORT"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        set_required();
        env::set_var("OUTREACH_SLACK_WEBHOOK_URL", "https://hooks.slack.test/secret-path");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("re_test_key"), "debug output should not contain mail key")?;
            ensure(
                !debug.contains("apify_test_token"),
                "debug output should not contain scraper token",
            )?;
            ensure(
                !debug.contains("secret-path"),
                "debug output should not contain the webhook url",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&REQUIRED_VARS);
        clear_vars(&["OUTREACH_SLACK_WEBHOOK_URL"]);
        result
    }
}

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use outreach_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

/// Renders the effective configuration, one line per key, with where each value came from.
pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let file_path = detect_config_path();
    let file_doc = load_config_file_doc(file_path.as_deref());
    let sources = Sources { file_doc: file_doc.as_ref(), file_path: file_path.as_deref() };

    let entries: Vec<(&str, String)> = vec![
        ("database.url", config.database.url.clone()),
        ("database.max_connections", config.database.max_connections.to_string()),
        ("database.timeout_secs", config.database.timeout_secs.to_string()),
        ("llm.provider", config.llm.provider.to_string()),
        ("llm.model", config.llm.model.clone()),
        ("llm.base_url", config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string())),
        ("llm.api_key", redact_optional(config.llm.api_key.as_ref())),
        ("llm.max_retries", config.llm.max_retries.to_string()),
        ("mail.api_key", redact_token(config.mail.api_key.expose_secret())),
        ("mail.base_url", config.mail.base_url.clone()),
        ("mail.senders", config.mail.senders.join(", ")),
        ("scraper.api_token", redact_token(config.scraper.api_token.expose_secret())),
        ("scraper.actor_id", config.scraper.actor_id.clone()),
        ("slack.webhook_url", redact_optional(config.slack.webhook_url.as_ref())),
        ("slack.channel", config.slack.channel.clone().unwrap_or_else(|| "<unset>".to_string())),
        ("pipeline.quarantine_threshold", config.pipeline.quarantine_threshold.to_string()),
        (
            "pipeline.window",
            format!(
                "{:02}:00-{:02}:00, rest day {}",
                config.pipeline.window_start_hour,
                config.pipeline.window_end_hour,
                config.pipeline.rest_day
            ),
        ),
        ("pipeline.tick_interval_secs", config.pipeline.tick_interval_secs.to_string()),
        ("pipeline.follow_up_interval_secs", config.pipeline.follow_up_interval_secs.to_string()),
        ("server.bind_address", config.server.bind_address.clone()),
        ("server.port", config.server.port.to_string()),
        ("server.webhook_secret", redact_optional(config.server.webhook_secret.as_ref())),
        ("logging.level", config.logging.level.clone()),
        ("logging.format", format!("{:?}", config.logging.format).to_ascii_lowercase()),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(
        entries.into_iter().map(|(key, value)| render_line(key, &value, sources.source_of(key))),
    );
    lines.join("\n")
}

struct Sources<'a> {
    file_doc: Option<&'a Value>,
    file_path: Option<&'a Path>,
}

impl Sources<'_> {
    fn source_of(&self, key_path: &str) -> String {
        // `pipeline.window` aggregates three keys; attribute it by its start hour.
        let key_path = if key_path == "pipeline.window" { "pipeline.window_start_hour" } else { key_path };

        let env_key = env_key_for(key_path);
        if env::var_os(&env_key).is_some() {
            return format!("env ({env_key})");
        }

        if let Some(doc) = self.file_doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .file_path
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

fn env_key_for(key_path: &str) -> String {
    format!("OUTREACH_{}", key_path.replace('.', "_").to_ascii_uppercase())
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("outreach.toml"), PathBuf::from("config/outreach.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_optional(secret: Option<&SecretString>) -> String {
    match secret {
        Some(secret) => redact_token(secret.expose_secret()),
        None => "<unset>".to_string(),
    }
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('_') {
        return format!("{prefix}_***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use super::{env_key_for, redact_token};

    #[test]
    fn env_keys_follow_the_section_and_field() {
        assert_eq!(env_key_for("mail.api_key"), "OUTREACH_MAIL_API_KEY");
        assert_eq!(env_key_for("pipeline.window_start_hour"), "OUTREACH_PIPELINE_WINDOW_START_HOUR");
    }

    #[test]
    fn redaction_keeps_only_the_key_prefix() {
        assert_eq!(redact_token("re_live_abcdef"), "re_***");
        assert_eq!(redact_token("opaque"), "<redacted>");
        assert_eq!(redact_token("  "), "<empty>");
    }
}

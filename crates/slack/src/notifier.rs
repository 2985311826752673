use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use outreach_core::config::SlackConfig;
use outreach_core::errors::IntegrationError;
use outreach_core::ports::{Notification, Notifier};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, info};

use crate::blocks::{notification_message, MessageTemplate};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct WebhookPayload<'a> {
    #[serde(flatten)]
    message: &'a MessageTemplate,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<&'a str>,
}

/// Posts Block Kit messages to a Slack incoming webhook.
pub struct SlackWebhookNotifier {
    webhook_url: SecretString,
    channel: Option<String>,
    client: reqwest::Client,
}

impl SlackWebhookNotifier {
    pub fn new(webhook_url: SecretString, channel: Option<String>) -> Result<Self, IntegrationError> {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|error| IntegrationError::Rejected(format!("slack client: {error}")))?;
        Ok(Self { webhook_url, channel, client })
    }
}

#[async_trait]
impl Notifier for SlackWebhookNotifier {
    async fn post(&self, notification: &Notification) -> Result<(), IntegrationError> {
        let message = notification_message(notification);
        let payload = WebhookPayload { message: &message, channel: self.channel.as_deref() };

        let response = self
            .client
            .post(self.webhook_url.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    IntegrationError::Timeout(format!("slack: {error}"))
                } else {
                    IntegrationError::Network(format!("slack: {error}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IntegrationError::Http {
                status: status.as_u16(),
                message: format!("slack: {}", body.chars().take(200).collect::<String>()),
            });
        }

        debug!(event_name = "slack.webhook.posted", blocks = message.blocks.len());
        Ok(())
    }
}

/// Writes notifications to the log when no webhook is configured.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn post(&self, notification: &Notification) -> Result<(), IntegrationError> {
        let message = notification_message(notification);
        info!(event_name = "slack.notification.logged", text = %message.fallback_text);
        Ok(())
    }
}

pub fn notifier_from_config(config: &SlackConfig) -> Result<Arc<dyn Notifier>, IntegrationError> {
    match &config.webhook_url {
        Some(url) if !url.expose_secret().trim().is_empty() => Ok(Arc::new(
            SlackWebhookNotifier::new(url.clone(), config.channel.clone())?,
        )),
        _ => Ok(Arc::new(LogNotifier)),
    }
}

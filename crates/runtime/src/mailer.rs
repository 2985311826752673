use std::time::Duration;

use async_trait::async_trait;
use outreach_agent::http::{check_status, transport_error};
use outreach_core::config::MailConfig;
use outreach_core::errors::IntegrationError;
use outreach_core::ports::{MessageSender, OutboundEmail, SentMessage};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

const SERVICE: &str = "mail";
const SEND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
}

#[derive(Deserialize)]
struct SendEmailResponse {
    id: String,
}

/// Transactional mail API client (`POST {base}/emails`, bearer auth).
pub struct HttpMailSender {
    base_url: String,
    api_key: SecretString,
    client: reqwest::Client,
}

impl HttpMailSender {
    pub fn from_config(config: &MailConfig) -> Result<Self, IntegrationError> {
        let client = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|error| IntegrationError::Rejected(format!("mail client: {error}")))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client,
        })
    }
}

#[async_trait]
impl MessageSender for HttpMailSender {
    async fn send(&self, email: &OutboundEmail) -> Result<SentMessage, IntegrationError> {
        let request = SendEmailRequest {
            from: &email.from,
            to: [&email.to],
            subject: &email.subject,
            text: &email.body,
            reply_to: email.reply_to.as_deref(),
        };
        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|error| transport_error(SERVICE, error))?;
        let response = check_status(SERVICE, response).await?;
        let body: SendEmailResponse =
            response.json().await.map_err(|error| transport_error(SERVICE, error))?;

        if body.id.trim().is_empty() {
            return Err(IntegrationError::InvalidResponse("mail: empty message id".to_string()));
        }
        debug!(event_name = "mail.sent", message_id = %body.id);
        Ok(SentMessage { message_id: body.id })
    }
}

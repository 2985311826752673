use std::time::Duration;

use async_trait::async_trait;
use outreach_core::config::{LlmConfig, LlmProvider};
use outreach_core::errors::IntegrationError;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;

use crate::http::{check_status, transport_error};

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self { system: system.into(), prompt: prompt.into(), max_tokens: 1_024, temperature: 0.4 }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, IntegrationError>;
}

/// Chat-completion client for the configured provider.
pub struct HttpLlmClient {
    provider: LlmProvider,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    client: reqwest::Client,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, IntegrationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| IntegrationError::Rejected(format!("llm client: {error}")))?;
        let base_url = match (&config.base_url, config.provider) {
            (Some(url), _) if !url.trim().is_empty() => url.trim_end_matches('/').to_string(),
            (_, LlmProvider::Anthropic) => ANTHROPIC_BASE_URL.to_string(),
            (_, LlmProvider::OpenAi) => OPENAI_BASE_URL.to_string(),
            (_, LlmProvider::Ollama) => "http://localhost:11434".to_string(),
        };

        Ok(Self {
            provider: config.provider,
            base_url,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            client,
        })
    }

    fn service(&self) -> &'static str {
        match self.provider {
            LlmProvider::OpenAi => "openai",
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::Ollama => "ollama",
        }
    }

    fn endpoint(&self) -> String {
        match self.provider {
            LlmProvider::Anthropic => format!("{}/v1/messages", self.base_url),
            LlmProvider::OpenAi => format!("{}/chat/completions", self.base_url),
            // Ollama serves the OpenAI-compatible API under /v1.
            LlmProvider::Ollama if self.base_url.ends_with("/v1") => {
                format!("{}/chat/completions", self.base_url)
            }
            LlmProvider::Ollama => format!("{}/v1/chat/completions", self.base_url),
        }
    }

    fn body(&self, request: &CompletionRequest) -> Value {
        match self.provider {
            LlmProvider::Anthropic => json!({
                "model": self.model,
                "max_tokens": request.max_tokens,
                "temperature": request.temperature,
                "system": request.system,
                "messages": [{ "role": "user", "content": request.prompt }],
            }),
            LlmProvider::OpenAi | LlmProvider::Ollama => json!({
                "model": self.model,
                "max_tokens": request.max_tokens,
                "temperature": request.temperature,
                "messages": [
                    { "role": "system", "content": request.system },
                    { "role": "user", "content": request.prompt },
                ],
            }),
        }
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let Some(key) = &self.api_key else {
            return builder;
        };
        match self.provider {
            LlmProvider::Anthropic => builder
                .header("x-api-key", key.expose_secret())
                .header("anthropic-version", ANTHROPIC_VERSION),
            LlmProvider::OpenAi | LlmProvider::Ollama => builder.bearer_auth(key.expose_secret()),
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, IntegrationError> {
        let service = self.service();
        let builder = self.client.post(self.endpoint()).json(&self.body(request));
        let response = self
            .authorize(builder)
            .send()
            .await
            .map_err(|error| transport_error(service, error))?;
        let response = check_status(service, response).await?;
        let payload: Value =
            response.json().await.map_err(|error| transport_error(service, error))?;

        let text = match self.provider {
            LlmProvider::Anthropic => anthropic_text(&payload),
            LlmProvider::OpenAi | LlmProvider::Ollama => {
                payload["choices"][0]["message"]["content"].as_str().map(str::to_owned)
            }
        };
        let text = text.ok_or_else(|| {
            IntegrationError::InvalidResponse(format!("{service}: completion has no text content"))
        })?;
        debug!(event_name = "llm.completion.received", provider = service, chars = text.len());
        Ok(text)
    }
}

fn anthropic_text(payload: &Value) -> Option<String> {
    let blocks = payload["content"].as_array()?;
    let text: Vec<&str> = blocks
        .iter()
        .filter(|block| block["type"] == "text")
        .filter_map(|block| block["text"].as_str())
        .collect();
    (!text.is_empty()).then(|| text.join(""))
}

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::errors::ProviderError;
use crate::providers::{Provider, RateLimiter, http_client, send_json};

const DEFAULT_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Output budget for one batch; a JSON array of a full batch fits well inside it
const MAX_OUTPUT_TOKENS: u32 = 8192;

/// Anthropic Messages API client
#[derive(Debug)]
pub struct Anthropic {
    client: Client,
    api_key: String,
    /// Base URL override; empty means the public API
    endpoint: String,
    model: String,
    temperature: f32,
    rate_limiter: Option<RateLimiter>,
}

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One conversation turn
#[derive(Debug, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// Body of a `POST /v1/messages` call
#[derive(Debug, Serialize)]
pub struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: Vec<Turn>,
}

impl MessagesRequest {
    fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            max_tokens: MAX_OUTPUT_TOKENS,
            system: None,
            temperature: None,
            messages: Vec::new(),
        }
    }

    fn turn(mut self, role: Role, content: &str) -> Self {
        self.messages.push(Turn {
            role,
            content: content.to_string(),
        });
        self
    }
}

/// A block of the assistant reply; only `text` blocks carry output
#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Reply to a messages call
#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    pub content: Vec<ContentBlock>,
    /// `end_turn`, `max_tokens`, `stop_sequence`
    #[serde(default)]
    pub stop_reason: Option<String>,
    pub usage: Usage,
}

impl MessagesResponse {
    /// True when the reply was cut off by the output budget
    pub fn truncated(&self) -> bool {
        self.stop_reason.as_deref() == Some("max_tokens")
    }
}

impl Anthropic {
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: http_client(120),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            model: model.into(),
            temperature: 0.3,
            rate_limiter: None,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.client = http_client(timeout_secs);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_rate_limit(mut self, requests_per_minute: Option<u32>) -> Self {
        self.rate_limiter = RateLimiter::per_minute(requests_per_minute);
        self
    }

    fn messages_url(&self) -> String {
        match self.endpoint.trim_end_matches('/') {
            "" => DEFAULT_URL.to_string(),
            base => format!("{}/v1/messages", base),
        }
    }
}

#[async_trait]
impl Provider for Anthropic {
    type Request = MessagesRequest;
    type Response = MessagesResponse;

    fn name(&self) -> &str {
        "Anthropic"
    }

    fn build_request(&self, system: &str, prompt: &str) -> Self::Request {
        let mut request = MessagesRequest::new(&self.model).turn(Role::User, prompt);
        request.system = Some(system.to_string());
        request.temperature = Some(self.temperature);
        request
    }

    async fn complete(&self, request: Self::Request) -> Result<Self::Response, ProviderError> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.acquire().await;
        }

        let response: MessagesResponse = send_json(
            self.name(),
            self.client
                .post(self.messages_url())
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .json(&request),
        )
        .await?;

        log::debug!(
            "Anthropic usage: {} in / {} out",
            response.usage.input_tokens,
            response.usage.output_tokens
        );
        if response.truncated() {
            log::warn!("Anthropic reply hit the output limit; the batch will likely fail to parse");
        }
        Ok(response)
    }

    fn extract_text(response: &Self::Response) -> String {
        response
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect()
    }
}

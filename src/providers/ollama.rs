use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::ProviderError;
use crate::providers::{Provider, RateLimiter, send_json};

const DEFAULT_PORT: u16 = 11434;

/// Client for a local or LAN Ollama server
#[derive(Debug)]
pub struct Ollama {
    base_url: String,
    client: Client,
    model: String,
    temperature: f32,
    rate_limiter: Option<RateLimiter>,
}

/// Sampling knobs sent under `options`
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

/// Body of a `POST /api/chat` call; always non-streaming
#[derive(Debug, Serialize)]
pub struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    options: ChatOptions,
    /// `json` constrains the model to emit a JSON document
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub message: ChatMessage,
    #[serde(default)]
    pub done_reason: Option<String>,
    #[serde(default)]
    pub prompt_eval_count: Option<u64>,
    #[serde(default)]
    pub eval_count: Option<u64>,
}

/// Build a base URL from a host that may lack a scheme or a port
pub fn normalize_base_url(host: &str, default_port: u16) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.is_empty() {
        return format!("http://localhost:{}", default_port);
    }

    let (scheme, rest) = host.split_once("://").unwrap_or(("http", host));
    let authority = rest.split('/').next().unwrap_or(rest);
    if authority.contains(':') {
        format!("{}://{}", scheme, rest)
    } else {
        format!("{}://{}:{}", scheme, rest, default_port)
    }
}

impl Ollama {
    /// Client for `endpoint`, e.g. `gpu-box` or `http://localhost:11434`
    pub fn new(endpoint: &str, model: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(endpoint, DEFAULT_PORT),
            client: Self::pooled_client(120),
            model: model.into(),
            temperature: 0.3,
            rate_limiter: None,
        }
    }

    // HTTP/1.1 only, with pooled keep-alive connections for concurrent batches
    fn pooled_client(timeout_secs: u64) -> Client {
        Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .http1_only()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .unwrap_or_default()
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.client = Self::pooled_client(timeout_secs);
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

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Provider for Ollama {
    type Request = ChatRequest;
    type Response = ChatResponse;

    fn name(&self) -> &str {
        "Ollama"
    }

    fn build_request(&self, system: &str, prompt: &str) -> Self::Request {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::new("system", system), ChatMessage::new("user", prompt)],
            options: ChatOptions {
                temperature: Some(self.temperature),
                num_predict: None,
            },
            format: Some("json"),
            stream: false,
        }
    }

    async fn complete(&self, request: Self::Request) -> Result<Self::Response, ProviderError> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.acquire().await;
        }

        let response: ChatResponse = send_json(
            self.name(),
            self.client.post(format!("{}/api/chat", self.base_url)).json(&request),
        )
        .await?;

        if let (Some(prompt), Some(output)) = (response.prompt_eval_count, response.eval_count) {
            log::debug!("Ollama {}: {} prompt / {} output tokens", self.model, prompt, output);
        }
        if response.done_reason.as_deref() == Some("length") {
            log::warn!("Ollama reply was cut at the length limit");
        }
        Ok(response)
    }

    fn extract_text(response: &Self::Response) -> String {
        response.message.content.clone()
    }
}

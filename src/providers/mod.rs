/*!
 * Provider implementations for different LLM services.
 *
 * This module contains client implementations for various LLM providers:
 * - OpenAI-compatible chat completions (OpenAI, Groq, OpenRouter, LM Studio)
 * - Gemini: Google Generative Language API
 * - Anthropic: Anthropic Messages API
 * - Ollama: Local LLM server
 *
 * Providers only move text over HTTP. Retries, backoff and response
 * interpretation belong to the translation layer.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::time::{Duration, Instant};

use crate::errors::ProviderError;

/// Common trait for all LLM providers
///
/// This trait defines the interface that all provider implementations must follow,
/// allowing them to be used interchangeably by the translation backend.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// The request type for this provider
    type Request: Send + Sync;

    /// The response type for this provider
    type Response: Send + Sync;

    /// Human-readable provider name
    fn name(&self) -> &str;

    /// Build a request from a system instruction and a user prompt
    fn build_request(&self, system: &str, prompt: &str) -> Self::Request;

    /// Complete a request using this provider
    ///
    /// # Arguments
    /// * `request` - The request to complete
    ///
    /// # Returns
    /// * `Result<Self::Response, ProviderError>` - The response from the provider or an error
    async fn complete(&self, request: Self::Request) -> Result<Self::Response, ProviderError>;

    /// Test the connection to the provider
    ///
    /// # Returns
    /// * `Result<(), ProviderError>` - Ok if the connection is successful, or an error
    async fn test_connection(&self) -> Result<(), ProviderError> {
        let request = self.build_request("Reply with OK.", "ping");
        self.complete(request).await.map(|_| ())
    }

    /// Extract text from the provider response
    ///
    /// # Arguments
    /// * `response` - The response from the provider
    ///
    /// # Returns
    /// * `String` - The extracted text
    fn extract_text(response: &Self::Response) -> String;
}

/// Client-side spacing of requests to stay under a requests-per-minute budget
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Instant>,
}

impl RateLimiter {
    /// Create a limiter for `requests_per_minute`; `None` or zero disables it
    pub fn per_minute(requests_per_minute: Option<u32>) -> Option<Self> {
        let rpm = requests_per_minute.filter(|r| *r > 0)?;
        Some(Self {
            interval: Duration::from_millis(60_000 / u64::from(rpm)),
            next_slot: Mutex::new(Instant::now()),
        })
    }

    /// Wait until the next request slot
    pub async fn acquire(&self) {
        let wait = {
            let mut next = self.next_slot.lock();
            let now = Instant::now();
            let slot = (*next).max(now);
            *next = slot + self.interval;
            slot - now
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

/// Build the shared HTTP client with the configured timeout
pub(crate) fn http_client(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_default()
}

/// Send a prepared request and decode a JSON body, mapping HTTP failures
pub(crate) async fn send_json<R: DeserializeOwned>(
    provider: &str,
    request: RequestBuilder,
) -> Result<R, ProviderError> {
    let response = request.send().await?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to get error response text".to_string());
        log::error!("{} API error ({}): {}", provider, status, error_text);
        return Err(ProviderError::from_status(status.as_u16(), error_text));
    }

    response
        .json::<R>()
        .await
        .map_err(|e| ProviderError::ParseError(format!("{} response: {}", provider, e)))
}

pub mod anthropic;
pub mod gemini;
pub mod ollama;
pub mod openai;

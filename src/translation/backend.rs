/*!
 * Translation backends.
 *
 * A backend turns a batch of entries into one translation per entry, in
 * order. `LlmBackend` drives any HTTP `Provider` with JSON prompts;
 * `MockBackend` is deterministic and offline.
 */

use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::app_config::{TranslationConfig, TranslationProvider};
use crate::catalog::mirror_whitespace;
use crate::errors::BackendError;
use crate::providers::Provider;
use crate::providers::anthropic::Anthropic;
use crate::providers::gemini::Gemini;
use crate::providers::ollama::Ollama;
use crate::providers::openai::OpenAI;
use crate::translation::batch::Batch;
use crate::translation::context::ContextBundle;
use crate::translation::prompts::PromptBuilder;

/// Something that can translate a batch of catalog entries
#[async_trait]
pub trait TranslationBackend: Send + Sync + Debug {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Translate every entry of the batch
    ///
    /// # Returns
    /// * `(key, translation)` pairs, one per entry, in batch order
    async fn translate(
        &self,
        batch: &Batch,
        context: &ContextBundle,
    ) -> Result<Vec<(String, String)>, BackendError>;

    /// Check that the backend is reachable and credentials work
    async fn check(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

/// Strip code fences and surrounding prose from a JSON reply
pub fn clean_json_response(text: &str) -> &str {
    let mut cleaned = text.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest.trim();
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest.trim();
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest.trim();
    }

    let start = cleaned.find('[').or_else(|| cleaned.find('{'));
    let end = cleaned.rfind(']').or_else(|| cleaned.rfind('}'));
    match (start, end) {
        (Some(start), Some(end)) if start <= end => &cleaned[start..=end],
        _ => cleaned,
    }
}

/// Interpret a model reply for `batch`
///
/// Accepts a JSON array of `{"translated": ...}` objects with one item per
/// entry, or a bare object when the batch holds a single entry.
pub fn parse_translations(batch: &Batch, raw: &str) -> Result<Vec<(String, String)>, BackendError> {
    let cleaned = clean_json_response(raw);
    let value: Value = serde_json::from_str(cleaned)
        .map_err(|e| BackendError::MalformedResponse(format!("invalid JSON: {}", e)))?;

    let items = match value {
        Value::Array(items) => items,
        object @ Value::Object(_) if batch.is_single() => vec![object],
        _ => {
            return Err(BackendError::MalformedResponse(
                "expected a JSON array of translations".to_string(),
            ));
        }
    };

    if items.len() != batch.len() {
        return Err(BackendError::MalformedResponse(format!(
            "expected {} translations, got {}",
            batch.len(),
            items.len()
        )));
    }

    batch
        .entries()
        .iter()
        .zip(items)
        .map(|(entry, item)| {
            if let Some(echoed) = item.get("msgid").and_then(Value::as_str) {
                if echoed != entry.key() {
                    return Err(BackendError::MalformedResponse(format!(
                        "key mismatch: expected {:?}, got {:?}",
                        entry.key(),
                        echoed
                    )));
                }
            }
            let text = item
                .get("translated")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    BackendError::MalformedResponse(format!(
                        "no 'translated' string for {:?}",
                        entry.key()
                    ))
                })?;
            Ok((entry.id().into_owned(), mirror_whitespace(entry.key(), text)))
        })
        .collect()
}

/// Backend driving an HTTP chat provider with JSON prompts
#[derive(Debug)]
pub struct LlmBackend<P: Provider> {
    provider: P,
}

impl<P: Provider> LlmBackend<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

#[async_trait]
impl<P: Provider + 'static> TranslationBackend for LlmBackend<P> {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn translate(
        &self,
        batch: &Batch,
        context: &ContextBundle,
    ) -> Result<Vec<(String, String)>, BackendError> {
        let prompts = PromptBuilder::new(context);
        let system = prompts.system(batch.is_single());
        let user = prompts
            .user(batch)
            .map_err(|e| BackendError::Fatal(format!("failed to encode prompt: {}", e)))?;

        debug!("{}: sending {} to {}", self.name(), batch, context.target_language());
        let request = self.provider.build_request(&system, &user);
        let response = self.provider.complete(request).await?;
        let text = P::extract_text(&response);

        parse_translations(batch, &text)
    }

    async fn check(&self) -> Result<(), BackendError> {
        self.provider.test_connection().await.map_err(BackendError::from)
    }
}

/// Behavior of the mock backend
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds
    Working,
    /// Batches with more than `n` entries come back malformed
    FailOnBatchLargerThan(usize),
    /// Every `fail_every`-th call fails with a transient error
    Intermittent { fail_every: usize },
    /// The first `n` calls succeed, every later call is fatal
    FatalAfter(usize),
    /// Batches containing any of these keys come back malformed
    FailKeys(HashSet<String>),
    /// Succeeds after a delay
    Slow { delay_ms: u64 },
}

/// Deterministic offline backend
///
/// Translates `key` to `[LANG] key` with the key's whitespace mirrored,
/// unless a fixed response is registered for the key. Clones share the call
/// counter and the batch log.
#[derive(Debug, Clone)]
pub struct MockBackend {
    behavior: MockBehavior,
    responses: Arc<HashMap<String, String>>,
    calls: Arc<AtomicUsize>,
    batch_sizes: Arc<Mutex<Vec<usize>>>,
}

impl MockBackend {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            responses: Arc::new(HashMap::new()),
            calls: Arc::new(AtomicUsize::new(0)),
            batch_sizes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn fail_on_batch_larger_than(n: usize) -> Self {
        Self::new(MockBehavior::FailOnBatchLargerThan(n))
    }

    pub fn intermittent(fail_every: usize) -> Self {
        Self::new(MockBehavior::Intermittent { fail_every })
    }

    pub fn fatal_after(n: usize) -> Self {
        Self::new(MockBehavior::FatalAfter(n))
    }

    pub fn fail_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(MockBehavior::FailKeys(keys.into_iter().map(Into::into).collect()))
    }

    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    /// Fixed translations by key, taking priority over the default output
    pub fn with_responses<I, K, V>(mut self, responses: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.responses = Arc::new(
            responses
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Number of `translate` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Sizes of the batches received, in call order
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().clone()
    }

    fn output_for(&self, key: &str, language: &str) -> String {
        match self.responses.get(key) {
            Some(fixed) => fixed.clone(),
            None => mirror_whitespace(key, &format!("[{}] {}", language.to_uppercase(), key.trim())),
        }
    }
}

#[async_trait]
impl TranslationBackend for MockBackend {
    fn name(&self) -> &str {
        "Mock"
    }

    async fn translate(
        &self,
        batch: &Batch,
        context: &ContextBundle,
    ) -> Result<Vec<(String, String)>, BackendError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.batch_sizes.lock().push(batch.len());

        match &self.behavior {
            MockBehavior::Working => {}
            MockBehavior::FailOnBatchLargerThan(limit) => {
                if batch.len() > *limit {
                    return Err(BackendError::MalformedResponse(format!(
                        "mock rejects batches larger than {}",
                        limit
                    )));
                }
            }
            MockBehavior::Intermittent { fail_every } => {
                if *fail_every > 0 && call % fail_every == 0 {
                    return Err(BackendError::Transient(format!("mock failure on call {}", call)));
                }
            }
            MockBehavior::FatalAfter(n) => {
                if call > *n {
                    return Err(BackendError::Fatal("mock credentials revoked".to_string()));
                }
            }
            MockBehavior::FailKeys(keys) => {
                if let Some(key) = batch.entries().iter().map(|e| e.key()).find(|k| keys.contains(*k)) {
                    return Err(BackendError::MalformedResponse(format!("mock cannot translate {:?}", key)));
                }
            }
            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
            }
        }

        Ok(batch
            .entries()
            .iter()
            .map(|entry| (entry.id().into_owned(), self.output_for(entry.key(), context.target_language())))
            .collect())
    }
}

/// Build the backend selected in the translation config
pub fn backend_from_config(config: &TranslationConfig) -> Result<Arc<dyn TranslationBackend>> {
    let api_key = config.get_api_key();
    let endpoint = config.get_endpoint();
    let model = config.get_model();
    let timeout = config.get_timeout_secs();
    let temperature = config.common.temperature;
    let rate_limit = config.get_rate_limit();

    let openai_compatible = |name: &str, api_key: String| {
        OpenAI::new(api_key, endpoint.clone(), model.clone())
            .with_name(name)
            .with_timeout(timeout)
            .with_temperature(temperature)
            .with_rate_limit(rate_limit)
    };

    let backend: Arc<dyn TranslationBackend> = match config.provider {
        TranslationProvider::Gemini => Arc::new(LlmBackend::new(
            Gemini::new(api_key, endpoint.clone(), model.clone())
                .with_timeout(timeout)
                .with_temperature(temperature)
                .with_rate_limit(rate_limit),
        )),
        TranslationProvider::Groq => Arc::new(LlmBackend::new(openai_compatible("Groq", api_key))),
        TranslationProvider::OpenRouter => {
            Arc::new(LlmBackend::new(openai_compatible("OpenRouter", api_key)))
        }
        TranslationProvider::OpenAI => Arc::new(LlmBackend::new(openai_compatible("OpenAI", api_key))),
        TranslationProvider::LMStudio => {
            // LM Studio accepts any key
            let key = if api_key.is_empty() { "lm-studio".to_string() } else { api_key };
            Arc::new(LlmBackend::new(openai_compatible("LM Studio", key)))
        }
        TranslationProvider::Anthropic => Arc::new(LlmBackend::new(
            Anthropic::new(api_key, endpoint.clone(), model.clone())
                .with_timeout(timeout)
                .with_temperature(temperature)
                .with_rate_limit(rate_limit),
        )),
        TranslationProvider::Ollama => Arc::new(LlmBackend::new(
            Ollama::new(&endpoint, model.clone())
                .with_timeout(timeout)
                .with_temperature(temperature)
                .with_rate_limit(rate_limit),
        )),
        TranslationProvider::Mock => Arc::new(MockBackend::working()),
    };

    debug!("Using {} backend (model: {})", backend.name(), model);
    Ok(backend)
}

/*!
 * Batch orchestrator.
 *
 * Drives one run over a catalog store:
 *
 * `Idle → Merging → Extracting → Dispatching ⇄ PersistingBatch → Finalizing → Completed | Aborted`
 *
 * Batches are dispatched in order (optionally a few at a time), retried with
 * exponential backoff and degraded to single entries when retries run out.
 * A batch's results are applied and persisted in one critical section.
 * A fatal backend error stops all further calls; cancellation is honoured
 * between batches.
 */

use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::app_config::{MAX_CONCURRENT_BATCHES, TranslationCommonConfig};
use crate::catalog::{ApplyOutcome, CatalogStore, Template, VerificationReport, source_of};
use crate::errors::{BackendError, CatalogError, PipelineError};
use crate::quality::{Decision, PipelineResult, QualityPipeline, ReviewRecord, StagedTranslation};
use crate::reporting::{LogReviewSink, NullProgressSink, ProgressReport, ProgressSink, ReviewSink};
use crate::translation::backend::TranslationBackend;
use crate::translation::batch::Batch;
use crate::translation::context::ContextBundle;

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Merging,
    Extracting,
    Dispatching,
    PersistingBatch,
    Finalizing,
    Completed,
    Aborted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Merging => "merging",
            RunState::Extracting => "extracting",
            RunState::Dispatching => "dispatching",
            RunState::PersistingBatch => "persisting batch",
            RunState::Finalizing => "finalizing",
            RunState::Completed => "completed",
            RunState::Aborted => "aborted",
        };
        write!(f, "{}", name)
    }
}

/// Batching, retry and timeout settings of the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub batch_size: usize,
    pub max_batch_retries: u32,
    pub max_single_retries: u32,
    pub retry_wait: Duration,
    pub max_retry_wait: Duration,
    pub request_timeout: Duration,
    pub persist_timeout: Duration,
    pub max_concurrent_batches: usize,
}

impl From<&TranslationCommonConfig> for OrchestratorSettings {
    fn from(config: &TranslationCommonConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_batch_retries: config.max_batch_retries,
            max_single_retries: config.max_single_retries,
            retry_wait: Duration::from_secs(config.retry_wait_seconds),
            max_retry_wait: Duration::from_secs(config.max_retry_wait_seconds),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            persist_timeout: Duration::from_secs(config.persist_timeout_secs),
            max_concurrent_batches: config.max_concurrent_batches,
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&TranslationCommonConfig::default())
    }
}

impl OrchestratorSettings {
    /// Wait before retry number `attempt + 1`: `retry_wait * 2^attempt`, capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_wait
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_retry_wait)
    }

    fn concurrency(&self) -> usize {
        self.max_concurrent_batches.clamp(1, MAX_CONCURRENT_BATCHES)
    }
}

/// Per-run tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub translated: usize,
    pub failed: usize,
    pub needs_review: usize,
    pub skipped_obsolete: usize,
}

impl fmt::Display for RunCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} translated, {} failed, {} need review, {} obsolete skipped",
            self.translated, self.failed, self.needs_review, self.skipped_obsolete
        )
    }
}

/// Everything a run produced
#[derive(Debug)]
pub struct RunOutcome {
    /// `Completed` or `Aborted`
    pub state: RunState,
    pub counts: RunCounts,
    /// Entries pending when dispatch started
    pub total_pending: usize,
    pub failed_keys: Vec<String>,
    pub results: Vec<PipelineResult>,
    /// Present when the run reached finalization
    pub verification: Option<VerificationReport>,
    /// Why the run aborted
    pub error: Option<PipelineError>,
    store: CatalogStore,
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        self.state == RunState::Completed
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    pub fn into_store(self) -> CatalogStore {
        self.store
    }
}

/// Mutable bookkeeping of one run
#[derive(Debug)]
struct RunLedger {
    state: RunState,
    counts: RunCounts,
    total: usize,
    processed: usize,
    failed_keys: Vec<String>,
    results: Vec<PipelineResult>,
}

impl RunLedger {
    fn new() -> Self {
        Self {
            state: RunState::Idle,
            counts: RunCounts::default(),
            total: 0,
            processed: 0,
            failed_keys: Vec::new(),
            results: Vec::new(),
        }
    }

    fn transition(&mut self, next: RunState) {
        debug!("Run state: {} -> {}", self.state, next);
        self.state = next;
    }

    fn fail(&mut self, key: String, reason: String) {
        self.counts.failed += 1;
        self.failed_keys.push(key.clone());
        self.results.push(PipelineResult::failed(key, reason));
    }

    fn finish(self, store: CatalogStore, verification: Option<VerificationReport>, error: Option<PipelineError>) -> RunOutcome {
        RunOutcome {
            state: self.state,
            counts: self.counts,
            total_pending: self.total,
            failed_keys: self.failed_keys,
            results: self.results,
            verification,
            error,
            store,
        }
    }
}

/// Result of dispatching one batch, before anything is applied
#[derive(Debug)]
struct BatchOutcome {
    batch: Batch,
    translations: Vec<(String, String)>,
    failures: Vec<(String, String)>,
    /// Stopped by a fatal error or cancellation; nothing of it may be applied
    interrupted: bool,
}

enum Attempts {
    Done(Vec<(String, String)>),
    Exhausted(BackendError),
    Stopped,
}

/// First fatal backend error of a run; once set no backend call is made
type FatalSlot = parking_lot::Mutex<Option<BackendError>>;

/// Runs the translation pipeline over a catalog store
pub struct Orchestrator {
    backend: Arc<dyn TranslationBackend>,
    context: Arc<ContextBundle>,
    settings: OrchestratorSettings,
    quality: Option<QualityPipeline>,
    progress: Arc<dyn ProgressSink>,
    review: Arc<dyn ReviewSink>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("backend", &self.backend.name())
            .field("settings", &self.settings)
            .field("quality", &self.quality.is_some())
            .finish()
    }
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn TranslationBackend>,
        context: Arc<ContextBundle>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            backend,
            context,
            settings,
            quality: None,
            progress: Arc::new(NullProgressSink),
            review: Arc::new(LogReviewSink),
        }
    }

    /// Gate every batch through a quality pipeline before applying it
    pub fn with_quality(mut self, pipeline: QualityPipeline) -> Self {
        self.quality = Some(pipeline);
        self
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    pub fn with_review(mut self, sink: Arc<dyn ReviewSink>) -> Self {
        self.review = sink;
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Merge `template` into the store, translate everything pending and persist
    pub async fn run(&self, mut store: CatalogStore, template: &Template, cancel: CancellationToken) -> RunOutcome {
        let mut ledger = RunLedger::new();

        ledger.transition(RunState::Merging);
        store.merge_template(template);
        ledger.counts.skipped_obsolete = store.catalog().obsolete_count();
        if let Err(e) = self.persist(&mut store).await {
            return self.abort(ledger, store, e).await;
        }

        ledger.transition(RunState::Extracting);
        let pending = store.extract_pending();
        ledger.total = pending.len();

        if pending.is_empty() {
            info!("Nothing to translate");
            self.progress.report(ProgressReport::new(0, 0, 0));
            return self.finalize(ledger, store).await;
        }

        let batches = Batch::partition(pending, self.settings.batch_size);
        info!(
            "Translating {} entries in {} batches with {} (up to {} in flight)",
            ledger.total,
            batches.len(),
            self.backend.name(),
            self.settings.concurrency()
        );

        ledger.transition(RunState::Dispatching);
        let shared = Mutex::new(store);
        let fatal: FatalSlot = parking_lot::Mutex::new(None);
        let mut abort: Option<PipelineError> = None;

        {
            let mut outcomes = std::pin::pin!(
                stream::iter(batches)
                    .map(|batch| self.translate_batch(batch, &fatal, &cancel))
                    .buffered(self.settings.concurrency())
            );

            loop {
                if cancel.is_cancelled() {
                    warn!("Cancellation requested, stopping before the next batch");
                    abort = Some(PipelineError::Cancelled);
                    break;
                }
                let Some(outcome) = outcomes.next().await else {
                    break;
                };
                if outcome.interrupted {
                    abort = Some(match fatal.lock().clone() {
                        Some(error) => PipelineError::Backend(error),
                        None => PipelineError::Cancelled,
                    });
                    break;
                }
                if let Err(e) = self.settle_batch(outcome, &shared, &mut ledger).await {
                    abort = Some(e);
                    break;
                }
            }
        }

        let store = shared.into_inner();
        match abort {
            Some(error) => self.abort(ledger, store, error).await,
            None => self.finalize(ledger, store).await,
        }
    }

    async fn call_backend(&self, batch: &Batch) -> Result<Vec<(String, String)>, BackendError> {
        let timeout = self.settings.request_timeout;
        match tokio::time::timeout(timeout, self.backend.translate(batch, &self.context)).await {
            Ok(result) => result.and_then(|translations| check_alignment(batch, translations)),
            Err(_) => Err(BackendError::Transient(format!(
                "no response within {}s",
                timeout.as_secs_f32()
            ))),
        }
    }

    async fn with_retries(&self, batch: &Batch, max_attempts: u32, fatal: &FatalSlot) -> Attempts {
        let attempts = max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            if fatal.lock().is_some() {
                return Attempts::Stopped;
            }

            match self.call_backend(batch).await {
                Ok(translations) => return Attempts::Done(translations),
                Err(error @ BackendError::Fatal(_)) => {
                    error!("{} aborted the run: {}", self.backend.name(), error);
                    let mut slot = fatal.lock();
                    if slot.is_none() {
                        *slot = Some(error);
                    }
                    return Attempts::Stopped;
                }
                Err(error) => {
                    warn!("{} attempt {}/{} failed: {}", batch, attempt + 1, attempts, error);
                    if attempt + 1 < attempts {
                        tokio::time::sleep(self.settings.backoff(attempt)).await;
                    }
                    last_error = Some(error);
                }
            }
        }

        Attempts::Exhausted(
            last_error.unwrap_or_else(|| BackendError::Transient("no attempt made".to_string())),
        )
    }

    async fn translate_batch(&self, batch: Batch, fatal: &FatalSlot, cancel: &CancellationToken) -> BatchOutcome {
        let mut outcome = BatchOutcome {
            batch: batch.clone(),
            translations: Vec::new(),
            failures: Vec::new(),
            interrupted: false,
        };
        if cancel.is_cancelled() {
            outcome.interrupted = true;
            return outcome;
        }

        debug!("Dispatching {}", batch);
        match self.with_retries(&batch, self.settings.max_batch_retries, fatal).await {
            Attempts::Done(translations) => outcome.translations = translations,
            Attempts::Stopped => outcome.interrupted = true,
            Attempts::Exhausted(error) if batch.is_single() => {
                let id = batch.entries()[0].id().into_owned();
                error!("Failed to translate {:?}: {}", id, error);
                outcome.failures.push((id, error.to_string()));
            }
            Attempts::Exhausted(_) => {
                info!(
                    "{} failed after {} attempts, switching to single-entry mode",
                    batch, self.settings.max_batch_retries
                );
                for single in batch.singles() {
                    let key = single.entries()[0].id().into_owned();
                    match self.with_retries(&single, self.settings.max_single_retries, fatal).await {
                        Attempts::Done(translations) => outcome.translations.extend(translations),
                        Attempts::Stopped => {
                            outcome.interrupted = true;
                            return outcome;
                        }
                        Attempts::Exhausted(error) => {
                            error!(
                                "Failed to translate {:?} after {} attempts: {}",
                                key, self.settings.max_single_retries, error
                            );
                            outcome.failures.push((key, error.to_string()));
                        }
                    }
                }
            }
        }

        outcome
    }

    /// Split backend output into entries to apply and entries needing review
    fn gate(&self, translations: Vec<(String, String)>) -> (Vec<(String, String, Option<f32>)>, Vec<StagedTranslation>) {
        let Some(pipeline) = &self.quality else {
            return (
                translations.into_iter().map(|(key, text)| (key, text, None)).collect(),
                Vec::new(),
            );
        };

        let staged = translations
            .into_iter()
            .map(|(key, text)| StagedTranslation::new(key.clone(), source_of(&key).to_string(), text))
            .collect();

        let mut approved = Vec::new();
        let mut review = Vec::new();
        for (item, decision) in pipeline.evaluate(staged) {
            match decision {
                Decision::AutoApproved => approved.push((item.key, item.text, item.score)),
                _ => review.push(item),
            }
        }
        (approved, review)
    }

    async fn settle_batch(
        &self,
        outcome: BatchOutcome,
        store: &Mutex<CatalogStore>,
        ledger: &mut RunLedger,
    ) -> Result<(), PipelineError> {
        let BatchOutcome {
            batch,
            translations,
            failures,
            ..
        } = outcome;

        let mut recent_failures = failures.len();
        for (key, reason) in failures {
            ledger.fail(key, reason);
        }

        let (approved, review) = self.gate(translations);
        for item in review {
            let record = ReviewRecord::from_staged(&item, self.context.target_language());
            match self.review.submit(record) {
                Ok(()) => {
                    ledger.counts.needs_review += 1;
                    ledger.results.push(PipelineResult {
                        key: item.key,
                        translated_text: Some(item.text),
                        quality_score: item.score,
                        decision: Decision::NeedsReview,
                        failing_checks: item.failing_checks,
                    });
                }
                Err(e) => {
                    error!("Could not hand {:?} to review: {:#}", item.key, e);
                    recent_failures += 1;
                    ledger.fail(item.key, format!("review sink: {}", e));
                }
            }
        }

        let mut guard = store.lock().await;
        ledger.transition(RunState::PersistingBatch);

        if let Some((key, ..)) = approved
            .iter()
            .find(|(key, ..)| guard.catalog().get(key).is_none_or(|e| e.obsolete))
        {
            return Err(CatalogError::UnknownKey(key.clone()).into());
        }

        for (key, text, score) in approved {
            match guard.apply(&key, &text)? {
                ApplyOutcome::Applied => {
                    let applied = guard
                        .catalog()
                        .get(&key)
                        .map(|e| e.translation.clone())
                        .unwrap_or(text);
                    ledger.counts.translated += 1;
                    ledger.results.push(PipelineResult::approved(key, applied, score));
                }
                ApplyOutcome::AlreadyApplied => {
                    warn!("{:?} was already translated in this run, keeping the first translation", key);
                }
            }
        }

        self.persist(&mut guard).await?;

        ledger.processed += batch.len();
        self.progress
            .report(ProgressReport::new(ledger.processed, ledger.total, recent_failures));
        ledger.transition(RunState::Dispatching);
        Ok(())
    }

    /// Snapshot under the caller's exclusive access, write off the runtime, retry once
    async fn persist(&self, store: &mut CatalogStore) -> Result<(), PipelineError> {
        let snapshot = Arc::new(store.snapshot());
        let timeout = self.settings.persist_timeout;
        let mut last_error = None;

        for attempt in 1..=2 {
            let job = Arc::clone(&snapshot);
            let error = match tokio::time::timeout(timeout, tokio::task::spawn_blocking(move || job.write())).await {
                Ok(Ok(Ok(()))) => return Ok(()),
                Ok(Ok(Err(e))) => PipelineError::Catalog(e),
                Ok(Err(join)) => PipelineError::Catalog(CatalogError::Persistence {
                    path: snapshot.path().to_path_buf(),
                    message: join.to_string(),
                }),
                Err(_) => PipelineError::Timeout(format!(
                    "writing {} took longer than {}s",
                    snapshot.path().display(),
                    timeout.as_secs_f32()
                )),
            };
            warn!("Persist attempt {}/2 failed: {}", attempt, error);
            last_error = Some(error);
        }

        Err(last_error.unwrap_or(PipelineError::Timeout("persist never attempted".to_string())))
    }

    async fn finalize(&self, mut ledger: RunLedger, mut store: CatalogStore) -> RunOutcome {
        ledger.transition(RunState::Finalizing);
        let verification = store.verify();

        if let Err(e) = self.persist(&mut store).await {
            return self.abort(ledger, store, e).await;
        }

        ledger.transition(RunState::Completed);
        self.progress.finish();
        info!("Run completed: {}", ledger.counts);
        ledger.finish(store, Some(verification), None)
    }

    async fn abort(&self, mut ledger: RunLedger, mut store: CatalogStore, error: PipelineError) -> RunOutcome {
        // Everything applied so far stays on disk
        if !matches!(error, PipelineError::Catalog(CatalogError::Persistence { .. }) | PipelineError::Timeout(_)) {
            if let Err(e) = self.persist(&mut store).await {
                error!("Could not persist catalog while aborting: {}", e);
            }
        }

        ledger.transition(RunState::Aborted);
        self.progress.finish();
        error!("Run aborted: {} ({})", error, ledger.counts);
        ledger.finish(store, None, Some(error))
    }
}

/// Backend output must pair one result with each batch entry, in batch order
fn check_alignment(batch: &Batch, translations: Vec<(String, String)>) -> Result<Vec<(String, String)>, BackendError> {
    if translations.len() != batch.len() {
        return Err(BackendError::MalformedResponse(format!(
            "expected {} translations for {}, got {}",
            batch.len(),
            batch,
            translations.len()
        )));
    }
    let mismatch = batch
        .keys()
        .zip(&translations)
        .find(|(expected, (got, _))| &**expected != got.as_str());
    if let Some((expected, (got, _))) = mismatch {
        return Err(BackendError::MalformedResponse(format!(
            "result for {:?} returned where {:?} was expected",
            got, expected
        )));
    }
    Ok(translations)
}

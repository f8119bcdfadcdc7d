/*!
 * Integration tests for the batch orchestrator.
 *
 * Every run goes against the mock backend and a catalog in a temporary
 * directory, so retry, degradation, abort and cancellation paths can be
 * observed end to end.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use transhub::app_config::QualityConfig;
use transhub::catalog::{Catalog, CatalogEntry, CatalogStore, Header};
use transhub::errors::{BackendError, CatalogError, PipelineError};
use transhub::quality::{Decision, QualityPipeline};
use transhub::reporting::{ChannelProgressSink, MemoryReviewSink, ProgressReport, ProgressSink};
use transhub::translation::{Batch, ContextBundle, MockBackend, Orchestrator, RunState, TranslationBackend};

use crate::common::{context, create_temp_dir, create_test_file, fast_settings, init_test_logging, read_catalog, template};

/// Cancels the run as soon as the first batch is reported
struct CancelOnReport(CancellationToken);

impl ProgressSink for CancelOnReport {
    fn report(&self, _report: ProgressReport) {
        self.0.cancel();
    }
}

/// Backend whose replies do not line up with the batch it was given
#[derive(Debug)]
enum MisalignedBackend {
    /// Returns no results at all
    Dropping,
    /// Answers every batch with a translation for `Save`
    WrongKey,
}

#[async_trait]
impl TranslationBackend for MisalignedBackend {
    fn name(&self) -> &str {
        "Misaligned"
    }

    async fn translate(&self, _batch: &Batch, _context: &ContextBundle) -> Result<Vec<(String, String)>, BackendError> {
        Ok(match self {
            Self::Dropping => Vec::new(),
            Self::WrongKey => vec![("Save".to_string(), "CLOBBERED".to_string())],
        })
    }
}

/// Rejects multi-entry batches, then turns fatal after `fatal_after` calls
#[derive(Debug)]
struct DegradingThenFatal {
    fatal_after: usize,
    calls: AtomicUsize,
    sizes: Mutex<Vec<usize>>,
}

impl DegradingThenFatal {
    fn new(fatal_after: usize) -> Self {
        Self {
            fatal_after,
            calls: AtomicUsize::new(0),
            sizes: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TranslationBackend for DegradingThenFatal {
    fn name(&self) -> &str {
        "DegradingThenFatal"
    }

    async fn translate(&self, batch: &Batch, _context: &ContextBundle) -> Result<Vec<(String, String)>, BackendError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.sizes.lock().push(batch.len());
        if call > self.fatal_after {
            return Err(BackendError::Fatal("key revoked".to_string()));
        }
        if batch.len() > 1 {
            return Err(BackendError::MalformedResponse("batch too large".to_string()));
        }
        Ok(batch.keys().map(|k| (k.to_string(), format!("[ES] {}", k))).collect())
    }
}

fn drain(receiver: &mut tokio::sync::mpsc::UnboundedReceiver<ProgressReport>) -> Vec<ProgressReport> {
    let mut reports = Vec::new();
    while let Ok(report) = receiver.try_recv() {
        reports.push(report);
    }
    reports
}

#[tokio::test]
async fn test_run_backendRejectsLargeBatches_shouldDegradeToSingles() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("es.po");
    let backend = MockBackend::fail_on_batch_larger_than(1);
    let keys = ["One", "Two", "Three", "Four", "Five"];

    let orchestrator = Orchestrator::new(Arc::new(backend.clone()), context("es"), fast_settings(5));
    let outcome = orchestrator
        .run(CatalogStore::new(&path, Catalog::new()), &template(&keys), CancellationToken::new())
        .await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.counts.translated, 5);
    assert_eq!(outcome.counts.failed, 0);
    assert_eq!(backend.batch_sizes(), vec![5, 5, 5, 1, 1, 1, 1, 1]);

    let saved = read_catalog(&path);
    for key in keys {
        assert_eq!(saved.get(key).unwrap().translation, format!("[ES] {}", key));
    }
}

#[tokio::test]
async fn test_run_saveAndCancel_shouldApplyAndReportProgress() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("pt_BR.po");
    let existing = Catalog::from_entries(
        Header::default(),
        vec![CatalogEntry::new("Save").with_translation("Gravar").with_fuzzy(true)],
    );
    let backend = MockBackend::working().with_responses([("Save", "Salvar"), ("Cancel", "Cancelar")]);
    let (sink, mut receiver) = ChannelProgressSink::new();

    let orchestrator = Orchestrator::new(Arc::new(backend), context("pt-BR"), fast_settings(10))
        .with_progress(Arc::new(sink));
    let outcome = orchestrator
        .run(CatalogStore::new(&path, existing), &template(&["Save", "Cancel"]), CancellationToken::new())
        .await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.counts.translated, 2);

    let saved = read_catalog(&path);
    let save = saved.get("Save").unwrap();
    let cancel = saved.get("Cancel").unwrap();
    assert_eq!(save.translation, "Salvar");
    assert!(!save.is_fuzzy());
    assert_eq!(cancel.translation, "Cancelar");
    assert!(!cancel.is_fuzzy());

    let reports = drain(&mut receiver);
    assert_eq!(reports.last(), Some(&ProgressReport::new(2, 2, 0)));
}

#[tokio::test]
async fn test_run_missingPlaceholder_shouldGoToReviewAndLeaveCatalogUnchanged() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("pt_BR.po");
    let key = "File {name} not found";
    let backend = MockBackend::working().with_responses([(key, "Arquivo não encontrado")]);
    let review = MemoryReviewSink::new();
    let pipeline = QualityPipeline::standard(&QualityConfig::default(), None).unwrap();

    let orchestrator = Orchestrator::new(Arc::new(backend), context("pt-BR"), fast_settings(10))
        .with_quality(pipeline)
        .with_review(Arc::new(review.clone()));
    let outcome = orchestrator
        .run(CatalogStore::new(&path, Catalog::new()), &template(&[key]), CancellationToken::new())
        .await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.counts.needs_review, 1);
    assert_eq!(outcome.counts.translated, 0);
    assert_eq!(outcome.results[0].decision, Decision::NeedsReview);

    let records = review.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key, key);
    assert_eq!(records[0].proposed, "Arquivo não encontrado");
    assert_eq!(records[0].language, "pt-BR");
    assert!(records[0].score < 0.8);
    assert!(records[0].failing_checks.iter().any(|c| c.starts_with("placeholders")));

    assert!(read_catalog(&path).get(key).unwrap().translation.is_empty());
}

#[tokio::test]
async fn test_run_qualityMode_cleanTranslation_shouldBeApplied() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("pt_BR.po");
    let backend = MockBackend::working().with_responses([("Hello {name}", "Olá {name}")]);
    let review = MemoryReviewSink::new();
    let pipeline = QualityPipeline::standard(&QualityConfig::default(), None).unwrap();

    let orchestrator = Orchestrator::new(Arc::new(backend), context("pt-BR"), fast_settings(10))
        .with_quality(pipeline)
        .with_review(Arc::new(review.clone()));
    let outcome = orchestrator
        .run(CatalogStore::new(&path, Catalog::new()), &template(&["Hello {name}"]), CancellationToken::new())
        .await;

    assert_eq!(outcome.counts.translated, 1);
    assert_eq!(outcome.results[0].quality_score, Some(1.0));
    assert!(review.is_empty());
    assert_eq!(read_catalog(&path).get("Hello {name}").unwrap().translation, "Olá {name}");
}

#[tokio::test]
async fn test_run_fatalError_shouldStopCallsAndKeepEarlierResults() {
    init_test_logging();
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("es.po");
    let backend = MockBackend::fatal_after(1);

    let orchestrator = Orchestrator::new(Arc::new(backend.clone()), context("es"), fast_settings(1));
    let outcome = orchestrator
        .run(CatalogStore::new(&path, Catalog::new()), &template(&["A", "B", "C"]), CancellationToken::new())
        .await;

    assert_eq!(outcome.state, RunState::Aborted);
    assert!(matches!(outcome.error, Some(PipelineError::Backend(BackendError::Fatal(_)))));
    assert_eq!(backend.calls(), 2);
    assert_eq!(outcome.counts.translated, 1);

    let saved = read_catalog(&path);
    assert_eq!(saved.get("A").unwrap().translation, "[ES] A");
    assert!(saved.get("B").unwrap().translation.is_empty());
    assert!(saved.get("C").unwrap().translation.is_empty());
}

#[tokio::test]
async fn test_run_cancelledBetweenBatches_shouldPersistAppliedAndStop() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("es.po");
    let backend = MockBackend::working();
    let cancel = CancellationToken::new();

    let orchestrator = Orchestrator::new(Arc::new(backend.clone()), context("es"), fast_settings(1))
        .with_progress(Arc::new(CancelOnReport(cancel.clone())));
    let outcome = orchestrator
        .run(CatalogStore::new(&path, Catalog::new()), &template(&["A", "B", "C"]), cancel)
        .await;

    assert_eq!(outcome.state, RunState::Aborted);
    assert!(matches!(outcome.error, Some(PipelineError::Cancelled)));
    assert_eq!(backend.calls(), 1);

    let saved = read_catalog(&path);
    assert_eq!(saved.get("A").unwrap().translation, "[ES] A");
    assert!(saved.get("B").unwrap().translation.is_empty());
}

#[tokio::test]
async fn test_run_cancelledBeforeStart_shouldNotCallBackend() {
    let dir = create_temp_dir().unwrap();
    let backend = MockBackend::working();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let orchestrator = Orchestrator::new(Arc::new(backend.clone()), context("es"), fast_settings(1));
    let outcome = orchestrator
        .run(CatalogStore::new(dir.path().join("es.po"), Catalog::new()), &template(&["A"]), cancel)
        .await;

    assert!(matches!(outcome.error, Some(PipelineError::Cancelled)));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_run_concurrentBatches_shouldReportMonotonicProgressInOrder() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("es.po");
    let keys: Vec<String> = (0..20).map(|i| format!("Message {}", i)).collect();
    let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
    let (sink, mut receiver) = ChannelProgressSink::new();

    let mut settings = fast_settings(2);
    settings.max_concurrent_batches = 4;
    let orchestrator = Orchestrator::new(Arc::new(MockBackend::slow(10)), context("es"), settings)
        .with_progress(Arc::new(sink));
    let outcome = orchestrator
        .run(CatalogStore::new(&path, Catalog::new()), &template(&key_refs), CancellationToken::new())
        .await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.counts.translated, 20);

    let processed: Vec<usize> = drain(&mut receiver).iter().map(|r| r.processed).collect();
    assert_eq!(processed, (1..=10).map(|i| i * 2).collect::<Vec<_>>());

    let saved = read_catalog(&path);
    let saved_keys: Vec<&str> = saved.keys().collect();
    assert_eq!(saved_keys, key_refs);
}

#[tokio::test]
async fn test_run_intermittentFailures_shouldRecoverWithRetries() {
    let dir = create_temp_dir().unwrap();
    let backend = MockBackend::intermittent(2);

    let orchestrator = Orchestrator::new(Arc::new(backend.clone()), context("es"), fast_settings(1));
    let outcome = orchestrator
        .run(
            CatalogStore::new(dir.path().join("es.po"), Catalog::new()),
            &template(&["A", "B", "C", "D"]),
            CancellationToken::new(),
        )
        .await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.counts.translated, 4);
    assert_eq!(outcome.counts.failed, 0);
    assert_eq!(backend.calls(), 7);
}

#[tokio::test]
async fn test_run_untranslatableEntry_shouldFailAloneAndComplete() {
    let dir = create_temp_dir().unwrap();
    let backend = MockBackend::fail_keys(["Bad"]);

    let orchestrator = Orchestrator::new(Arc::new(backend), context("es"), fast_settings(3));
    let outcome = orchestrator
        .run(
            CatalogStore::new(dir.path().join("es.po"), Catalog::new()),
            &template(&["Good", "Bad", "Fine"]),
            CancellationToken::new(),
        )
        .await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.counts.translated, 2);
    assert_eq!(outcome.counts.failed, 1);
    assert_eq!(outcome.failed_keys, vec!["Bad".to_string()]);
    assert_eq!(outcome.verification.unwrap().untranslated, vec!["Bad".to_string()]);
}

#[tokio::test]
async fn test_run_slowBackend_shouldTimeOutAsTransient() {
    let dir = create_temp_dir().unwrap();
    let mut settings = fast_settings(1);
    settings.request_timeout = Duration::from_millis(20);
    settings.max_batch_retries = 2;

    let orchestrator = Orchestrator::new(Arc::new(MockBackend::slow(500)), context("es"), settings);
    let outcome = orchestrator
        .run(
            CatalogStore::new(dir.path().join("es.po"), Catalog::new()),
            &template(&["Slow"]),
            CancellationToken::new(),
        )
        .await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.counts.failed, 1);
    assert!(outcome.results[0].failing_checks[0].contains("Transient"));
}

#[tokio::test]
async fn test_run_nothingPending_shouldReportEmptyProgress() {
    let dir = create_temp_dir().unwrap();
    let existing = Catalog::from_entries(
        Header::default(),
        vec![
            CatalogEntry::new("Save").with_translation("Guardar"),
            CatalogEntry::new("Gone").with_translation("Ido"),
        ],
    );
    let backend = MockBackend::working();
    let (sink, mut receiver) = ChannelProgressSink::new();

    let orchestrator = Orchestrator::new(Arc::new(backend.clone()), context("es"), fast_settings(10))
        .with_progress(Arc::new(sink));
    let outcome = orchestrator
        .run(
            CatalogStore::new(dir.path().join("es.po"), existing),
            &template(&["Save"]),
            CancellationToken::new(),
        )
        .await;

    assert!(outcome.is_completed());
    assert_eq!(backend.calls(), 0);
    assert_eq!(outcome.counts.skipped_obsolete, 1);
    assert_eq!(drain(&mut receiver), vec![ProgressReport::new(0, 0, 0)]);

    let saved = read_catalog(&dir.path().join("es.po"));
    assert!(saved.get("Gone").unwrap().obsolete);
}

#[tokio::test]
async fn test_run_shouldLeaveNoTemporaryFiles() {
    let dir = create_temp_dir().unwrap();
    let orchestrator = Orchestrator::new(Arc::new(MockBackend::working()), context("es"), fast_settings(1));
    orchestrator
        .run(
            CatalogStore::new(dir.path().join("es.po"), Catalog::new()),
            &template(&["A", "B"]),
            CancellationToken::new(),
        )
        .await;

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["es.po".to_string()]);
}

#[tokio::test]
async fn test_run_backendDropsResults_shouldFailEntriesInsteadOfSkipping() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("es.po");
    let (sink, mut receiver) = ChannelProgressSink::new();

    let orchestrator = Orchestrator::new(Arc::new(MisalignedBackend::Dropping), context("es"), fast_settings(2))
        .with_progress(Arc::new(sink));
    let outcome = orchestrator
        .run(CatalogStore::new(&path, Catalog::new()), &template(&["A", "B"]), CancellationToken::new())
        .await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.counts.translated, 0);
    assert_eq!(outcome.counts.failed, 2);
    assert_eq!(outcome.failed_keys, vec!["A".to_string(), "B".to_string()]);
    assert!(outcome.results[0].failing_checks[0].contains("expected 1 translations"));
    assert_eq!(drain(&mut receiver), vec![ProgressReport::new(2, 2, 2)]);
}

#[tokio::test]
async fn test_run_backendAnswersForeignKey_shouldKeepExistingTranslation() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("es.po");
    let existing = Catalog::from_entries(Header::default(), vec![CatalogEntry::new("Save").with_translation("Guardar")]);

    let orchestrator = Orchestrator::new(Arc::new(MisalignedBackend::WrongKey), context("es"), fast_settings(1));
    let outcome = orchestrator
        .run(CatalogStore::new(&path, existing), &template(&["Save", "New"]), CancellationToken::new())
        .await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.counts.translated, 0);
    assert_eq!(outcome.failed_keys, vec!["New".to_string()]);

    let saved = read_catalog(&path);
    assert_eq!(saved.get("Save").unwrap().translation, "Guardar");
    assert!(saved.get("New").unwrap().translation.is_empty());
}

#[tokio::test]
async fn test_run_fatalDuringSingleFallback_shouldStopCalling() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("es.po");
    let backend = Arc::new(DegradingThenFatal::new(4));

    let orchestrator = Orchestrator::new(backend.clone(), context("es"), fast_settings(3));
    let outcome = orchestrator
        .run(CatalogStore::new(&path, Catalog::new()), &template(&["A", "B", "C"]), CancellationToken::new())
        .await;

    assert_eq!(outcome.state, RunState::Aborted);
    assert!(matches!(outcome.error, Some(PipelineError::Backend(BackendError::Fatal(_)))));
    // three batch attempts, "A" alone, then "B" alone hits the fatal error
    assert_eq!(*backend.sizes.lock(), vec![3, 3, 3, 1, 1]);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 5);
    assert!(read_catalog(&path).get("C").unwrap().translation.is_empty());
}

#[tokio::test]
async fn test_run_unwritableCatalog_shouldAbortWithPersistenceError() {
    init_test_logging();
    let dir = create_temp_dir().unwrap();
    let blocker = create_test_file(dir.path(), "blocker", "not a directory").unwrap();
    let backend = MockBackend::working();

    let orchestrator = Orchestrator::new(Arc::new(backend.clone()), context("es"), fast_settings(2));
    let outcome = orchestrator
        .run(
            CatalogStore::new(blocker.join("es.po"), Catalog::new()),
            &template(&["Open"]),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(outcome.state, RunState::Aborted);
    assert!(matches!(
        outcome.error,
        Some(PipelineError::Catalog(CatalogError::Persistence { .. }))
    ));
    assert_eq!(backend.calls(), 0);
    assert!(blocker.is_file());
}

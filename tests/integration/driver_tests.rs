/*!
 * End-to-end driver tests: template and catalog files on disk, mock backend.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use transhub::app_config::{Config, PipelineMode, TranslationProvider};
use transhub::driver::{PipelineDriver, RunRequest, RunStatus};
use transhub::errors::BackendError;
use transhub::quality::ReviewRecord;
use transhub::reporting::{JsonlReviewSink, MemoryReviewSink, NullProgressSink};
use transhub::translation::{
    Batch, ContextBundle, ContextComposer, MockBackend, PromptBuilder, TranslationBackend, backend_from_config,
};

use crate::common::{context, create_temp_dir, create_test_file, init_test_logging, read_catalog, write_template};

/// Records the system prompt of every call and echoes the keys back
#[derive(Debug, Default)]
struct PromptRecorder {
    systems: Mutex<Vec<String>>,
}

#[async_trait]
impl TranslationBackend for PromptRecorder {
    fn name(&self) -> &str {
        "PromptRecorder"
    }

    async fn translate(&self, batch: &Batch, context: &ContextBundle) -> Result<Vec<(String, String)>, BackendError> {
        self.systems.lock().push(PromptBuilder::new(context).system(batch.is_single()));
        Ok(batch.keys().map(|k| (k.to_string(), format!("{} (pt)", k))).collect())
    }
}

fn mock_config(language: &str) -> Config {
    let mut config = Config::default();
    config.language = language.to_string();
    config.translation.provider = TranslationProvider::Mock;
    config.translation.common.retry_wait_seconds = 0;
    config.translation.common.max_retry_wait_seconds = 0;
    config
}

#[tokio::test]
async fn test_run_freshCatalog_shouldCreatePoWithLanguageHeader() {
    let dir = create_temp_dir().unwrap();
    let template_path = write_template(dir.path(), &["Open", "Close"]).unwrap();
    let output = RunRequest::default_output_path(&template_path, "pt-br").unwrap();

    let config = mock_config("pt-BR");
    let backend = backend_from_config(&config.translation).unwrap();
    let driver = PipelineDriver::with_defaults(config, backend, context("pt-BR"));
    let report = driver
        .run(&RunRequest::new(&template_path, &output), CancellationToken::new())
        .await;

    assert_eq!(report.status, RunStatus::Completed { failed: 0 });
    assert_eq!(report.status.to_string(), "Completed");
    assert_eq!(report.counts.translated, 2);
    assert!(output.ends_with("pt_BR.po"));

    let saved = read_catalog(&output);
    assert_eq!(saved.header.get("Language"), Some("pt_BR"));
    assert_eq!(saved.get("Open").unwrap().translation, "[PT-BR] Open");
    assert_eq!(saved.get("Close").unwrap().context, vec!["app.py:2".to_string()]);
}

#[tokio::test]
async fn test_run_existingCatalog_shouldOnlyTranslatePending() {
    let dir = create_temp_dir().unwrap();
    let template_path = write_template(dir.path(), &["Open", "Close"]).unwrap();
    let output = create_test_file(
        dir.path(),
        "es.po",
        "msgid \"\"\nmsgstr \"\"\n\"Language: es\\n\"\n\n# keep me\nmsgid \"Open\"\nmsgstr \"Abrir\"\n",
    )
    .unwrap();
    let backend = MockBackend::working();

    let driver = PipelineDriver::with_defaults(mock_config("es"), Arc::new(backend.clone()), context("es"));
    let report = driver
        .run(&RunRequest::new(&template_path, &output), CancellationToken::new())
        .await;

    assert!(report.status.is_completed());
    assert_eq!(report.counts.translated, 1);
    assert_eq!(backend.batch_sizes(), vec![1]);

    let saved = read_catalog(&output);
    let open = saved.get("Open").unwrap();
    assert_eq!(open.translation, "Abrir");
    assert_eq!(open.translator_comments, vec!["keep me".to_string()]);
    assert_eq!(saved.get("Close").unwrap().translation, "[ES] Close");
}

#[tokio::test]
async fn test_run_batchSizeOverride_shouldSplitCalls() {
    let dir = create_temp_dir().unwrap();
    let template_path = write_template(dir.path(), &["A", "B", "C", "D", "E"]).unwrap();
    let backend = MockBackend::working();

    let driver = PipelineDriver::with_defaults(mock_config("es"), Arc::new(backend.clone()), context("es"));
    let request = RunRequest::new(&template_path, dir.path().join("es.po")).with_batch_size(2);
    driver.run(&request, CancellationToken::new()).await;

    assert_eq!(backend.batch_sizes(), vec![2, 2, 1]);
}

#[tokio::test]
async fn test_run_qualityMode_shouldWriteReviewRecords() {
    let dir = create_temp_dir().unwrap();
    let key = "File {name} not found";
    let template_path = write_template(dir.path(), &[key, "Save"]).unwrap();
    let review_path = dir.path().join("review/pt_BR.jsonl");

    let mut config = mock_config("pt-BR");
    config.mode = PipelineMode::Quality;
    let backend = MockBackend::working().with_responses([(key, "Arquivo não encontrado"), ("Save", "Salvar")]);
    let review = JsonlReviewSink::open(&review_path).unwrap();

    let driver = PipelineDriver::new(
        config,
        Arc::new(backend),
        context("pt-BR"),
        Arc::new(NullProgressSink),
        Arc::new(review),
    );
    let report = driver
        .run(&RunRequest::new(&template_path, dir.path().join("pt_BR.po")), CancellationToken::new())
        .await;

    assert_eq!(report.counts.translated, 1);
    assert_eq!(report.counts.needs_review, 1);

    let lines: Vec<ReviewRecord> = std::fs::read_to_string(&review_path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].key, key);
}

#[tokio::test]
async fn test_run_regionalProfile_shouldAdaptVocabulary() {
    let dir = create_temp_dir().unwrap();
    let template_path = write_template(dir.path(), &["Screen"]).unwrap();
    let profile = create_test_file(
        dir.path(),
        "br.json",
        r#"{"region": "BR", "forbidden_terms": [{"term": "ecrã", "alternative": "tela"}]}"#,
    )
    .unwrap();

    let mut config = mock_config("pt-BR");
    config.mode = PipelineMode::Quality;
    config.quality.profile = Some(profile);
    let backend = MockBackend::working().with_responses([("Screen", "Ecrã")]);
    let review = MemoryReviewSink::new();

    let driver = PipelineDriver::new(
        config,
        Arc::new(backend),
        context("pt-BR"),
        Arc::new(NullProgressSink),
        Arc::new(review.clone()),
    );
    let output = dir.path().join("pt_BR.po");
    driver.run(&RunRequest::new(&template_path, &output), CancellationToken::new()).await;

    assert!(review.is_empty());
    assert_eq!(read_catalog(&output).get("Screen").unwrap().translation, "Tela");
}

#[tokio::test]
async fn test_run_regionalProfile_shouldPutFormalityInPrompt() {
    let dir = create_temp_dir().unwrap();
    let template_path = write_template(dir.path(), &["Save"]).unwrap();
    let profile = create_test_file(
        dir.path(),
        "br.json",
        r#"{"region": "BR", "formality": "informal (você)", "forbidden_terms": [{"term": "ecrã", "alternative": "tela"}]}"#,
    )
    .unwrap();
    let mut config = mock_config("pt-BR");
    config.mode = PipelineMode::Quality;
    config.quality.profile = Some(profile);
    let backend = Arc::new(PromptRecorder::default());

    let driver = PipelineDriver::with_defaults(config, backend.clone(), context("pt-BR"));
    driver
        .run(&RunRequest::new(&template_path, dir.path().join("pt_BR.po")), CancellationToken::new())
        .await;

    let systems = backend.systems.lock();
    assert_eq!(systems.len(), 1);
    assert!(systems[0].contains("**Regional Conventions:**\nTarget region: BR."));
    assert!(systems[0].contains("Formality level: informal (você)."));
    assert!(systems[0].contains("'ecrã' (use 'tela')"));
}

#[tokio::test]
async fn test_run_directMode_shouldIgnoreRegionalProfile() {
    let dir = create_temp_dir().unwrap();
    let template_path = write_template(dir.path(), &["Save"]).unwrap();
    let mut config = mock_config("pt-BR");
    config.quality.profile = Some(create_test_file(dir.path(), "br.json", r#"{"region": "BR"}"#).unwrap());
    let backend = Arc::new(PromptRecorder::default());

    let driver = PipelineDriver::with_defaults(config, backend.clone(), context("pt-BR"));
    driver
        .run(&RunRequest::new(&template_path, dir.path().join("pt_BR.po")), CancellationToken::new())
        .await;

    assert!(!backend.systems.lock()[0].contains("Regional Conventions"));
}

#[test]
fn test_run_missingTemplate_shouldAbort() {
    init_test_logging();
    let dir = create_temp_dir().unwrap();
    let driver = PipelineDriver::with_defaults(mock_config("es"), Arc::new(MockBackend::working()), context("es"));

    let report = tokio_test::block_on(driver.run(
        &RunRequest::new(dir.path().join("missing.pot"), dir.path().join("es.po")),
        CancellationToken::new(),
    ));

    assert!(!report.status.is_completed());
    assert_eq!(report.status.exit_code(), 1);
    assert!(report.status.to_string().starts_with("Aborted: Failed to read template"));
}

#[tokio::test]
async fn test_run_fatalBackend_shouldReportAborted() {
    let dir = create_temp_dir().unwrap();
    let template_path = write_template(dir.path(), &["A", "B"]).unwrap();
    let request = RunRequest::new(&template_path, dir.path().join("es.po")).with_batch_size(1);

    let driver = PipelineDriver::with_defaults(mock_config("es"), Arc::new(MockBackend::fatal_after(0)), context("es"));
    let report = driver.run(&request, CancellationToken::new()).await;

    match &report.status {
        RunStatus::Aborted { reason } => assert!(reason.contains("mock credentials revoked")),
        other => panic!("expected abort, got {}", other),
    }
}

#[tokio::test]
async fn test_run_unwritableOutput_shouldAbortWithPersistenceReason() {
    let dir = create_temp_dir().unwrap();
    let template_path = write_template(dir.path(), &["A"]).unwrap();
    let blocker = create_test_file(dir.path(), "blocker", "").unwrap();
    let backend = MockBackend::working();

    let driver = PipelineDriver::with_defaults(mock_config("es"), Arc::new(backend.clone()), context("es"));
    let report = driver
        .run(&RunRequest::new(&template_path, blocker.join("es.po")), CancellationToken::new())
        .await;

    assert_eq!(report.status.exit_code(), 1);
    assert!(report.status.to_string().contains("Failed to persist catalog"));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_run_withGlossary_shouldComposeFromConfig() {
    let dir = create_temp_dir().unwrap();
    let glossary = create_test_file(dir.path(), "glossary.json", r#"{"Invoice": "Fatura"}"#).unwrap();
    let mut config = mock_config("pt-BR");
    config.context.glossary = Some(glossary);

    let bundle = ContextComposer::from_config(&config.context, &config.source_language, &config.language)
        .unwrap()
        .build();

    assert_eq!(bundle.glossary().len(), 1);
    assert!(bundle.render().contains("- Invoice: Fatura"));
}

/*!
 * Pipeline driver.
 *
 * Loads the template and the existing catalog, wires the orchestrator for
 * the configured mode and turns its outcome into a `RunReport`.
 */

use anyhow::{Context, Result};
use log::{error, info};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::app_config::{Config, PipelineMode};
use crate::catalog::{VerificationReport, po};
use crate::catalog::store::CatalogStore;
use crate::language_utils::to_po_locale;
use crate::quality::{PipelineResult, QualityPipeline, RegionalProfile};
use crate::reporting::{LogReviewSink, NullProgressSink, ProgressSink, ReviewSink};
use crate::translation::backend::TranslationBackend;
use crate::translation::context::ContextBundle;
use crate::translation::orchestrator::{Orchestrator, OrchestratorSettings, RunCounts, RunOutcome};

/// What to translate and where to write it
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Source template (`.pot`)
    pub template_path: PathBuf,
    /// Target catalog (`.po`), created if missing
    pub output_path: PathBuf,
    /// Overrides the configured batch size
    pub batch_size: Option<usize>,
}

impl RunRequest {
    pub fn new(template_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            template_path: template_path.into(),
            output_path: output_path.into(),
            batch_size: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// `<template dir>/<locale>.po`
    pub fn default_output_path(template_path: &Path, language: &str) -> Result<PathBuf> {
        let locale = to_po_locale(language)?;
        let dir = template_path.parent().unwrap_or(Path::new("."));
        Ok(dir.join(format!("{}.po", locale)))
    }
}

/// Terminal status of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Completed { failed: usize },
    Aborted { reason: String },
}

impl RunStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunStatus::Completed { .. })
    }

    /// Process exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::Completed { .. } => 0,
            RunStatus::Aborted { .. } => 1,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Completed { failed: 0 } => write!(f, "Completed"),
            RunStatus::Completed { failed } => write!(f, "Completed with {} failures", failed),
            RunStatus::Aborted { reason } => write!(f, "Aborted: {}", reason),
        }
    }
}

/// Summary of one run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,
    pub counts: RunCounts,
    pub duration: Duration,
    pub output_path: PathBuf,
    pub failed_keys: Vec<String>,
    pub results: Vec<PipelineResult>,
    pub verification: Option<VerificationReport>,
}

impl RunReport {
    fn from_outcome(outcome: RunOutcome, output_path: PathBuf, duration: Duration) -> Self {
        let status = match &outcome.error {
            Some(error) => RunStatus::Aborted {
                reason: error.to_string(),
            },
            None => RunStatus::Completed {
                failed: outcome.counts.failed,
            },
        };
        Self {
            status,
            counts: outcome.counts,
            duration,
            output_path,
            failed_keys: outcome.failed_keys,
            results: outcome.results,
            verification: outcome.verification,
        }
    }

    fn setup_failure(error: anyhow::Error, output_path: PathBuf, duration: Duration) -> Self {
        Self {
            status: RunStatus::Aborted {
                reason: format!("{:#}", error),
            },
            counts: RunCounts::default(),
            duration,
            output_path,
            failed_keys: Vec::new(),
            results: Vec::new(),
            verification: None,
        }
    }
}

/// Runs translation jobs with one configuration, backend and context
pub struct PipelineDriver {
    config: Config,
    backend: Arc<dyn TranslationBackend>,
    context: Arc<ContextBundle>,
    progress: Arc<dyn ProgressSink>,
    review: Arc<dyn ReviewSink>,
}

impl PipelineDriver {
    pub fn new(
        config: Config,
        backend: Arc<dyn TranslationBackend>,
        context: Arc<ContextBundle>,
        progress: Arc<dyn ProgressSink>,
        review: Arc<dyn ReviewSink>,
    ) -> Self {
        Self {
            config,
            backend,
            context,
            progress,
            review,
        }
    }

    /// Driver with silent progress and logged review records
    pub fn with_defaults(config: Config, backend: Arc<dyn TranslationBackend>, context: Arc<ContextBundle>) -> Self {
        Self::new(config, backend, context, Arc::new(NullProgressSink), Arc::new(LogReviewSink))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one job; setup errors are reported as an aborted run
    pub async fn run(&self, request: &RunRequest, cancel: CancellationToken) -> RunReport {
        let started = Instant::now();
        info!(
            "Translating {} into {} ({} mode)",
            request.template_path.display(),
            request.output_path.display(),
            self.config.mode
        );

        let report = match self.execute(request, cancel).await {
            Ok(outcome) => RunReport::from_outcome(outcome, request.output_path.clone(), started.elapsed()),
            Err(e) => {
                error!("Could not start run: {:#}", e);
                RunReport::setup_failure(e, request.output_path.clone(), started.elapsed())
            }
        };

        info!("{} in {:.1}s ({})", report.status, report.duration.as_secs_f32(), report.counts);
        report
    }

    async fn execute(&self, request: &RunRequest, cancel: CancellationToken) -> Result<RunOutcome> {
        let template = po::read_file(&request.template_path)
            .with_context(|| format!("Failed to read template: {}", request.template_path.display()))?;
        let locale = to_po_locale(&self.config.language)?;
        let store = CatalogStore::open(&request.output_path)
            .with_context(|| format!("Failed to open catalog: {}", request.output_path.display()))?
            .with_language(locale);

        let mut settings = OrchestratorSettings::from(&self.config.translation.common);
        if let Some(batch_size) = request.batch_size {
            settings.batch_size = batch_size.max(1);
        }

        let quality = self.config.mode == PipelineMode::Quality;
        let profile = match &self.config.quality.profile {
            Some(path) if quality => Some(RegionalProfile::load(path)?),
            _ => None,
        };
        let context = match &profile {
            Some(profile) => self.context.with_regional_conventions(profile.guidance()),
            None => Arc::clone(&self.context),
        };

        let mut orchestrator = Orchestrator::new(Arc::clone(&self.backend), context, settings)
            .with_progress(Arc::clone(&self.progress))
            .with_review(Arc::clone(&self.review));

        if quality {
            orchestrator = orchestrator.with_quality(self.quality_pipeline(profile.as_ref())?);
        }

        Ok(orchestrator.run(store, &template, cancel).await)
    }

    fn quality_pipeline(&self, profile: Option<&RegionalProfile>) -> Result<QualityPipeline> {
        let pipeline =
            QualityPipeline::standard(&self.config.quality, profile).context("Invalid term in regional profile")?;
        info!("Quality stages: {}", pipeline.stage_names().join(" -> "));
        Ok(pipeline)
    }
}

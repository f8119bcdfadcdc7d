/*!
 * Quality pipeline for translated batches.
 *
 * A pipeline is an ordered list of stages, each a pure transformation over
 * the batch's staged translations:
 *
 * - `regional`: vocabulary adaptation from a regional profile
 * - `scorer`: placeholder, markup, length and copy checks
 *
 * After the stages run, each translation is gated: a score at or above the
 * threshold with no hard failure is auto-approved, everything else goes to
 * human review.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::app_config::QualityConfig;

pub mod regional;
pub mod scorer;

pub use self::regional::{RegionalProfile, RegionalReviewer};
pub use self::scorer::{QualityCheck, QualityScorer, ScoreReport};

/// A translation moving through the quality stages
#[derive(Debug, Clone, PartialEq)]
pub struct StagedTranslation {
    /// Catalog key
    pub key: String,
    /// Source text (the key as written in the template)
    pub source: String,
    /// Current proposed translation
    pub text: String,
    /// Lowest score assigned so far
    pub score: Option<f32>,
    /// Descriptions of failed checks
    pub failing_checks: Vec<String>,
    /// Whether any failed check forbids auto-approval
    pub hard_failure: bool,
    /// Changes made by review stages
    pub notes: Vec<String>,
}

impl StagedTranslation {
    pub fn new(key: impl Into<String>, source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            source: source.into(),
            text: text.into(),
            score: None,
            failing_checks: Vec::new(),
            hard_failure: false,
            notes: Vec::new(),
        }
    }
}

/// One step of the quality pipeline
pub trait QualityStage: Send + Sync + fmt::Debug {
    /// Stage name used in logs
    fn name(&self) -> &str;

    /// Transform the batch; must return one item per input, in order
    fn apply(&self, items: Vec<StagedTranslation>) -> Vec<StagedTranslation>;
}

/// Final decision for one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    AutoApproved,
    NeedsReview,
    Failed,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::AutoApproved => write!(f, "auto-approved"),
            Decision::NeedsReview => write!(f, "needs review"),
            Decision::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome for one entry of a run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResult {
    pub key: String,
    pub translated_text: Option<String>,
    pub quality_score: Option<f32>,
    pub decision: Decision,
    pub failing_checks: Vec<String>,
}

impl PipelineResult {
    /// Accepted without review
    pub fn approved(key: impl Into<String>, text: impl Into<String>, score: Option<f32>) -> Self {
        Self {
            key: key.into(),
            translated_text: Some(text.into()),
            quality_score: score,
            decision: Decision::AutoApproved,
            failing_checks: Vec::new(),
        }
    }

    /// No translation could be produced
    pub fn failed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            translated_text: None,
            quality_score: None,
            decision: Decision::Failed,
            failing_checks: vec![reason.into()],
        }
    }
}

/// A translation waiting for a human decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: Uuid,
    pub key: String,
    pub source: String,
    pub proposed: String,
    pub score: f32,
    pub failing_checks: Vec<String>,
    pub language: String,
    pub created_at: DateTime<Utc>,
}

impl ReviewRecord {
    pub fn from_staged(item: &StagedTranslation, language: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: item.key.clone(),
            source: item.source.clone(),
            proposed: item.text.clone(),
            score: item.score.unwrap_or(0.0),
            failing_checks: item.failing_checks.clone(),
            language: language.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Ordered quality stages plus the approval threshold
#[derive(Debug)]
pub struct QualityPipeline {
    stages: Vec<Box<dyn QualityStage>>,
    threshold: f32,
}

impl QualityPipeline {
    /// An empty pipeline; add stages with `with_stage`
    pub fn new(threshold: f32) -> Self {
        Self {
            stages: Vec::new(),
            threshold,
        }
    }

    /// Regional review (when a profile is given) followed by scoring
    pub fn standard(config: &QualityConfig, profile: Option<&RegionalProfile>) -> Result<Self, regex::Error> {
        let mut pipeline = Self::new(config.threshold);
        if let Some(profile) = profile {
            pipeline = pipeline.with_stage(RegionalReviewer::new(profile)?);
        }
        Ok(pipeline.with_stage(QualityScorer::from_config(config)))
    }

    /// Append a stage
    pub fn with_stage(mut self, stage: impl QualityStage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Run all stages in order
    pub fn run(&self, items: Vec<StagedTranslation>) -> Vec<StagedTranslation> {
        self.stages.iter().fold(items, |items, stage| stage.apply(items))
    }

    /// Decide for one staged translation; an unscored item is never auto-approved
    pub fn gate(&self, item: &StagedTranslation) -> Decision {
        match item.score {
            Some(score) if score >= self.threshold && !item.hard_failure => Decision::AutoApproved,
            _ => Decision::NeedsReview,
        }
    }

    /// Run the stages and gate every item
    pub fn evaluate(&self, items: Vec<StagedTranslation>) -> Vec<(StagedTranslation, Decision)> {
        self.run(items)
            .into_iter()
            .map(|item| {
                let decision = self.gate(&item);
                (item, decision)
            })
            .collect()
    }
}

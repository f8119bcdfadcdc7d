/*!
 * Quality scoring of translated entries.
 *
 * Each check scores a translation in [0, 1]; the entry score is the minimum.
 * Placeholder, markup, length and empty-text checks are hard: failing any
 * of them forces human review regardless of the threshold.
 */

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use crate::app_config::QualityConfig;
use crate::quality::{QualityStage, StagedTranslation};

/// `{}`, `#{}`, `{0}`, `#{0}`, `{name}`, `%(name)s`, `%s`, `%d`
pub(crate) static PLACEHOLDER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"#?\{[0-9]*\}|\{[a-zA-Z_][a-zA-Z0-9_]*\}|%\([a-zA-Z_][a-zA-Z0-9_]*\)[sd]|%[sd]")
        .expect("Invalid placeholder regex")
});

/// Markup tags, capturing the closing slash and the tag name
pub(crate) static TAG_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<\s*(/?)\s*([a-zA-Z][a-zA-Z0-9-]*)[^>]*>").expect("Invalid markup tag regex")
});

/// Sources shorter than this are never flagged as untranslated copies
const UNTRANSLATED_MIN_LENGTH: usize = 20;

/// Individual quality checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityCheck {
    Placeholders,
    MarkupTags,
    LengthRatio,
    Empty,
    Untranslated,
}

impl QualityCheck {
    /// Score given when the check fails
    pub fn failure_score(&self) -> f32 {
        match self {
            Self::Placeholders => 0.3,
            Self::MarkupTags => 0.5,
            Self::LengthRatio => 0.6,
            Self::Empty => 0.0,
            // Brand names and URLs are legitimately copied; stays above the default threshold
            Self::Untranslated => 0.95,
        }
    }

    /// Whether failing the check forces review
    pub fn is_hard(&self) -> bool {
        !matches!(self, Self::Untranslated)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Placeholders => "placeholders",
            Self::MarkupTags => "markup_tags",
            Self::LengthRatio => "length_ratio",
            Self::Empty => "empty",
            Self::Untranslated => "untranslated",
        }
    }
}

impl fmt::Display for QualityCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A failed check with its explanation
#[derive(Debug, Clone, PartialEq)]
pub struct CheckFailure {
    pub check: QualityCheck,
    pub reason: String,
}

impl fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.check, self.reason)
    }
}

/// Outcome of scoring one translation
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreReport {
    pub score: f32,
    pub failures: Vec<CheckFailure>,
}

impl ScoreReport {
    pub fn has_hard_failure(&self) -> bool {
        self.failures.iter().any(|f| f.check.is_hard())
    }
}

fn sorted_placeholders(text: &str) -> Vec<&str> {
    let mut found: Vec<&str> = PLACEHOLDER_REGEX.find_iter(text).map(|m| m.as_str()).collect();
    found.sort_unstable();
    found
}

fn tag_sequence(text: &str) -> Vec<String> {
    TAG_REGEX
        .captures_iter(text)
        .map(|c| format!("{}{}", &c[1], c[2].to_lowercase()))
        .collect()
}

/// Scores translations against their sources
#[derive(Debug, Clone)]
pub struct QualityScorer {
    threshold: f32,
    min_length_ratio: f32,
    max_length_ratio: f32,
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::from_config(&QualityConfig::default())
    }
}

impl QualityScorer {
    pub fn new(threshold: f32, min_length_ratio: f32, max_length_ratio: f32) -> Self {
        Self {
            threshold,
            min_length_ratio,
            max_length_ratio,
        }
    }

    pub fn from_config(config: &QualityConfig) -> Self {
        Self::new(config.threshold, config.min_length_ratio, config.max_length_ratio)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    fn check_placeholders(source: &str, translation: &str) -> Option<String> {
        let expected = sorted_placeholders(source);
        let found = sorted_placeholders(translation);
        if expected == found {
            return None;
        }

        let missing: Vec<&str> = expected.iter().filter(|p| !found.contains(p)).copied().collect();
        let extra: Vec<&str> = found.iter().filter(|p| !expected.contains(p)).copied().collect();
        Some(match (missing.is_empty(), extra.is_empty()) {
            (false, true) => format!("missing {}", missing.join(", ")),
            (true, false) => format!("unexpected {}", extra.join(", ")),
            (false, false) => format!("missing {}; unexpected {}", missing.join(", "), extra.join(", ")),
            (true, true) => format!("count mismatch: expected {}, found {}", expected.len(), found.len()),
        })
    }

    fn check_tags(source: &str, translation: &str) -> Option<String> {
        let expected = tag_sequence(source);
        let found = tag_sequence(translation);
        if expected == found {
            None
        } else {
            Some(format!(
                "tag sequence differs: expected [{}], found [{}]",
                expected.join(" "),
                found.join(" ")
            ))
        }
    }

    fn check_length(&self, source: &str, translation: &str) -> Option<String> {
        let source_len = source.chars().count();
        let translation_len = translation.chars().count();
        if source_len == 0 || translation_len == 0 {
            return None;
        }

        let ratio = translation_len as f32 / source_len as f32;
        if ratio < self.min_length_ratio {
            Some(format!("translation too short: ratio={:.2}", ratio))
        } else if ratio > self.max_length_ratio {
            Some(format!("translation too long: ratio={:.2}", ratio))
        } else {
            None
        }
    }

    fn check_untranslated(source: &str, translation: &str) -> Option<String> {
        let source = source.trim();
        if source.chars().count() < UNTRANSLATED_MIN_LENGTH {
            return None;
        }
        if source.to_lowercase() == translation.trim().to_lowercase() {
            Some("translation is identical to the source".to_string())
        } else {
            None
        }
    }

    /// Score one translation
    pub fn score(&self, source: &str, translation: &str) -> ScoreReport {
        let mut failures = Vec::new();

        if !source.trim().is_empty() && translation.trim().is_empty() {
            failures.push(CheckFailure {
                check: QualityCheck::Empty,
                reason: "translation is empty".to_string(),
            });
        }
        if let Some(reason) = Self::check_placeholders(source, translation) {
            failures.push(CheckFailure { check: QualityCheck::Placeholders, reason });
        }
        if let Some(reason) = Self::check_tags(source, translation) {
            failures.push(CheckFailure { check: QualityCheck::MarkupTags, reason });
        }
        if let Some(reason) = self.check_length(source, translation) {
            failures.push(CheckFailure { check: QualityCheck::LengthRatio, reason });
        }
        if let Some(reason) = Self::check_untranslated(source, translation) {
            failures.push(CheckFailure { check: QualityCheck::Untranslated, reason });
        }

        let mut score = failures
            .iter()
            .map(|f| f.check.failure_score())
            .fold(1.0_f32, f32::min);

        // Hard failures never reach the threshold, even a lowered one
        if failures.iter().any(|f| f.check.is_hard()) && score >= self.threshold {
            score = (self.threshold - 0.01).max(0.0);
        }

        ScoreReport { score, failures }
    }
}

impl QualityStage for QualityScorer {
    fn name(&self) -> &str {
        "quality_score"
    }

    fn apply(&self, items: Vec<StagedTranslation>) -> Vec<StagedTranslation> {
        items
            .into_iter()
            .map(|mut item| {
                let report = self.score(&item.source, &item.text);
                if !report.failures.is_empty() {
                    debug!("{:?} scored {:.2}: {:?}", item.key, report.score, report.failures);
                }
                item.hard_failure |= report.has_hard_failure();
                item.failing_checks
                    .extend(report.failures.iter().map(ToString::to_string));
                item.score = Some(item.score.map_or(report.score, |s| s.min(report.score)));
                item
            })
            .collect()
    }
}

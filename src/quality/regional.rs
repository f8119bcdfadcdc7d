/*!
 * Regional review stage.
 *
 * Adapts vocabulary to a regional profile: forbidden terms are replaced by
 * their alternative and preferred synonyms are swapped in. Matching is
 * case-insensitive on word boundaries. Placeholders and markup tags are
 * never touched.
 */

use anyhow::{Context, Result};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::quality::{QualityStage, StagedTranslation};

/// Spans a substitution must not cross: markup tags and placeholders
static PROTECTED_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<[^>]+>|#?\{[0-9]*\}|\{[a-zA-Z_][a-zA-Z0-9_]*\}|%\([a-zA-Z_][a-zA-Z0-9_]*\)[sd]|%[sd]")
        .expect("Invalid protected span regex")
});

/// A term that must not appear in the region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForbiddenTerm {
    pub term: String,
    pub alternative: String,
    #[serde(default)]
    pub reason: String,
}

/// A word the region prefers over another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferredSynonym {
    pub original: String,
    pub preferred: String,
}

/// Regional vocabulary rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RegionalProfile {
    pub region: String,
    #[serde(default)]
    pub formality: Option<String>,
    #[serde(default)]
    pub forbidden_terms: Vec<ForbiddenTerm>,
    #[serde(default)]
    pub preferred_synonyms: Vec<PreferredSynonym>,
}

impl RegionalProfile {
    /// Load a profile from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read regional profile: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse regional profile: {}", path.display()))
    }

    /// Instructions for the model so first drafts already follow the region
    pub fn guidance(&self) -> String {
        let mut lines = vec![format!("Target region: {}.", self.region)];
        if let Some(formality) = self.formality.as_deref().filter(|f| !f.trim().is_empty()) {
            lines.push(format!("Formality level: {}.", formality.trim()));
        }
        if !self.forbidden_terms.is_empty() {
            let terms: Vec<String> = self
                .forbidden_terms
                .iter()
                .map(|t| format!("'{}' (use '{}')", t.term, t.alternative))
                .collect();
            lines.push(format!("Never use: {}.", terms.join(", ")));
        }
        if !self.preferred_synonyms.is_empty() {
            let synonyms: Vec<String> = self
                .preferred_synonyms
                .iter()
                .map(|s| format!("'{}' over '{}'", s.preferred, s.original))
                .collect();
            lines.push(format!("Prefer {}.", synonyms.join(", ")));
        }
        lines.join("\n")
    }
}

#[derive(Debug)]
struct Substitution {
    pattern: Regex,
    replacement: String,
    note: String,
}

/// Stage applying a `RegionalProfile`
#[derive(Debug)]
pub struct RegionalReviewer {
    region: String,
    substitutions: Vec<Substitution>,
}

fn word_pattern(term: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(term.trim())))
}

// Keep a capitalized match capitalized
fn match_case(matched: &str, replacement: &str) -> String {
    let starts_upper = matched.chars().next().is_some_and(char::is_uppercase);
    let mut chars = replacement.chars();
    match chars.next() {
        Some(first) if starts_upper && !first.is_uppercase() => first.to_uppercase().chain(chars).collect(),
        _ => replacement.to_string(),
    }
}

impl RegionalReviewer {
    pub fn new(profile: &RegionalProfile) -> Result<Self, regex::Error> {
        let mut substitutions = Vec::new();

        for forbidden in &profile.forbidden_terms {
            if forbidden.term.trim().is_empty() {
                continue;
            }
            let mut note = format!(
                "replaced forbidden term '{}' with '{}'",
                forbidden.term, forbidden.alternative
            );
            if !forbidden.reason.is_empty() {
                note.push_str(&format!(" ({})", forbidden.reason));
            }
            substitutions.push(Substitution {
                pattern: word_pattern(&forbidden.term)?,
                replacement: forbidden.alternative.clone(),
                note,
            });
        }

        for synonym in &profile.preferred_synonyms {
            if synonym.original.trim().is_empty() {
                continue;
            }
            substitutions.push(Substitution {
                pattern: word_pattern(&synonym.original)?,
                replacement: synonym.preferred.clone(),
                note: format!("preferred '{}' over '{}'", synonym.preferred, synonym.original),
            });
        }

        Ok(Self {
            region: profile.region.clone(),
            substitutions,
        })
    }

    /// Apply every substitution outside protected spans; returns the new text and notes
    pub fn review(&self, text: &str) -> (String, Vec<String>) {
        let mut current = text.to_string();
        let mut notes = Vec::new();

        for substitution in &self.substitutions {
            let (next, replaced) = Self::substitute_outside_protected(&current, substitution);
            if replaced > 0 {
                notes.push(substitution.note.clone());
                current = next;
            }
        }

        (current, notes)
    }

    fn substitute_outside_protected(text: &str, substitution: &Substitution) -> (String, usize) {
        let mut output = String::with_capacity(text.len());
        let mut replaced = 0;
        let mut cursor = 0;

        let mut replace_free = |segment: &str, output: &mut String| {
            let result = substitution.pattern.replace_all(segment, |caps: &regex::Captures| {
                replaced += 1;
                match_case(&caps[0], &substitution.replacement)
            });
            output.push_str(&result);
        };

        for protected in PROTECTED_REGEX.find_iter(text) {
            replace_free(&text[cursor..protected.start()], &mut output);
            output.push_str(protected.as_str());
            cursor = protected.end();
        }
        replace_free(&text[cursor..], &mut output);

        (output, replaced)
    }
}

impl QualityStage for RegionalReviewer {
    fn name(&self) -> &str {
        "regional_review"
    }

    fn apply(&self, items: Vec<StagedTranslation>) -> Vec<StagedTranslation> {
        items
            .into_iter()
            .map(|mut item| {
                let (text, notes) = self.review(&item.text);
                if !notes.is_empty() {
                    debug!("Regional review ({}) of {:?}: {}", self.region, item.key, notes.join("; "));
                    item.text = text;
                    item.notes.extend(notes);
                }
                item
            })
            .collect()
    }
}

/*!
 * Translation context assembly.
 *
 * `ContextComposer` gathers the guides, glossary, learned examples and
 * term corrections for one run and freezes them into a `ContextBundle`
 * shared read-only by every batch.
 *
 * Precedence, lowest first:
 * global guide < app guide < language guide < glossary < learned examples
 * < term corrections. Sections render in the same order so the strongest
 * instruction is the last one a model reads.
 */

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::app_config::ContextConfig;

/// A glossary term and its mandated translation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlossaryTerm {
    pub term: String,
    pub translation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A past correction: the model's rejected output and the preferred one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedExample {
    pub source: String,
    pub rejected: String,
    pub preferred: String,
}

/// A term the model keeps getting wrong and its correct translation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermCorrection {
    pub problematic: String,
    pub correct: String,
}

/// Glossary file: either a `{"term": "translation"}` map or a list of terms
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GlossaryFile {
    List(Vec<GlossaryTerm>),
    Map(BTreeMap<String, String>),
}

/// Corrections file: either a `{"problematic": "correct"}` map or a list
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CorrectionsFile {
    List(Vec<TermCorrection>),
    Map(BTreeMap<String, String>),
}

/// Immutable context for one run
#[derive(Debug, Clone, Default)]
pub struct ContextBundle {
    source_language: String,
    target_language: String,
    guide: Option<String>,
    app_guide: Option<String>,
    language_guide: Option<String>,
    regional: Option<String>,
    glossary: Vec<GlossaryTerm>,
    examples: Vec<LearnedExample>,
    corrections: Vec<TermCorrection>,
}

impl ContextBundle {
    pub fn source_language(&self) -> &str {
        &self.source_language
    }

    pub fn target_language(&self) -> &str {
        &self.target_language
    }

    pub fn guide(&self) -> Option<&str> {
        self.guide.as_deref()
    }

    pub fn app_guide(&self) -> Option<&str> {
        self.app_guide.as_deref()
    }

    pub fn language_guide(&self) -> Option<&str> {
        self.language_guide.as_deref()
    }

    /// Regional conventions rendered alongside the language guide
    pub fn regional_conventions(&self) -> Option<&str> {
        self.regional.as_deref()
    }

    /// Copy of this bundle carrying regional conventions
    pub fn with_regional_conventions(&self, text: impl Into<String>) -> Arc<ContextBundle> {
        Arc::new(Self {
            regional: non_blank(text),
            ..self.clone()
        })
    }

    /// Glossary in first-insertion order
    pub fn glossary(&self) -> &[GlossaryTerm] {
        &self.glossary
    }

    pub fn learned_examples(&self) -> &[LearnedExample] {
        &self.examples
    }

    /// Term corrections as structured rules
    pub fn term_corrections(&self) -> &[TermCorrection] {
        &self.corrections
    }

    /// Whether no source contributed anything
    pub fn is_empty(&self) -> bool {
        self.guide.is_none()
            && self.app_guide.is_none()
            && self.language_guide.is_none()
            && self.regional.is_none()
            && self.glossary.is_empty()
            && self.examples.is_empty()
            && self.corrections.is_empty()
    }

    /// Render all present sections, lowest precedence first
    pub fn render(&self) -> String {
        let mut sections: Vec<String> = Vec::new();

        if let Some(guide) = &self.guide {
            sections.push(format!(
                "**Standardization Guide:**\n{}\nFollow this guide strictly.",
                guide
            ));
        }
        if let Some(guide) = &self.app_guide {
            sections.push(format!("**Application Guide:**\n{}", guide));
        }
        if let Some(guide) = &self.language_guide {
            sections.push(format!("**Language Guide ({}):**\n{}", self.target_language, guide));
        }
        if let Some(conventions) = &self.regional {
            sections.push(format!("**Regional Conventions:**\n{}", conventions));
        }

        if !self.glossary.is_empty() {
            let mut section = String::from("**Glossary (Term -> Translation):**");
            for term in &self.glossary {
                section.push_str(&format!("\n- {}: {}", term.term, term.translation));
                if let Some(note) = &term.note {
                    section.push_str(&format!(" ({})", note));
                }
            }
            sections.push(section);
        }

        if !self.examples.is_empty() {
            let mut section = String::from(
                "**Learning from Corrections (Few-Shot Examples):**\n\
                 Pay attention to these past corrections. The 'Avoid' output was REJECTED. \
                 Use the 'Preferred' style and terminology instead.",
            );
            for example in &self.examples {
                section.push_str(&format!(
                    "\n- Source: '{}'\n  ❌ Avoid: '{}'\n  ✅ Preferred: '{}'",
                    example.source, example.rejected, example.preferred
                ));
            }
            sections.push(section);
        }

        if !self.corrections.is_empty() {
            let mut section = String::from(
                "**CRITICAL TERM RULES (Always follow these):**\n\
                 The following terms are often mistranslated. Use the CORRECT translation:",
            );
            for rule in &self.corrections {
                section.push_str(&format!(
                    "\n- '{}' → translate as '{}'",
                    rule.problematic, rule.correct
                ));
            }
            sections.push(section);
        }

        sections.join("\n\n")
    }
}

/// Builder for `ContextBundle`
#[derive(Debug, Default)]
pub struct ContextComposer {
    bundle: ContextBundle,
    glossary_index: HashMap<String, usize>,
}

fn non_blank(text: impl Into<String>) -> Option<String> {
    let text = text.into();
    if text.trim().is_empty() {
        None
    } else {
        Some(text.trim().to_string())
    }
}

impl ContextComposer {
    /// Start a composer for a language pair
    pub fn new(source_language: impl Into<String>, target_language: impl Into<String>) -> Self {
        Self {
            bundle: ContextBundle {
                source_language: source_language.into(),
                target_language: target_language.into(),
                ..ContextBundle::default()
            },
            glossary_index: HashMap::new(),
        }
    }

    /// Global standardization guide; blank text counts as absent
    pub fn guide(mut self, text: impl Into<String>) -> Self {
        self.bundle.guide = non_blank(text);
        self
    }

    pub fn app_guide(mut self, text: impl Into<String>) -> Self {
        self.bundle.app_guide = non_blank(text);
        self
    }

    pub fn language_guide(mut self, text: impl Into<String>) -> Self {
        self.bundle.language_guide = non_blank(text);
        self
    }

    /// Add a glossary term; a repeated term replaces the earlier translation in place
    pub fn glossary_term(
        mut self,
        term: impl Into<String>,
        translation: impl Into<String>,
        note: Option<String>,
    ) -> Self {
        self.insert_term(GlossaryTerm {
            term: term.into(),
            translation: translation.into(),
            note,
        });
        self
    }

    fn insert_term(&mut self, term: GlossaryTerm) {
        if term.term.trim().is_empty() {
            return;
        }
        match self.glossary_index.get(&term.term) {
            Some(&position) => self.bundle.glossary[position] = term,
            None => {
                self.glossary_index.insert(term.term.clone(), self.bundle.glossary.len());
                self.bundle.glossary.push(term);
            }
        }
    }

    pub fn learned_example(
        mut self,
        source: impl Into<String>,
        rejected: impl Into<String>,
        preferred: impl Into<String>,
    ) -> Self {
        self.bundle.examples.push(LearnedExample {
            source: source.into(),
            rejected: rejected.into(),
            preferred: preferred.into(),
        });
        self
    }

    pub fn term_correction(mut self, problematic: impl Into<String>, correct: impl Into<String>) -> Self {
        let rule = TermCorrection {
            problematic: problematic.into(),
            correct: correct.into(),
        };
        if !rule.problematic.trim().is_empty() && !rule.correct.trim().is_empty() {
            self.bundle.corrections.push(rule);
        }
        self
    }

    /// Load a text guide file
    pub fn load_guide_file(path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("Failed to read guide: {}", path.display()))
    }

    /// Add glossary terms from a JSON file
    pub fn load_glossary(mut self, path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read glossary: {}", path.display()))?;
        let file: GlossaryFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse glossary: {}", path.display()))?;

        let terms = match file {
            GlossaryFile::List(terms) => terms,
            GlossaryFile::Map(map) => map
                .into_iter()
                .map(|(term, translation)| GlossaryTerm { term, translation, note: None })
                .collect(),
        };
        for term in terms {
            self.insert_term(term);
        }
        Ok(self)
    }

    /// Add term corrections from a JSON file
    pub fn load_corrections(mut self, path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read corrections: {}", path.display()))?;
        let file: CorrectionsFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse corrections: {}", path.display()))?;

        let rules = match file {
            CorrectionsFile::List(rules) => rules,
            CorrectionsFile::Map(map) => map
                .into_iter()
                .map(|(problematic, correct)| TermCorrection { problematic, correct })
                .collect(),
        };
        for rule in rules {
            self = self.term_correction(rule.problematic, rule.correct);
        }
        Ok(self)
    }

    /// Add learned examples from a JSON list
    pub fn load_learned_examples(mut self, path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read learned examples: {}", path.display()))?;
        let examples: Vec<LearnedExample> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse learned examples: {}", path.display()))?;
        self.bundle.examples.extend(examples);
        Ok(self)
    }

    /// Compose from the configured files
    pub fn from_config(
        config: &ContextConfig,
        source_language: &str,
        target_language: &str,
    ) -> Result<Self> {
        let mut composer = Self::new(source_language, target_language);

        if let Some(path) = &config.guide {
            composer = composer.guide(Self::load_guide_file(path)?);
        }
        if let Some(path) = &config.app_guide {
            composer = composer.app_guide(Self::load_guide_file(path)?);
        }
        if let Some(path) = &config.language_guide {
            composer = composer.language_guide(Self::load_guide_file(path)?);
        }
        if let Some(path) = &config.glossary {
            composer = composer.load_glossary(path)?;
        }
        if let Some(path) = &config.learned_examples {
            composer = composer.load_learned_examples(path)?;
        }
        if let Some(path) = &config.corrections {
            composer = composer.load_corrections(path)?;
        }

        Ok(composer)
    }

    /// Freeze into a shared bundle
    pub fn build(self) -> Arc<ContextBundle> {
        Arc::new(self.bundle)
    }
}

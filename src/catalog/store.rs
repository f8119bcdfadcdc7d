/*!
 * Catalog store: merge, pending extraction, application and durable persistence.
 *
 * The store owns one working catalog and the path it is persisted to. Every
 * translation goes through `apply`, which is idempotent within a run, and
 * every write goes through an atomic temp-file-and-rename.
 */

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use tempfile::NamedTempFile;

use crate::catalog::entry::{Catalog, CatalogEntry, FUZZY_FLAG, PluralForm, Template};
use crate::catalog::po;
use crate::errors::CatalogError;

/// Header fields carried over from an existing catalog during a merge
const PRESERVED_HEADER_FIELDS: [&str; 2] = ["Language", "Plural-Forms"];

/// Result of applying a translation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The translation was written to the entry
    Applied,
    /// The key was already applied during this run; nothing changed
    AlreadyApplied,
}

/// Outcome of the final verification pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    /// Entries whose stale fuzzy flag was removed
    pub cleared_fuzzy: usize,
    /// Keys that still have no translation
    pub untranslated: Vec<String>,
}

impl VerificationReport {
    /// Whether every active entry has a translation
    pub fn is_complete(&self) -> bool {
        self.untranslated.is_empty()
    }
}

/// Serialized catalog bytes bound for a target path
#[derive(Debug, Clone)]
pub struct PersistSnapshot {
    path: PathBuf,
    contents: String,
}

impl PersistSnapshot {
    /// Write the snapshot atomically to its target path
    pub fn write(&self) -> Result<(), CatalogError> {
        write_atomic(&self.path, self.contents.as_bytes())
    }

    /// Target path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialized PO text
    pub fn contents(&self) -> &str {
        &self.contents
    }
}

/// Working catalog bound to its persistence path
#[derive(Debug)]
pub struct CatalogStore {
    catalog: Catalog,
    path: PathBuf,
    language: Option<String>,
    applied: HashSet<String>,
}

impl CatalogStore {
    /// Create a store around an in-memory catalog
    pub fn new(path: impl Into<PathBuf>, catalog: Catalog) -> Self {
        Self {
            catalog,
            path: path.into(),
            language: None,
            applied: HashSet::new(),
        }
    }

    /// Open the catalog at `path`, or start an empty one if the file does not exist
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CatalogError> {
        let path = path.into();
        let catalog = if path.exists() {
            info!("Loading existing catalog from: {}", path.display());
            po::read_file(&path)?
        } else {
            info!("Creating new catalog at: {}", path.display());
            Catalog::new()
        };
        Ok(Self::new(path, catalog))
    }

    /// Set the language stamped into the header on persist
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// The working catalog
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Persistence path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of keys applied during this run
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    /// Merge a template into an existing catalog.
    ///
    /// Template order is kept. Existing translations and fuzzy flags survive,
    /// occurrences and developer comments are refreshed from the template,
    /// and keys missing from the template are appended as obsolete entries
    /// in their original order. The function is pure and idempotent.
    pub fn merge(template: &Template, existing: &Catalog) -> Catalog {
        let mut header = template.header.clone();
        header.flags.retain(|f| f != FUZZY_FLAG);
        for name in PRESERVED_HEADER_FIELDS {
            if let Some(value) = existing.header.get(name) {
                header.set(name, value);
            }
        }
        header.fields.retain(|(name, value)| {
            !name.starts_with("X-Crowdin") && !(name == "Generated-By" && value.starts_with("Babel"))
        });

        let mut entries: Vec<CatalogEntry> = Vec::with_capacity(template.len() + existing.obsolete_count());

        for canonical in template.entries().iter().filter(|e| !e.obsolete) {
            let mut entry = match existing.get(&canonical.id()) {
                Some(current) => {
                    let mut revived = current.clone();
                    revived.obsolete = false;
                    revived
                }
                None => CatalogEntry::new(canonical.key()),
            };

            entry.context = canonical.context.clone();
            entry.comments = canonical.comments.clone();
            entry.msgctxt = canonical.msgctxt.clone();
            for flag in canonical.flags.iter().filter(|f| f.as_str() != FUZZY_FLAG) {
                if !entry.flags.contains(flag) {
                    entry.flags.push(flag.clone());
                }
            }
            let previous_forms = entry.plural.take();
            entry.plural = canonical.plural.as_ref().map(|form| PluralForm {
                key_plural: form.key_plural.clone(),
                translations: previous_forms.map(|p| p.translations).unwrap_or_default(),
            });

            entries.push(entry);
        }

        for current in existing.entries() {
            if !template.contains(&current.id()) {
                let mut stale = current.clone();
                stale.obsolete = true;
                entries.push(stale);
            }
        }

        Catalog::from_entries(header, entries)
    }

    /// Merge a template into the working catalog
    pub fn merge_template(&mut self, template: &Template) {
        info!("Merging {} template entries into {}", template.len(), self.path.display());
        self.catalog = Self::merge(template, &self.catalog);
        info!(
            "Total entries after merge: {} ({} obsolete)",
            self.catalog.len(),
            self.catalog.obsolete_count()
        );
    }

    /// Non-obsolete entries that are untranslated or fuzzy, in catalog order
    pub fn extract_pending(&self) -> Vec<CatalogEntry> {
        let pending: Vec<CatalogEntry> = self.catalog.pending().cloned().collect();
        info!("Found {} entries to translate", pending.len());
        pending
    }

    /// Apply a translation to the entry identified by `id` (its msgid, or
    /// `msgctxt` + EOT + msgid for entries with a context).
    ///
    /// The msgid's leading and trailing whitespace is mirrored onto the text
    /// and the fuzzy flag is cleared. Obsolete entries are not addressable.
    pub fn apply(&mut self, id: &str, translated_text: &str) -> Result<ApplyOutcome, CatalogError> {
        let entry = match self.catalog.get_mut(id) {
            Some(entry) if !entry.obsolete => entry,
            _ => return Err(CatalogError::UnknownKey(id.to_string())),
        };

        if self.applied.contains(id) {
            debug!("Translation for {:?} already applied, skipping", id);
            return Ok(ApplyOutcome::AlreadyApplied);
        }

        entry.translation = mirror_whitespace(entry.key(), translated_text);
        entry.set_fuzzy(false);
        self.applied.insert(id.to_string());
        Ok(ApplyOutcome::Applied)
    }

    /// Stamp the header and serialize the catalog for writing
    pub fn snapshot(&mut self) -> PersistSnapshot {
        self.stamp_header();
        PersistSnapshot {
            path: self.path.clone(),
            contents: po::serialize(&self.catalog),
        }
    }

    /// Write the catalog to its path atomically
    pub fn persist(&mut self) -> Result<(), CatalogError> {
        debug!("Saving catalog to: {}", self.path.display());
        self.snapshot().write()
    }

    /// Final consistency pass.
    ///
    /// Clears fuzzy flags that no longer mean anything (on entries applied
    /// this run, and on entries with no translation) and reports the keys
    /// still untranslated.
    pub fn verify(&mut self) -> VerificationReport {
        let mut report = VerificationReport::default();

        for entry in self.catalog.entries_mut().filter(|e| !e.obsolete) {
            let stale = self.applied.contains(&*entry.id()) || entry.translation.is_empty();
            if entry.is_fuzzy() && stale {
                entry.set_fuzzy(false);
                report.cleared_fuzzy += 1;
            }
            if entry.plural.is_none() && entry.translation.is_empty() {
                let origin = entry
                    .context
                    .first()
                    .map(|o| format!(" (Source: {})", o))
                    .unwrap_or_default();
                warn!("  - untranslated: {:?}{}", entry.key(), origin);
                report.untranslated.push(entry.id().into_owned());
            }
        }

        if report.is_complete() {
            info!("All entries in {} have a translation", self.path.display());
        } else {
            warn!(
                "{} entries in {} still have no translation",
                report.untranslated.len(),
                self.path.display()
            );
        }
        report
    }

    fn stamp_header(&mut self) {
        let header = &mut self.catalog.header;
        if let Some(language) = &self.language {
            header.set("Language", language.clone());
        }
        header.set(
            "PO-Revision-Date",
            chrono::Local::now().format("%Y-%m-%d %H:%M%z").to_string(),
        );
        header.set("X-Generator", format!("transhub {}", env!("CARGO_PKG_VERSION")));
        if header.get("Content-Type").is_none() {
            header.set("Content-Type", "text/plain; charset=UTF-8");
        }
    }
}

/// Copy the leading and trailing whitespace of `source` onto `text`
pub fn mirror_whitespace(source: &str, text: &str) -> String {
    let body_start = source.len() - source.trim_start().len();
    let leading = &source[..body_start];
    let rest = &source[body_start..];
    let trailing = &rest[rest.trim_end().len()..];
    format!("{}{}{}", leading, text.trim(), trailing)
}

/// Write `bytes` to `path` through a synced temporary sibling and a rename
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CatalogError> {
    let persistence = |message: String| CatalogError::Persistence {
        path: path.to_path_buf(),
        message,
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| persistence(e.to_string()))?;

    let mut temp = NamedTempFile::new_in(parent).map_err(|e| persistence(e.to_string()))?;
    temp.write_all(bytes).map_err(|e| persistence(e.to_string()))?;
    temp.as_file().sync_all().map_err(|e| persistence(e.to_string()))?;
    temp.persist(path).map_err(|e| persistence(e.error.to_string()))?;
    Ok(())
}

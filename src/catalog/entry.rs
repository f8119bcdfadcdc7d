/*!
 * Catalog data model.
 *
 * A catalog is an ordered list of entries keyed by their source text (msgid),
 * paired with the header metadata of the PO file. A template is the same
 * structure without translations.
 *
 * The same msgid may appear once per `msgctxt`. Such entries are told apart
 * by their id, which is `msgctxt` + EOT + msgid as in compiled MO files; an
 * entry without a context has its msgid as id.
 */

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

/// Flag marking a translation as stale relative to the template
pub const FUZZY_FLAG: &str = "fuzzy";

/// Separates `msgctxt` from msgid in an entry id
pub const CONTEXT_SEPARATOR: char = '\u{4}';

/// Build the id of an entry from its optional context and its msgid
pub fn entry_id<'a>(msgctxt: Option<&str>, key: &'a str) -> Cow<'a, str> {
    match msgctxt {
        Some(ctx) => Cow::Owned(format!("{}{}{}", ctx, CONTEXT_SEPARATOR, key)),
        None => Cow::Borrowed(key),
    }
}

/// The msgid part of an entry id
pub fn source_of(id: &str) -> &str {
    id.split_once(CONTEXT_SEPARATOR).map_or(id, |(_, key)| key)
}

/// Plural forms of an entry (`msgid_plural` / `msgstr[n]`)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PluralForm {
    /// Plural source text
    pub key_plural: String,
    /// Translations indexed by plural form
    pub translations: Vec<String>,
}

/// A unit of translatable text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Source text; the identity of the entry
    key: String,

    /// Current target-language text (may be empty)
    pub translation: String,

    /// Occurrence references (`file:line`), informational only
    pub context: Vec<String>,

    /// Developer comments (`#.`), passed to backends as hints
    pub comments: Vec<String>,

    /// Translator comments (`# `), kept but never sent to backends
    pub translator_comments: Vec<String>,

    /// Disambiguating context (`msgctxt`)
    pub msgctxt: Option<String>,

    /// Flags such as `fuzzy` or `python-format`
    pub flags: Vec<String>,

    /// Previous-msgid lines (`#|`), kept verbatim
    pub previous: Vec<String>,

    /// Plural forms, if the entry has any
    pub plural: Option<PluralForm>,

    /// Whether the key is no longer part of the template
    pub obsolete: bool,
}

impl CatalogEntry {
    /// Create a new untranslated entry
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            translation: String::new(),
            context: Vec::new(),
            comments: Vec::new(),
            translator_comments: Vec::new(),
            msgctxt: None,
            flags: Vec::new(),
            previous: Vec::new(),
            plural: None,
            obsolete: false,
        }
    }

    /// Set the translation (builder style)
    pub fn with_translation(mut self, translation: impl Into<String>) -> Self {
        self.translation = translation.into();
        self
    }

    /// Add an occurrence reference (builder style)
    pub fn with_occurrence(mut self, occurrence: impl Into<String>) -> Self {
        self.context.push(occurrence.into());
        self
    }

    /// Add a developer comment (builder style)
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comments.push(comment.into());
        self
    }

    /// Mark or unmark the entry as fuzzy (builder style)
    pub fn with_fuzzy(mut self, fuzzy: bool) -> Self {
        self.set_fuzzy(fuzzy);
        self
    }

    /// The source text (msgid)
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Identity within a catalog: the msgid, qualified by `msgctxt` when present
    pub fn id(&self) -> Cow<'_, str> {
        entry_id(self.msgctxt.as_deref(), &self.key)
    }

    /// Set the disambiguating context (builder style)
    pub fn with_msgctxt(mut self, msgctxt: impl Into<String>) -> Self {
        self.msgctxt = Some(msgctxt.into());
        self
    }

    /// Whether the translation is flagged as stale
    pub fn is_fuzzy(&self) -> bool {
        self.flags.iter().any(|f| f == FUZZY_FLAG)
    }

    /// Add or remove the fuzzy flag
    pub fn set_fuzzy(&mut self, fuzzy: bool) {
        if fuzzy {
            if !self.is_fuzzy() {
                self.flags.insert(0, FUZZY_FLAG.to_string());
            }
        } else {
            self.flags.retain(|f| f != FUZZY_FLAG);
        }
    }

    /// Whether the entry has a translation
    pub fn is_translated(&self) -> bool {
        !self.translation.is_empty()
    }

    /// Whether the entry should be offered for translation
    pub fn is_pending(&self) -> bool {
        !self.obsolete && self.plural.is_none() && (self.translation.is_empty() || self.is_fuzzy())
    }

    /// Developer comments joined into one hint string
    pub fn comment_text(&self) -> String {
        self.comments.join("\n")
    }
}

impl fmt::Display for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} -> {:?}", self.key, self.translation)?;
        if self.is_fuzzy() {
            write!(f, " (fuzzy)")?;
        }
        if self.obsolete {
            write!(f, " (obsolete)")?;
        }
        Ok(())
    }
}

/// Header metadata of a PO file (the entry with an empty msgid)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    /// Comment lines preceding the header, without their `#` prefix handling
    pub comments: Vec<String>,
    /// Header flags (commonly `fuzzy` in templates)
    pub flags: Vec<String>,
    /// Ordered `Name: value` fields
    pub fields: Vec<(String, String)>,
}

impl Header {
    /// Look up a header field by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set a header field, keeping its position when it already exists
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(slot) = self.fields.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            slot.1 = value;
        } else {
            self.fields.push((name.to_string(), value));
        }
    }

    /// Remove a header field
    pub fn remove(&mut self, name: &str) {
        self.fields.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    /// Whether the header carries no data at all
    pub fn is_empty(&self) -> bool {
        self.comments.is_empty() && self.flags.is_empty() && self.fields.is_empty()
    }

    /// Parse the `Name: value\n` block stored in the header msgstr
    pub fn parse_fields(raw: &str) -> Vec<(String, String)> {
        raw.lines()
            .filter_map(|line| {
                let (name, value) = line.split_once(':')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), value.trim().to_string()))
            })
            .collect()
    }

    /// Render the fields back into a header msgstr
    pub fn render_fields(&self) -> String {
        self.fields
            .iter()
            .map(|(k, v)| format!("{}: {}\n", k, v))
            .collect()
    }
}

/// Ordered mapping from entry id to entry, with header metadata
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    /// Header metadata
    pub header: Header,
    entries: Vec<CatalogEntry>,
    index: HashMap<String, usize>,
}

/// A template is a catalog whose translations are ignored
pub type Template = Catalog;

impl PartialEq for Catalog {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header && self.entries == other.entries
    }
}

impl Catalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog from entries; later duplicates of an id are dropped
    pub fn from_entries(header: Header, entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        let mut catalog = Self {
            header,
            ..Self::default()
        };
        for entry in entries {
            catalog.push(entry);
        }
        catalog
    }

    /// Append an entry. Returns false (and drops it) if its id already exists.
    pub fn push(&mut self, entry: CatalogEntry) -> bool {
        let id = entry.id().into_owned();
        if self.index.contains_key(&id) {
            log::warn!("Duplicate catalog entry ignored: {:?}", id);
            return false;
        }
        self.index.insert(id, self.entries.len());
        self.entries.push(entry);
        true
    }

    /// Look up an entry by id (see [`CatalogEntry::id`])
    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.index.get(id).map(|&i| &self.entries[i])
    }

    /// Look up an entry by id for modification
    pub fn get_mut(&mut self, id: &str) -> Option<&mut CatalogEntry> {
        match self.index.get(id) {
            Some(&i) => Some(&mut self.entries[i]),
            None => None,
        }
    }

    /// Whether an entry with this id is present
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Entries in catalog order
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Iterate over entries mutably, in catalog order
    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut CatalogEntry> {
        self.entries.iter_mut()
    }

    /// Keys in catalog order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key())
    }

    /// Number of entries (obsolete included)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of obsolete entries
    pub fn obsolete_count(&self) -> usize {
        self.entries.iter().filter(|e| e.obsolete).count()
    }

    /// Entries still waiting for a translation
    pub fn pending(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter().filter(|e| e.is_pending())
    }
}

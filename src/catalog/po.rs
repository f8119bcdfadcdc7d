/*!
 * Gettext PO/POT codec.
 *
 * Parses and serializes the subset of the PO format used by translation
 * catalogs: header entry, `#`, `#.`, `#:`, `#,` and `#|` comments, `msgctxt`,
 * plural forms, multi-line strings with escapes, and `#~` obsolete entries.
 *
 * Output is unwrapped: each string is written on one line unless it contains
 * embedded newlines, in which case it is split after every `\n`.
 */

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::catalog::entry::{Catalog, CatalogEntry, Header, PluralForm};
use crate::errors::CatalogError;

/// Which keyword a continuation line extends
#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    Ctxt,
    Id,
    IdPlural,
    Str,
    StrPlural(usize),
}

/// An entry as it appears in the file, before it becomes a catalog entry
#[derive(Debug, Default)]
struct RawEntry {
    translator_comments: Vec<String>,
    comments: Vec<String>,
    occurrences: Vec<String>,
    flags: Vec<String>,
    previous: Vec<String>,
    msgctxt: Option<String>,
    msgid: Option<String>,
    msgid_plural: Option<String>,
    msgstr: Option<String>,
    msgstr_plural: BTreeMap<usize, String>,
    obsolete: bool,
    line: usize,
}

impl RawEntry {
    fn has_keywords(&self) -> bool {
        self.msgctxt.is_some() || self.msgid.is_some()
    }

    fn is_header(&self) -> bool {
        !self.obsolete && self.msgctxt.is_none() && self.msgid.as_deref() == Some("")
    }

    fn into_entry(self) -> CatalogEntry {
        let mut entry = CatalogEntry::new(self.msgid.unwrap_or_default());
        entry.translation = self.msgstr.unwrap_or_default();
        entry.context = self.occurrences;
        entry.comments = self.comments;
        entry.translator_comments = self.translator_comments;
        entry.msgctxt = self.msgctxt;
        entry.flags = self.flags;
        entry.previous = self.previous;
        entry.obsolete = self.obsolete;
        entry.plural = self.msgid_plural.map(|key_plural| PluralForm {
            key_plural,
            translations: self.msgstr_plural.into_values().collect(),
        });
        entry
    }
}

/// Line-oriented PO parser
struct Parser {
    entries: Vec<RawEntry>,
    current: RawEntry,
    field: Option<Field>,
}

impl Parser {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            current: RawEntry::default(),
            field: None,
        }
    }

    fn flush(&mut self) -> Result<(), CatalogError> {
        let finished = std::mem::take(&mut self.current);
        self.field = None;

        if finished.msgid.is_some() {
            self.entries.push(finished);
        } else if finished.msgctxt.is_some() {
            return Err(CatalogError::Parse {
                line: finished.line,
                message: "msgctxt without msgid".to_string(),
            });
        }
        Ok(())
    }

    fn comment(&mut self, trimmed: &str, line: usize) -> Result<(), CatalogError> {
        if self.current.has_keywords() {
            self.flush()?;
        }
        if self.current.line == 0 {
            self.current.line = line;
        }

        let marker = trimmed.get(..2).unwrap_or(trimmed);
        let rest = trimmed.get(2..).unwrap_or_default();
        match marker {
            "#." => self.current.comments.push(strip_one_space(rest).to_string()),
            "#:" => self
                .current
                .occurrences
                .extend(rest.split_whitespace().map(str::to_string)),
            "#," => self.current.flags.extend(
                rest.split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string),
            ),
            "#|" => self.current.previous.push(strip_one_space(rest).to_string()),
            _ => {
                let text = trimmed.strip_prefix('#').unwrap_or(trimmed);
                self.current.translator_comments.push(strip_one_space(text).to_string());
            }
        }
        Ok(())
    }

    fn keyword(&mut self, text: &str, line: usize, obsolete: bool) -> Result<(), CatalogError> {
        if text.starts_with('"') {
            let value = unquote(text, line)?;
            let field = self.field.ok_or_else(|| CatalogError::Parse {
                line,
                message: "string continuation without a keyword".to_string(),
            })?;
            self.append(field, &value);
            return Ok(());
        }

        let (keyword, rest) = match text.find(char::is_whitespace) {
            Some(pos) => (&text[..pos], text[pos..].trim_start()),
            None => (text, ""),
        };
        let value = unquote(rest, line)?;

        let field = match keyword {
            "msgctxt" => Field::Ctxt,
            "msgid" => Field::Id,
            "msgid_plural" => Field::IdPlural,
            "msgstr" => Field::Str,
            other => match plural_index(other) {
                Some(index) => Field::StrPlural(index),
                None => {
                    return Err(CatalogError::Parse {
                        line,
                        message: format!("unknown keyword {:?}", other),
                    });
                }
            },
        };

        // A new msgctxt or msgid after a complete entry starts the next entry
        if matches!(field, Field::Ctxt | Field::Id) && self.current.msgid.is_some() {
            self.flush()?;
        }
        if self.current.line == 0 {
            self.current.line = line;
        }
        if matches!(field, Field::IdPlural | Field::Str | Field::StrPlural(_)) && self.current.msgid.is_none() {
            return Err(CatalogError::Parse {
                line,
                message: format!("{} before msgid", keyword),
            });
        }

        self.current.obsolete |= obsolete;
        match field {
            Field::Ctxt => self.current.msgctxt = Some(value),
            Field::Id => self.current.msgid = Some(value),
            Field::IdPlural => self.current.msgid_plural = Some(value),
            Field::Str => self.current.msgstr = Some(value),
            Field::StrPlural(index) => {
                self.current.msgstr_plural.insert(index, value);
            }
        }
        self.field = Some(field);
        Ok(())
    }

    fn append(&mut self, field: Field, value: &str) {
        let target = match field {
            Field::Ctxt => self.current.msgctxt.get_or_insert_with(String::new),
            Field::Id => self.current.msgid.get_or_insert_with(String::new),
            Field::IdPlural => self.current.msgid_plural.get_or_insert_with(String::new),
            Field::Str => self.current.msgstr.get_or_insert_with(String::new),
            Field::StrPlural(index) => self.current.msgstr_plural.entry(index).or_default(),
        };
        target.push_str(value);
    }
}

fn strip_one_space(text: &str) -> &str {
    text.strip_prefix(' ').unwrap_or(text)
}

fn plural_index(keyword: &str) -> Option<usize> {
    keyword
        .strip_prefix("msgstr[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

/// Decode one quoted PO string
fn unquote(text: &str, line: usize) -> Result<String, CatalogError> {
    let text = text.trim();
    let inner = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .filter(|_| text.len() >= 2)
        .ok_or_else(|| CatalogError::Parse {
            line,
            message: format!("expected a quoted string, found {:?}", text),
        })?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => {
                return Err(CatalogError::Parse {
                    line,
                    message: "dangling escape at end of string".to_string(),
                });
            }
        }
    }
    Ok(out)
}

/// Encode a string for use between PO double quotes
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out
}

/// Parse PO or POT text into a catalog
pub fn parse(text: &str) -> Result<Catalog, CatalogError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut parser = Parser::new();

    for (index, raw_line) in text.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw_line.trim();

        if trimmed.is_empty() {
            parser.flush()?;
        } else if let Some(rest) = trimmed.strip_prefix("#~") {
            let rest = rest.trim_start();
            if let Some(previous) = rest.strip_prefix('|') {
                parser.current.previous.push(strip_one_space(previous).to_string());
            } else if !rest.is_empty() {
                parser.keyword(rest, line, true)?;
            }
        } else if trimmed.starts_with('#') {
            parser.comment(trimmed, line)?;
        } else {
            parser.keyword(trimmed, line, false)?;
        }
    }
    parser.flush()?;

    let mut raw_entries = parser.entries.into_iter().peekable();
    let mut header = Header::default();
    if raw_entries.peek().is_some_and(RawEntry::is_header) {
        if let Some(raw) = raw_entries.next() {
            header = Header {
                comments: raw.translator_comments,
                flags: raw.flags,
                fields: Header::parse_fields(raw.msgstr.as_deref().unwrap_or_default()),
            };
        }
    }

    Ok(Catalog::from_entries(header, raw_entries.map(RawEntry::into_entry)))
}

/// Read and parse a PO or POT file
pub fn read_file(path: &Path) -> Result<Catalog, CatalogError> {
    let text = fs::read_to_string(path)?;
    parse(&text)
}

fn write_comment(out: &mut String, marker: &str, text: &str) {
    out.push_str(marker);
    if !text.is_empty() {
        out.push(' ');
        out.push_str(text);
    }
    out.push('\n');
}

fn write_field(out: &mut String, prefix: &str, keyword: &str, value: &str, force_multiline: bool) {
    let parts: Vec<&str> = value.split_inclusive('\n').collect();
    if parts.len() > 1 || (force_multiline && !value.is_empty()) {
        out.push_str(&format!("{}{} \"\"\n", prefix, keyword));
        for part in parts {
            out.push_str(&format!("{}\"{}\"\n", prefix, escape(part)));
        }
    } else {
        out.push_str(&format!("{}{} \"{}\"\n", prefix, keyword, escape(value)));
    }
}

fn write_entry(out: &mut String, entry: &CatalogEntry) {
    for comment in &entry.translator_comments {
        write_comment(out, "#", comment);
    }
    for comment in &entry.comments {
        write_comment(out, "#.", comment);
    }
    if !entry.context.is_empty() {
        write_comment(out, "#:", &entry.context.join(" "));
    }
    if !entry.flags.is_empty() {
        write_comment(out, "#,", &entry.flags.join(", "));
    }

    let prefix = if entry.obsolete { "#~ " } else { "" };
    for previous in &entry.previous {
        write_comment(out, if entry.obsolete { "#~|" } else { "#|" }, previous);
    }
    if let Some(msgctxt) = &entry.msgctxt {
        write_field(out, prefix, "msgctxt", msgctxt, false);
    }
    write_field(out, prefix, "msgid", entry.key(), false);
    match &entry.plural {
        Some(plural) => {
            write_field(out, prefix, "msgid_plural", &plural.key_plural, false);
            for (index, translation) in plural.translations.iter().enumerate() {
                write_field(out, prefix, &format!("msgstr[{}]", index), translation, false);
            }
        }
        None => write_field(out, prefix, "msgstr", &entry.translation, false),
    }
}

/// Serialize a catalog to PO text
pub fn serialize(catalog: &Catalog) -> String {
    let mut blocks: Vec<String> = Vec::with_capacity(catalog.len() + 1);

    if !catalog.header.is_empty() {
        let mut out = String::new();
        for comment in &catalog.header.comments {
            write_comment(&mut out, "#", comment);
        }
        if !catalog.header.flags.is_empty() {
            write_comment(&mut out, "#,", &catalog.header.flags.join(", "));
        }
        out.push_str("msgid \"\"\n");
        write_field(&mut out, "", "msgstr", &catalog.header.render_fields(), true);
        blocks.push(out);
    }

    for entry in catalog.entries() {
        let mut out = String::new();
        write_entry(&mut out, entry);
        blocks.push(out);
    }

    blocks.join("\n")
}

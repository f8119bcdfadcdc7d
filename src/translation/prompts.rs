/*!
 * Prompt templates for catalog translation.
 *
 * Entries travel to the model as JSON (msgid plus its code context) and
 * come back as JSON: an array of `{"translated": ...}` objects for a
 * batch, a single object for a one-entry batch.
 */

use serde::Serialize;

use crate::catalog::CatalogEntry;
use crate::language_utils;
use crate::translation::batch::Batch;
use crate::translation::context::ContextBundle;

/// What the model sees for one entry
#[derive(Debug, Serialize)]
pub struct PromptItem<'a> {
    pub msgid: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msgctxt: Option<&'a str>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    pub occurrences: &'a [String],
    #[serde(skip_serializing_if = "String::is_empty")]
    pub comment: String,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    pub flags: &'a [String],
}

impl<'a> From<&'a CatalogEntry> for PromptItem<'a> {
    fn from(entry: &'a CatalogEntry) -> Self {
        Self {
            msgid: entry.key(),
            msgctxt: entry.msgctxt.as_deref(),
            occurrences: &entry.context,
            comment: entry.comment_text(),
            flags: &entry.flags,
        }
    }
}

/// Builds system and user prompts from a context bundle
#[derive(Debug, Clone, Copy)]
pub struct PromptBuilder<'a> {
    bundle: &'a ContextBundle,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(bundle: &'a ContextBundle) -> Self {
        Self { bundle }
    }

    fn target_description(&self) -> String {
        let code = self.bundle.target_language();
        match language_utils::get_language_name(code) {
            Ok(name) => format!("{} ('{}')", name, code),
            Err(_) => format!("'{}'", code),
        }
    }

    /// System instruction: role, context sections and output contract
    pub fn system(&self, single: bool) -> String {
        let mut prompt = format!(
            "You are a translator specialized in business software, translating user interface strings to {}.\n\
             Translate considering where each text appears in the code (occurrences), \
             developer comments (comment) and flags (flags).",
            self.target_description()
        );

        let context = self.bundle.render();
        if !context.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&context);
        }

        prompt.push_str("\n\n");
        if single {
            prompt.push_str("Return YOUR RESPONSE AS A SINGLE JSON OBJECT with the key 'translated'.\n");
        } else {
            prompt.push_str(
                "Return YOUR RESPONSE AS A SINGLE JSON ARRAY of objects, each with the key 'translated'.\n\
                 The output array must have exactly the same number of items as the input, in the same order.\n",
            );
        }
        prompt.push_str("Keep placeholders like `{0}`, `%s` and HTML tags like `<strong>` intact.");
        prompt
    }

    /// User message carrying the batch as JSON
    pub fn user(&self, batch: &Batch) -> Result<String, serde_json::Error> {
        if batch.is_single() {
            let item = PromptItem::from(&batch.entries()[0]);
            let json = serde_json::to_string_pretty(&item)?;
            return Ok(format!(
                "Item to translate:\n{}\n\nOutput JSON Object (only the 'translated' object):\n",
                json
            ));
        }

        let items: Vec<PromptItem<'_>> = batch.entries().iter().map(PromptItem::from).collect();
        let json = serde_json::to_string_pretty(&items)?;
        Ok(format!(
            "Items to translate:\n{}\n\nOutput JSON Array (only the array of 'translated' objects):\n",
            json
        ))
    }
}

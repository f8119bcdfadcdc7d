/*!
 * # transhub
 *
 * AI-assisted translation of gettext catalogs.
 *
 * A `.pot` template is merged into the target `.po` catalog, pending entries
 * are sent to a translation backend in batches, and the results are written
 * back atomically after every batch. In quality mode each batch passes
 * regional review and scoring first; low-scoring translations go to human
 * review instead of the catalog.
 *
 * ## Architecture
 *
 * - `app_config`: configuration file, provider table, defaults and validation
 * - `catalog`: PO/POT model, codec and the `CatalogStore`
 * - `translation`: batching, context, prompts, backends and the orchestrator
 * - `quality`: regional review, scoring and gating
 * - `reporting`: progress and review sinks
 * - `driver`: one run from template path to `RunReport`
 * - `providers`: HTTP clients for Gemini, OpenAI-compatible APIs, Anthropic and Ollama
 * - `language_utils`: ISO language code utilities
 * - `errors`: typed error enums
 */

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

pub mod app_config;
pub mod catalog;
pub mod driver;
pub mod errors;
pub mod language_utils;
pub mod providers;
pub mod quality;
pub mod reporting;
pub mod translation;

pub use app_config::{Config, PipelineMode};
pub use catalog::{Catalog, CatalogEntry, CatalogStore, Template};
pub use driver::{PipelineDriver, RunReport, RunRequest, RunStatus};
pub use errors::{BackendError, CatalogError, PipelineError, ProviderError};
pub use language_utils::{get_language_name, language_codes_match, normalize_to_part2t};
pub use translation::{ContextComposer, MockBackend, Orchestrator, TranslationBackend};

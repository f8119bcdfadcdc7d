/*!
 * Translation of pending catalog entries.
 *
 * - `batch`: partitioning of pending entries into ordered batches
 * - `context`: guides, glossary, corrections and learned examples
 * - `prompts`: system and user prompts for LLM backends
 * - `backend`: the `TranslationBackend` seam, LLM and mock implementations
 * - `orchestrator`: dispatch, retry, degradation, gating and persistence
 */

pub use self::backend::{LlmBackend, MockBackend, MockBehavior, TranslationBackend, backend_from_config};
pub use self::batch::{Batch, DEFAULT_BATCH_SIZE};
pub use self::context::{ContextBundle, ContextComposer, GlossaryTerm, LearnedExample, TermCorrection};
pub use self::orchestrator::{Orchestrator, OrchestratorSettings, RunCounts, RunOutcome, RunState};
pub use self::prompts::PromptBuilder;

pub mod backend;
pub mod batch;
pub mod context;
pub mod orchestrator;
pub mod prompts;

/*!
 * Translation of LaTeX documents.
 *
 * - `chunker`: Splits oversized text runs at natural boundaries
 * - `cache`: Per-document paragraph cache on top of the database
 * - `core`: Text-level translation with retries and cache lookups
 * - `paragraph`: Protect, translate and recover one paragraph, nested constructs included
 * - `orchestrator`: Whole-document runs on a bounded worker pool
 * - `concurrency`: Per-engine worker defaults
 */

pub use self::cache::TranslationCache;
pub use self::core::TextTranslator;
pub use self::orchestrator::{DocumentTranslator, ParagraphFailure, TranslationOutput, TranslationSummary};
pub use self::paragraph::{ParagraphOutcome, ParagraphTranslator};

pub mod cache;
pub mod chunker;
pub mod concurrency;
pub mod core;
pub mod orchestrator;
pub mod paragraph;

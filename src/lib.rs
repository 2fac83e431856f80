/*!
 * # texlate
 *
 * A Rust library for translating LaTeX documents while keeping their
 * markup intact.
 *
 * ## Features
 *
 * - Math, references, citations and unknown commands are replaced by opaque
 *   placeholders before translation and restored afterwards
 * - Prose inside section titles, captions, footnotes, known environments and
 *   selected arguments of multi-argument commands is translated in place
 * - Paragraphs are translated in parallel with per-paragraph and batch
 *   deadlines; a failed paragraph keeps its original text
 * - Per-document paragraph cache in SQLite
 * - Google, DeepL and OpenAI-compatible engines
 *
 * ## Architecture
 *
 * - `latex`: Scanning, protection, traversal, normalization and repair
 * - `translation`: Chunking, caching, paragraph and document translation
 * - `providers`: Translation engine clients
 * - `database`: SQLite persistence for the cache
 * - `app_config`: Configuration management
 * - `app_controller`: File and directory workflows
 * - `file_utils`: File system operations
 * - `language_utils`: ISO language code utilities
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

pub mod app_config;
pub mod app_controller;
pub mod database;
pub mod errors;
pub mod file_utils;
pub mod language_utils;
pub mod latex;
pub mod providers;
pub mod translation;

pub use app_config::Config;
pub use errors::{AppError, ConfigError, LatexError, ProviderError, TranslationError};
pub use language_utils::{get_language_name, language_codes_match};
pub use providers::TranslationEngine;
pub use translation::{DocumentTranslator, TranslationCache, TranslationOutput, TranslationSummary};

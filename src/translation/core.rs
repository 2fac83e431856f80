/*!
 * Text-level translation.
 *
 * `TextTranslator` turns one protected text run into its translation: it
 * skips text that needs no translation, splits runs that are too large for
 * the engine, consults the cache per submitted unit and retries rate-limited
 * calls with exponential backoff. It also keeps the engine call statistics
 * for the run.
 */

use log::{debug, warn};
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::cache::TranslationCache;
use super::chunker::{join_chunks, Chunker};
use crate::app_config::RuntimeConfig;
use crate::errors::TranslationError;
use crate::providers::TranslationEngine;

const ZERO_WIDTH_SPACE: char = '\u{200b}';

/// Engine usage for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranslatorStats {
    /// Calls made to the engine, retries included
    pub engine_calls: usize,
    /// Characters sent to the engine
    pub characters: usize,
}

/// Cache and document key used for lookups during one run
#[derive(Debug, Clone)]
struct CacheBinding {
    cache: TranslationCache,
    doc_key: String,
}

/// Whether `text` holds anything worth sending to an engine.
///
/// Text without letters and text whose cased letters are all uppercase
/// (headings, acronyms, bare placeholders) pass through untouched. Letters
/// without case, such as CJK ideographs, always count as translatable.
pub fn needs_translation(text: &str) -> bool {
    text.chars()
        .any(|c| c.is_lowercase() || (c.is_alphabetic() && !c.is_uppercase()))
}

/// Translates protected text runs with one engine and language pair
#[derive(Debug, Clone)]
pub struct TextTranslator {
    engine: Arc<dyn TranslationEngine>,
    source_language: String,
    target_language: String,
    cache: Option<CacheBinding>,
    retry_count: u32,
    retry_backoff_ms: u64,
    chunker: Chunker,
    engine_calls: Arc<AtomicUsize>,
    characters: Arc<AtomicUsize>,
}

impl TextTranslator {
    /// Create a translator; `math_code` is the placeholder stem chunk cuts must respect
    pub fn new(
        engine: Arc<dyn TranslationEngine>,
        source_language: impl Into<String>,
        target_language: impl Into<String>,
        runtime: &RuntimeConfig,
        math_code: &str,
    ) -> Self {
        Self {
            engine,
            source_language: source_language.into(),
            target_language: target_language.into(),
            cache: None,
            retry_count: runtime.retry_count,
            retry_backoff_ms: runtime.retry_backoff_ms,
            chunker: Chunker::new(math_code),
            engine_calls: Arc::new(AtomicUsize::new(0)),
            characters: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Look up and store units under `doc_key`
    pub fn with_cache(mut self, cache: TranslationCache, doc_key: impl Into<String>) -> Self {
        self.cache = Some(CacheBinding {
            cache,
            doc_key: doc_key.into(),
        });
        self
    }

    /// The engine in use
    pub fn engine(&self) -> &Arc<dyn TranslationEngine> {
        &self.engine
    }

    /// Engine usage so far
    pub fn stats(&self) -> TranslatorStats {
        TranslatorStats {
            engine_calls: self.engine_calls.load(Ordering::Relaxed),
            characters: self.characters.load(Ordering::Relaxed),
        }
    }

    /// Translate a text run, keeping its leading and trailing whitespace
    pub async fn translate(&self, text: &str) -> Result<String, TranslationError> {
        let trimmed = text.trim();
        if !needs_translation(trimmed) {
            return Ok(text.to_string());
        }
        let leading = &text[..text.len() - text.trim_start().len()];
        let trailing = &text[text.trim_end().len()..];

        let max_size = self.engine.max_unit_size();
        let body = if self.engine.measure(trimmed) > max_size {
            let chunks = self
                .chunker
                .split(trimmed, max_size, |chunk| self.engine.measure(chunk));
            debug!("Split text run into {} chunks", chunks.len());
            let mut translated = Vec::with_capacity(chunks.len());
            for chunk in &chunks {
                translated.push(self.translate_unit(&chunk.text).await?);
            }
            join_chunks(&translated, &chunks)
        } else {
            self.translate_unit(trimmed).await?
        };

        Ok(format!("{}{}{}", leading, body, trailing))
    }

    /// Translate one engine-sized unit, going through the cache
    async fn translate_unit(&self, text: &str) -> Result<String, TranslationError> {
        if !needs_translation(text) {
            return Ok(text.to_string());
        }

        let paragraph_key = TranslationCache::paragraph_key(text);
        if let Some(binding) = &self.cache {
            match binding.cache.get(&binding.doc_key, &paragraph_key).await {
                Ok(Some(cached)) => return Ok(cached),
                Ok(None) => {}
                Err(e) => warn!("Cache lookup failed, translating anyway: {}", e),
            }
        }

        let translated: String = self
            .call_engine(text)
            .await?
            .chars()
            .filter(|&c| c != ZERO_WIDTH_SPACE)
            .collect();

        if let Some(binding) = &self.cache {
            if let Err(e) = binding.cache.put(&binding.doc_key, &paragraph_key, &translated).await {
                warn!("Failed to store translation in cache: {}", e);
            }
        }
        Ok(translated)
    }

    /// Call the engine, backing off and retrying while it reports rate limiting
    async fn call_engine(&self, text: &str) -> Result<String, TranslationError> {
        let mut attempt = 0u32;
        loop {
            self.engine_calls.fetch_add(1, Ordering::Relaxed);
            self.characters.fetch_add(text.chars().count(), Ordering::Relaxed);

            match self
                .engine
                .translate(text, &self.target_language, &self.source_language)
                .await
            {
                Ok(translated) => return Ok(translated),
                Err(e) if self.engine.is_rate_limited(&e) && attempt < self.retry_count => {
                    let delay = self.backoff_delay(attempt);
                    attempt += 1;
                    warn!(
                        "Rate limited by {} (attempt {}/{}), retrying in {:?}",
                        self.engine.id(),
                        attempt,
                        self.retry_count,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Base delay doubled per attempt, plus up to half the base as jitter
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.retry_backoff_ms.saturating_mul(1u64 << attempt.min(16));
        let jitter = if self.retry_backoff_ms > 1 {
            rand::rng().random_range(0..=self.retry_backoff_ms / 2)
        } else {
            0
        };
        Duration::from_millis(base.saturating_add(jitter))
    }
}

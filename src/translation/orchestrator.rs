/*!
 * Document-level translation.
 *
 * `DocumentTranslator` normalizes a document, splits its body into
 * paragraphs and translates them on a bounded pool of tokio tasks. Each
 * paragraph owns its output slot; a paragraph that fails, times out or is
 * still running at the batch deadline keeps its original text. The run
 * always yields a complete document and a summary of what was translated.
 */

use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use log::{error, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use super::cache::{DocumentKeyParts, TranslationCache};
use super::core::TextTranslator;
use super::paragraph::{ParagraphOutcome, ParagraphTranslator};
use crate::app_config::Config;
use crate::errors::{ConfigError, TranslationError};
use crate::language_utils::is_cjk;
use crate::latex::normalize::{
    connect_paragraphs, default_postamble, default_preamble, detect_theorems, insert_packages,
    remove_blank_lines, split_document, Normalizer,
};
use crate::latex::postprocess::finalize;
use crate::latex::protect::{protect, restore_placeholders};
use crate::latex::traversal::{find_targets, splice};
use crate::latex::{Classification, Construct};
use crate::providers::TranslationEngine;

static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n\s*").expect("blank line pattern"));

/// Progress callback: `(finished paragraphs, total paragraphs)`
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// A paragraph that kept its original text, and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParagraphFailure {
    pub index: usize,
    pub reason: String,
}

/// Counts describing how complete a translation run was
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslationSummary {
    pub objects_recovered: usize,
    pub objects_total: usize,
    pub paragraphs_completed: usize,
    pub paragraphs_total: usize,
    pub failures: Vec<ParagraphFailure>,
    pub engine_calls: usize,
    pub characters: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
}

impl TranslationSummary {
    /// Share of paragraphs translated; 1.0 for an empty document
    pub fn completion_ratio(&self) -> f64 {
        if self.paragraphs_total == 0 {
            1.0
        } else {
            self.paragraphs_completed as f64 / self.paragraphs_total as f64
        }
    }

    /// Whether every paragraph and every protected object made it through
    pub fn is_clean(&self) -> bool {
        self.paragraphs_completed == self.paragraphs_total && self.objects_recovered == self.objects_total
    }
}

impl fmt::Display for TranslationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} paragraphs translated ({:.1}%), {}/{} objects recovered, {} engine calls, {} characters, {} cache hits",
            self.paragraphs_completed,
            self.paragraphs_total,
            self.completion_ratio() * 100.0,
            self.objects_recovered,
            self.objects_total,
            self.engine_calls,
            self.characters,
            self.cache_hits
        )
    }
}

/// Translated document and its summary
#[derive(Debug, Clone)]
pub struct TranslationOutput {
    pub text: String,
    pub summary: TranslationSummary,
}

/// A document body cut into paragraphs at blank lines outside markup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParagraphSplit {
    /// Whitespace before the first paragraph
    pub prefix: String,
    pub paragraphs: Vec<String>,
    /// Whitespace following each paragraph
    pub separators: Vec<String>,
}

impl ParagraphSplit {
    /// Rebuild the body from (possibly translated) paragraphs
    pub fn join(&self, paragraphs: &[String]) -> String {
        let mut output = self.prefix.clone();
        for (paragraph, separator) in paragraphs.iter().zip(&self.separators) {
            output.push_str(paragraph);
            output.push_str(separator);
        }
        output
    }
}

/// Split `body` at blank lines, never inside a command, environment or math span
pub fn split_paragraphs(body: &str, classification: &Classification) -> ParagraphSplit {
    let protected = protect(body, classification);
    let surrogate = protected.text.as_str();
    let prefix_len = surrogate.len() - surrogate.trim_start().len();

    let mut split = ParagraphSplit {
        prefix: surrogate[..prefix_len].to_string(),
        paragraphs: Vec::new(),
        separators: Vec::new(),
    };
    let restore = |piece: &str| restore_placeholders(piece, &protected.spans, classification).0;

    // Trailing whitespace of a paragraph travels with its separator
    let mut push = |piece: &str, separator: &str| {
        let content = piece.trim_end();
        split.paragraphs.push(restore(content));
        split.separators.push(format!("{}{}", &piece[content.len()..], separator));
    };

    let mut cursor = prefix_len;
    for separator in BLANK_LINES.find_iter(surrogate) {
        if separator.start() < cursor {
            continue;
        }
        push(&surrogate[cursor..separator.start()], separator.as_str());
        cursor = separator.end();
    }
    if cursor < surrogate.len() {
        push(&surrogate[cursor..], "");
    }
    split
}

/// Translates whole documents
pub struct DocumentTranslator {
    engine: Arc<dyn TranslationEngine>,
    config: Config,
    cache: Option<TranslationCache>,
    progress: Option<ProgressCallback>,
}

impl fmt::Debug for DocumentTranslator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentTranslator")
            .field("engine", &self.engine.id())
            .field("cache", &self.cache.is_some())
            .finish()
    }
}

impl DocumentTranslator {
    /// Create a translator; the configuration is validated before any work starts
    pub fn new(engine: Arc<dyn TranslationEngine>, config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            engine,
            config,
            cache: None,
            progress: None,
        })
    }

    /// Use `cache` for paragraph lookups (when enabled in the configuration)
    pub fn with_cache(mut self, cache: TranslationCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Report finished paragraphs through `callback`
    pub fn with_progress(mut self, callback: impl Fn(usize, usize) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Translate a document whose identity is its own content
    pub async fn translate_document(&self, latex: &str) -> Result<TranslationOutput> {
        self.translate_document_as(latex, None).await
    }

    /// Translate a document. `document_id` (such as its source path) replaces
    /// the content in the cache key, so unchanged paragraphs of an edited
    /// document are still served from the cache.
    pub async fn translate_document_as(&self, latex: &str, document_id: Option<&str>) -> Result<TranslationOutput> {
        let structure = &self.config.structure;
        let normalizer = Normalizer::new(&structure.math_code);
        let normalized = normalizer.normalize(latex);
        let theorems = detect_theorems(&normalized.text);
        let cjk = is_cjk(&self.config.target_language);

        let (preamble, body, postamble) = match split_document(&normalized.text) {
            Some(parts) => {
                info!("Full LaTeX document detected");
                let mut packages = vec!["amsmath"];
                if cjk {
                    packages.push("xeCJK");
                }
                let preamble = insert_packages(&remove_blank_lines(&parts.preamble), &packages);
                (preamble, parts.body, parts.postamble)
            }
            None => {
                info!("Not a full LaTeX document, translating it as a fragment");
                let body = connect_paragraphs(&normalized.text);
                if self.config.runtime.wrap_incomplete {
                    (default_preamble(cjk), body, default_postamble())
                } else {
                    (String::new(), body, String::new())
                }
            }
        };

        let fingerprint = structure.fingerprint();
        let doc_key = TranslationCache::document_key(&DocumentKeyParts {
            content: document_id.unwrap_or(&normalized.text),
            engine: self.engine.id(),
            source_language: &self.config.source_language,
            target_language: &self.config.target_language,
            structure: &fingerprint,
        });

        let mut translator = TextTranslator::new(
            Arc::clone(&self.engine),
            self.config.source_language.clone(),
            self.config.target_language.clone(),
            &self.config.runtime,
            &structure.math_code,
        );
        let cache = self.prepare_cache(&doc_key).await;
        let cache_before = cache.as_ref().map(|c| c.stats()).unwrap_or_default();
        if let Some(cache) = &cache {
            translator = translator.with_cache(cache.clone(), doc_key.clone());
        }

        let classification = Classification::from_structure(structure);
        let paragraph_translator = ParagraphTranslator::new(
            translator,
            classification.clone(),
            structure.walk_constructs(&theorems),
            &self.config.runtime,
        );

        let split = split_paragraphs(&body, &classification);
        let (outcomes, failures) = self.run_workers(&paragraph_translator, &split.paragraphs).await;

        let mut summary = TranslationSummary {
            paragraphs_total: split.paragraphs.len(),
            failures,
            ..TranslationSummary::default()
        };
        let mut translated = Vec::with_capacity(split.paragraphs.len());
        for (original, outcome) in split.paragraphs.iter().zip(outcomes) {
            match outcome {
                Some(outcome) => {
                    summary.paragraphs_completed += 1;
                    summary.objects_recovered += outcome.recovered;
                    summary.objects_total += outcome.total;
                    translated.push(outcome.text);
                }
                None => translated.push(original.clone()),
            }
        }

        let document = format!("{}{}{}", preamble, split.join(&translated), postamble);
        let document = self.translate_titles(&paragraph_translator, &document).await;
        let text = finalize(&document, &normalizer, &normalized);

        let stats = paragraph_translator.translator().stats();
        summary.engine_calls = stats.engine_calls;
        summary.characters = stats.characters;
        if let Some(cache) = &cache {
            let (hits, misses, _) = cache.stats();
            summary.cache_hits = hits - cache_before.0;
            summary.cache_misses = misses - cache_before.1;
        }

        info!("Translation summary: {}", summary);
        Ok(TranslationOutput { text, summary })
    }

    /// Prune and open the cache entry for this run; a broken cache only disables caching
    async fn prepare_cache(&self, doc_key: &str) -> Option<TranslationCache> {
        if !self.config.cache.enabled {
            return None;
        }
        let cache = self.cache.clone()?;
        let prepared = async {
            cache
                .prune(self.config.cache.max_age_days, self.config.cache.max_documents)
                .await?;
            cache.create(doc_key).await
        }
        .await;
        match prepared {
            Ok(()) => Some(cache),
            Err(e) => {
                warn!("Translation cache unavailable, continuing without it: {:#}", e);
                None
            }
        }
    }

    /// Translate paragraphs on a bounded pool; slot `i` always belongs to paragraph `i`
    async fn run_workers(
        &self,
        translator: &ParagraphTranslator,
        paragraphs: &[String],
    ) -> (Vec<Option<ParagraphOutcome>>, Vec<ParagraphFailure>) {
        let total = paragraphs.len();
        let runtime = &self.config.runtime;
        let workers = self.config.worker_count();
        info!("Translating {} paragraphs with {} workers", total, workers);

        let semaphore = Arc::new(Semaphore::new(workers));
        let paragraph_timeout = Duration::from_secs(runtime.paragraph_timeout_secs);
        let timeout_secs = runtime.paragraph_timeout_secs;

        let mut handles = Vec::with_capacity(total);
        let mut pending = FuturesUnordered::new();
        for (index, paragraph) in paragraphs.iter().enumerate() {
            let translator = translator.clone();
            let semaphore = Arc::clone(&semaphore);
            let paragraph = paragraph.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| TranslationError::Worker(e.to_string()))?;
                match tokio::time::timeout(paragraph_timeout, translator.translate_paragraph(&paragraph)).await {
                    Ok(result) => result,
                    Err(_) => Err(TranslationError::Timeout(timeout_secs)),
                }
            });
            handles.push(handle.abort_handle());
            pending.push(async move { (index, handle.await) });
        }

        let deadline = Instant::now() + Duration::from_secs(runtime.batch_timeout_secs + runtime.grace_period_secs);
        let mut slots: Vec<Option<ParagraphOutcome>> = vec![None; total];
        let mut failures = Vec::new();
        let mut finished = 0;

        loop {
            match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some((index, joined))) => {
                    finished += 1;
                    match joined {
                        Ok(Ok(outcome)) => slots[index] = Some(outcome),
                        Ok(Err(e)) => {
                            match &e {
                                TranslationError::Timeout(_) => {
                                    warn!("Paragraph {} timed out, keeping original text", index)
                                }
                                _ => error!("Paragraph {} failed: {}, keeping original text", index, e),
                            }
                            failures.push(ParagraphFailure {
                                index,
                                reason: e.to_string(),
                            });
                        }
                        Err(join_error) => {
                            let e = TranslationError::Worker(join_error.to_string());
                            error!("Paragraph {} failed: {}, keeping original text", index, e);
                            failures.push(ParagraphFailure {
                                index,
                                reason: e.to_string(),
                            });
                        }
                    }
                    if let Some(progress) = &self.progress {
                        progress(finished, total);
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Batch deadline reached with {} paragraphs outstanding, keeping their original text",
                        total - finished
                    );
                    break;
                }
            }
        }

        for handle in &handles {
            handle.abort();
        }
        for (index, slot) in slots.iter().enumerate() {
            if slot.is_none() && !failures.iter().any(|f| f.index == index) {
                failures.push(ParagraphFailure {
                    index,
                    reason: "unfinished at the batch deadline".to_string(),
                });
            }
        }
        failures.sort_by_key(|f| f.index);

        (slots, failures)
    }

    /// Translate `\title` arguments once over the whole reassembled document
    async fn translate_titles(&self, translator: &ParagraphTranslator, document: &str) -> String {
        let title = [Construct::command("title")];
        let targets = find_targets(document, &title, translator.classification());
        if targets.is_empty() {
            return document.to_string();
        }

        let mut replacements = Vec::with_capacity(targets.len());
        for range in &targets {
            let original = &document[range.clone()];
            match translator.translate_text(original).await {
                Ok(outcome) => replacements.push(outcome.text),
                Err(e) => {
                    warn!("Title translation failed: {}, keeping original", e);
                    replacements.push(original.to_string());
                }
            }
        }
        splice(document, &targets, &replacements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockEngine;

    fn fragment_config() -> Config {
        let mut config = Config::default();
        config.runtime.wrap_incomplete = false;
        config.runtime.retry_backoff_ms = 1;
        config
    }

    #[test]
    fn test_splitParagraphs_shouldKeepSeparatorsAndOuterWhitespace() {
        let classification = Classification::default();
        let body = "\nFirst one.\n\nSecond one.\n  \n\nThird.\n";
        let split = split_paragraphs(body, &classification);

        assert_eq!(split.prefix, "\n");
        assert_eq!(split.paragraphs, vec!["First one.", "Second one.", "Third."]);
        assert_eq!(split.separators, vec!["\n\n", "\n  \n\n", "\n"]);
        assert_eq!(split.join(&split.paragraphs), body);
    }

    #[test]
    fn test_splitParagraphs_shouldNotSplitInsideEnvironments() {
        let classification = Classification::default();
        let body = "Intro.\n\n\\begin{itemize}\n\\item A\n\n\\item B\n\\end{itemize}\n\nOutro.";
        let split = split_paragraphs(body, &classification);

        assert_eq!(split.paragraphs.len(), 3);
        assert_eq!(split.paragraphs[1], "\\begin{itemize}\n\\item A\n\n\\item B\n\\end{itemize}");
        assert_eq!(split.join(&split.paragraphs), body);
    }

    #[test]
    fn test_summary_completionRatio() {
        let summary = TranslationSummary {
            paragraphs_completed: 3,
            paragraphs_total: 4,
            ..TranslationSummary::default()
        };
        assert!((summary.completion_ratio() - 0.75).abs() < f64::EPSILON);
        assert!(!summary.is_clean());
        assert!((TranslationSummary::default().completion_ratio() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_new_withMissingCredential_shouldFailFast() {
        let mut config = Config::default();
        config.engine = crate::app_config::EngineKind::DeepL;
        let result = DocumentTranslator::new(Arc::new(MockEngine::identity()), config);
        assert!(matches!(result, Err(ConfigError::MissingCredential { .. })));
    }

    #[tokio::test]
    async fn test_translateDocument_withIdentity_shouldReproduceFragment() {
        let engine = MockEngine::identity();
        let translator = DocumentTranslator::new(Arc::new(engine.clone()), fragment_config()).unwrap();
        let text = "Earlier work \\cite{foo} shows $E=mc^2$.\n\nSecond paragraph with 50\\% rate.";

        let output = translator.translate_document(text).await.unwrap();

        assert_eq!(output.text, text);
        assert_eq!(output.summary.paragraphs_completed, 2);
        assert!(output.summary.is_clean());
    }

    #[tokio::test]
    async fn test_translateDocument_withCompleteDocument_shouldTranslateBodyAndTitleOnly() {
        let engine = MockEngine::tagging("FR");
        let translator = DocumentTranslator::new(Arc::new(engine.clone()), fragment_config()).unwrap();
        let text = "\\documentclass{article}\n\n\\title{My title}\n\\begin{document}\nHello world.\n\\end{document}\n";

        let output = translator.translate_document(text).await.unwrap();

        assert_eq!(
            output.text,
            "\\documentclass{article}\n\\usepackage{amsmath}\n\\usepackage{xeCJK}\n\\title{[FR] My title}\n\\begin{document}\n[FR] Hello world.\n\\end{document}\n"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_translateDocument_withFailingParagraph_shouldKeepOriginal() {
        let engine = MockEngine::fail_on("broken");
        let translator = DocumentTranslator::new(Arc::new(engine), fragment_config()).unwrap();
        let text = "Fine text.\n\nThis one is broken.\n\nMore fine text.";

        let output = translator.translate_document(text).await.unwrap();

        assert_eq!(output.text, text);
        assert_eq!(output.summary.paragraphs_completed, 2);
        assert_eq!(output.summary.failures.len(), 1);
        assert_eq!(output.summary.failures[0].index, 1);
    }

    #[tokio::test]
    async fn test_translateDocument_shouldReportProgress() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let translator = DocumentTranslator::new(Arc::new(MockEngine::identity()), fragment_config())
            .unwrap()
            .with_progress(move |done, total| recorder.lock().push((done, total)));

        translator.translate_document("One.\n\nTwo.").await.unwrap();

        assert_eq!(*seen.lock(), vec![(1, 2), (2, 2)]);
    }
}

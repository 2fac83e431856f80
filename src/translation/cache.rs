/*!
 * Translation caching functionality.
 *
 * Translated paragraphs are persisted in SQLite under a two-level key:
 * a document key covering the normalized content and the run configuration,
 * and a paragraph key covering the exact text sent to the engine. Any change
 * to the run configuration yields a new document key, so stale entries are
 * never reused.
 */

use anyhow::Result;
use log::{debug, info};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::database::models::PruneReport;
use crate::database::{DatabaseConnection, Repository};

/// Everything that identifies a run for caching purposes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentKeyParts<'a> {
    /// Normalized document content, or a caller-chosen document identifier
    pub content: &'a str,
    pub engine: &'a str,
    pub source_language: &'a str,
    pub target_language: &'a str,
    /// Serialized structural configuration
    pub structure: &'a str,
}

/// Persistent translation cache shared by all workers of a run
#[derive(Clone, Debug)]
pub struct TranslationCache {
    repository: Repository,

    /// Writes hold this shared; pruning holds it exclusively
    gate: Arc<RwLock<()>>,

    /// Cache hit counter
    hits: Arc<AtomicUsize>,

    /// Cache miss counter
    misses: Arc<AtomicUsize>,
}

impl TranslationCache {
    /// Create a cache over an existing repository
    pub fn new(repository: Repository) -> Self {
        Self {
            repository,
            gate: Arc::new(RwLock::new(())),
            hits: Arc::new(AtomicUsize::new(0)),
            misses: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Open (or create) the cache database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        let db = DatabaseConnection::new(path)?;
        Ok(Self::new(Repository::new(db)))
    }

    /// Cache backed by an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(Repository::new_in_memory()?))
    }

    /// Digest of the document content and the run configuration
    pub fn document_key(parts: &DocumentKeyParts<'_>) -> String {
        let material = [
            parts.content,
            env!("CARGO_PKG_VERSION"),
            parts.engine,
            parts.source_language,
            parts.target_language,
            parts.structure,
        ]
        .join("\u{1f}");
        Repository::hash_text(&material)
    }

    /// Digest of the exact text submitted to the engine
    pub fn paragraph_key(text: &str) -> String {
        Repository::hash_text(text)
    }

    /// Whether entries exist for this document key
    pub async fn exists(&self, doc_key: &str) -> Result<bool> {
        self.repository.document_exists(doc_key).await
    }

    /// Create the document entry (or refresh its last use) before any put
    pub async fn create(&self, doc_key: &str) -> Result<()> {
        if self.exists(doc_key).await? {
            info!("Cache found for document {}", truncate_text(doc_key, 12));
        }
        let _shared = self.gate.read().await;
        self.repository.touch_document(doc_key).await
    }

    /// Look up a paragraph translation
    pub async fn get(&self, doc_key: &str, paragraph_key: &str) -> Result<Option<String>> {
        let found = self.repository.get_paragraph(doc_key, paragraph_key).await?;
        match found {
            Some(_) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit for paragraph {}", truncate_text(paragraph_key, 12));
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("Cache miss for paragraph {}", truncate_text(paragraph_key, 12));
            }
        }
        Ok(found)
    }

    /// Store a paragraph translation; repeating an identical write is a no-op
    pub async fn put(&self, doc_key: &str, paragraph_key: &str, translated_text: &str) -> Result<()> {
        let _shared = self.gate.read().await;
        self.repository
            .put_paragraph(doc_key, paragraph_key, translated_text)
            .await
    }

    /// Apply the retention policy: drop documents unused for `max_age_days`,
    /// then keep only the `max_documents` most recently used.
    pub async fn prune(&self, max_age_days: u32, max_documents: usize) -> Result<PruneReport> {
        let _exclusive = self.gate.write().await;
        let cutoff = (chrono::Utc::now() - chrono::Duration::days(i64::from(max_age_days))).to_rfc3339();
        let report = self.repository.prune(&cutoff, max_documents).await?;
        if report.total() > 0 {
            info!("Pruned translation cache: {}", report);
        }
        Ok(report)
    }

    /// Get cache statistics: hits, misses and hit rate
    pub fn stats(&self) -> (usize, usize, f64) {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        let hit_rate = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };

        (hits, misses, hit_rate)
    }

    /// Underlying repository
    pub fn repository(&self) -> &Repository {
        &self.repository
    }
}

/// Truncate text to a maximum length with ellipsis
fn truncate_text(text: &str, max_length: usize) -> String {
    match text.char_indices().nth(max_length) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

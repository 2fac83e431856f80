/*!
 * Repository layer for database operations.
 *
 * This module provides a high-level API for the cache tables,
 * abstracting away the SQL details. Operations run on the blocking pool
 * through `spawn_blocking` so a slow disk never stalls the async workers.
 */

use anyhow::Result;
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use super::connection::DatabaseConnection;
use super::models::{DocumentRecord, PruneReport};

/// Repository for database operations
#[derive(Clone, Debug)]
pub struct Repository {
    /// Database connection
    db: DatabaseConnection,
}

impl Repository {
    /// Create a new repository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a repository with an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let db = DatabaseConnection::new_in_memory()?;
        Ok(Self::new(db))
    }

    /// Underlying connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Compute a SHA-256 hex digest of text
    pub fn hash_text(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    // =========================================================================
    // Document Operations
    // =========================================================================

    /// Whether a document entry exists
    pub async fn document_exists(&self, doc_key: &str) -> Result<bool> {
        let doc_key = doc_key.to_string();
        self.db
            .execute_async(move |conn| Self::document_exists_sync(conn, &doc_key))
            .await
    }

    fn document_exists_sync(conn: &Connection, doc_key: &str) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM cache_documents WHERE doc_key = ?1",
                [doc_key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Create a document entry, or mark an existing one as used now
    pub async fn touch_document(&self, doc_key: &str) -> Result<()> {
        let doc_key = doc_key.to_string();
        let now = chrono::Utc::now().to_rfc3339();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO cache_documents (doc_key, created_at, last_used_at)
                    VALUES (?1, ?2, ?2)
                    ON CONFLICT(doc_key) DO UPDATE SET last_used_at = excluded.last_used_at
                    "#,
                    params![doc_key, now],
                )?;
                Ok(())
            })
            .await
    }

    /// Get a document entry
    pub async fn get_document(&self, doc_key: &str) -> Result<Option<DocumentRecord>> {
        let doc_key = doc_key.to_string();

        self.db
            .execute_async(move |conn| {
                let record = conn
                    .query_row(
                        "SELECT doc_key, created_at, last_used_at FROM cache_documents WHERE doc_key = ?1",
                        [&doc_key],
                        |row| {
                            Ok(DocumentRecord {
                                doc_key: row.get(0)?,
                                created_at: row.get(1)?,
                                last_used_at: row.get(2)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(record)
            })
            .await
    }

    /// Set a document's last use time (tests and imports)
    pub async fn set_last_used(&self, doc_key: &str, last_used_at: &str) -> Result<()> {
        let doc_key = doc_key.to_string();
        let last_used_at = last_used_at.to_string();
        self.db
            .execute_async(move |conn| {
                conn.execute(
                    "UPDATE cache_documents SET last_used_at = ?1 WHERE doc_key = ?2",
                    params![last_used_at, doc_key],
                )?;
                Ok(())
            })
            .await
    }

    // =========================================================================
    // Paragraph Operations
    // =========================================================================

    /// Look up a cached paragraph translation
    pub async fn get_paragraph(&self, doc_key: &str, paragraph_key: &str) -> Result<Option<String>> {
        let doc_key = doc_key.to_string();
        let paragraph_key = paragraph_key.to_string();
        self.db
            .execute_async(move |conn| Self::get_paragraph_sync(conn, &doc_key, &paragraph_key))
            .await
    }

    fn get_paragraph_sync(conn: &Connection, doc_key: &str, paragraph_key: &str) -> Result<Option<String>> {
        let text = conn
            .query_row(
                "SELECT translated_text FROM cache_paragraphs WHERE doc_key = ?1 AND paragraph_key = ?2",
                params![doc_key, paragraph_key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(text)
    }

    /// Store a paragraph translation.
    ///
    /// Writing the same text twice leaves the row untouched; writing different
    /// text replaces it.
    pub async fn put_paragraph(&self, doc_key: &str, paragraph_key: &str, translated_text: &str) -> Result<()> {
        let doc_key = doc_key.to_string();
        let paragraph_key = paragraph_key.to_string();
        let translated_text = translated_text.to_string();
        let now = chrono::Utc::now().to_rfc3339();

        self.db
            .execute_async(move |conn| {
                let changed = conn.execute(
                    r#"
                    INSERT INTO cache_paragraphs (doc_key, paragraph_key, translated_text, created_at)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(doc_key, paragraph_key) DO UPDATE SET
                        translated_text = excluded.translated_text,
                        created_at = excluded.created_at
                    WHERE cache_paragraphs.translated_text != excluded.translated_text
                    "#,
                    params![doc_key, paragraph_key, translated_text, now],
                )?;
                if changed == 0 {
                    debug!("Paragraph {} already cached with identical text", &paragraph_key[..8.min(paragraph_key.len())]);
                }
                Ok(())
            })
            .await
    }

    /// Number of cached paragraphs for a document
    pub async fn paragraph_count(&self, doc_key: &str) -> Result<i64> {
        let doc_key = doc_key.to_string();
        self.db
            .execute_async(move |conn| {
                let count = conn.query_row(
                    "SELECT COUNT(*) FROM cache_paragraphs WHERE doc_key = ?1",
                    [&doc_key],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await
    }

    // =========================================================================
    // Retention
    // =========================================================================

    /// Remove documents last used before `cutoff` (RFC 3339), then the least
    /// recently used ones beyond `max_documents`. Paragraphs go with their
    /// document.
    pub async fn prune(&self, cutoff: &str, max_documents: usize) -> Result<PruneReport> {
        let cutoff = cutoff.to_string();

        self.db
            .transaction_async(move |tx| {
                let expired = tx.execute(
                    "DELETE FROM cache_documents WHERE last_used_at < ?1",
                    [&cutoff],
                )?;

                let evicted = tx.execute(
                    r#"
                    DELETE FROM cache_documents WHERE doc_key IN (
                        SELECT doc_key FROM cache_documents
                        ORDER BY last_used_at DESC
                        LIMIT -1 OFFSET ?1
                    )
                    "#,
                    [max_documents as i64],
                )?;

                Ok(PruneReport { expired, evicted })
            })
            .await
    }
}

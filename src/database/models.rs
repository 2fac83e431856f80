/*!
 * Database entity models.
 *
 * These structures map directly to the cache tables.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// A cached document: one row per (content, run configuration) digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// SHA-256 hex digest of content and configuration
    pub doc_key: String,
    /// RFC 3339 creation time
    pub created_at: String,
    /// RFC 3339 time of the last run that used this document
    pub last_used_at: String,
}

/// A cached paragraph translation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParagraphRecord {
    pub doc_key: String,
    /// SHA-256 hex digest of the exact text sent to the engine
    pub paragraph_key: String,
    pub translated_text: String,
    pub created_at: String,
}

/// What a retention sweep removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Documents unused for longer than the age limit
    pub expired: usize,
    /// Least recently used documents beyond the count limit
    pub evicted: usize,
}

impl PruneReport {
    pub fn total(&self) -> usize {
        self.expired + self.evicted
    }
}

impl fmt::Display for PruneReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} expired, {} evicted", self.expired, self.evicted)
    }
}

/*!
 * Database module for persistent storage of translated paragraphs.
 *
 * This module provides SQLite-based persistence for:
 * - Cached documents, addressed by a digest of content and run configuration
 * - Cached paragraph translations, addressed by a digest of the submitted text
 */

pub mod schema;
pub mod connection;
pub mod repository;
pub mod models;

// Re-export main types
pub use connection::DatabaseConnection;
pub use repository::Repository;

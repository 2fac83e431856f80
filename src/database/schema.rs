/*!
 * Database schema definitions and migrations.
 *
 * This module contains the SQL schema for the cache tables
 * and handles schema migrations for version upgrades.
 */

use anyhow::{Context, Result};
use rusqlite::Connection;
use log::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    // Pragmas are per connection, so they are set on every open
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;

    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Initializing database schema v{}", SCHEMA_VERSION);
        create_all_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!(
            "Migrating database schema from v{} to v{}",
            current_version, SCHEMA_VERSION
        );
        migrate_schema(conn, current_version)?;
    } else {
        debug!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get the current schema version from the database
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let table_exists: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |row| row.get(0),
        )
        .context("Failed to check schema_version table existence")?;

    if !table_exists {
        return Ok(0);
    }

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    Ok(version)
}

/// Set the schema version in the database
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version, updated_at) VALUES (1, ?1, datetime('now'))",
        [version],
    )?;
    Ok(())
}

/// Create all database tables
fn create_all_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )?;

    // One row per (document content, run configuration) digest
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS cache_documents (
            doc_key TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            last_used_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_cache_documents_last_used ON cache_documents(last_used_at);
        "#,
    )?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS cache_paragraphs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            doc_key TEXT NOT NULL REFERENCES cache_documents(doc_key) ON DELETE CASCADE,
            paragraph_key TEXT NOT NULL,
            translated_text TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(doc_key, paragraph_key)
        );

        CREATE INDEX IF NOT EXISTS idx_cache_paragraphs_doc ON cache_paragraphs(doc_key);
        "#,
    )?;

    info!("Database schema created successfully");
    Ok(())
}

/// Migrate the schema from one version to another
fn migrate_schema(conn: &Connection, from_version: i32) -> Result<()> {
    let current = from_version;

    if current < SCHEMA_VERSION {
        // No released schema predates v1
        return Err(anyhow::anyhow!(
            "Unknown schema version: {}. Cannot migrate.",
            current
        ));
    }

    set_schema_version(conn, SCHEMA_VERSION)?;
    info!("Schema migration completed to v{}", SCHEMA_VERSION);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn create_test_connection() -> Connection {
        Connection::open_in_memory().expect("Failed to create in-memory database")
    }

    #[test]
    fn test_initializeSchema_withFreshDatabase_shouldCreateAllTables() {
        let conn = create_test_connection();

        initialize_schema(&conn).expect("Failed to initialize schema");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"cache_documents".to_string()));
        assert!(tables.contains(&"cache_paragraphs".to_string()));
        assert!(tables.contains(&"schema_version".to_string()));
    }

    #[test]
    fn test_initializeSchema_calledTwice_shouldBeIdempotent() {
        let conn = create_test_connection();

        initialize_schema(&conn).expect("First initialization failed");
        initialize_schema(&conn).expect("Second initialization failed");

        let version = get_schema_version(&conn).expect("Failed to get version");
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_getSchemaVersion_withFreshDatabase_shouldReturnZero() {
        let conn = create_test_connection();
        let version = get_schema_version(&conn).expect("Failed to get version");
        assert_eq!(version, 0);
    }

    #[test]
    fn test_foreignKeys_shouldRejectOrphanParagraph() {
        let conn = create_test_connection();
        initialize_schema(&conn).expect("Failed to initialize schema");

        let result = conn.execute(
            "INSERT INTO cache_paragraphs (doc_key, paragraph_key, translated_text, created_at)
             VALUES ('missing-doc', 'p', 'text', datetime('now'))",
            [],
        );

        assert!(result.is_err(), "Foreign key constraint should prevent insert");
    }

    #[test]
    fn test_deleteDocument_shouldCascadeToParagraphs() {
        let conn = create_test_connection();
        initialize_schema(&conn).expect("Failed to initialize schema");

        conn.execute_batch(
            "INSERT INTO cache_documents (doc_key, created_at, last_used_at) VALUES ('d', 'now', 'now');
             INSERT INTO cache_paragraphs (doc_key, paragraph_key, translated_text, created_at) VALUES ('d', 'p', 't', 'now');
             DELETE FROM cache_documents WHERE doc_key = 'd';",
        )
        .unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM cache_paragraphs", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}

/*!
 * Common test utilities for the texlate test suite
 */

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use texlate::app_config::Config;
use texlate::providers::mock::MockEngine;
use texlate::translation::DocumentTranslator;

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Configuration for fragment tests: no cache, no skeleton, fast retries
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.source_language = "en".to_string();
    config.target_language = "fr".to_string();
    config.cache.enabled = false;
    config.runtime.wrap_incomplete = false;
    config.runtime.retry_backoff_ms = 1;
    config.runtime.threads = 4;
    config
}

/// Document translator over a mock engine
pub fn document_translator(engine: &MockEngine, config: Config) -> DocumentTranslator {
    DocumentTranslator::new(Arc::new(engine.clone()), config).expect("test config is valid")
}

/// A three-paragraph fragment separated by blank lines
pub fn sample_paragraphs(second: &str) -> String {
    format!(
        "The first paragraph cites \\cite{{a}}.\n\n{}\n\nThe third paragraph has $x^2$ in it.",
        second
    )
}

/// Initialize logging once for tests that want to see it
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/*!
 * Translation engine implementations.
 *
 * This module contains clients for the supported translation services:
 * - Google: free web endpoint, measured in characters
 * - DeepL: credentialed cloud API
 * - OpenAI: chat-completions API (or any compatible server) with prompt templating
 * - Mock: scripted engine for tests
 */

use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

use crate::app_config::{Config, EngineKind};
use crate::errors::{FailureKind, ProviderError};

/// Common trait for all translation engines
///
/// Engines are interchangeable: the orchestrator only needs a call that turns
/// one chunk of text into its translation, plus enough information to size
/// chunks and to decide between retrying and giving up.
#[async_trait]
pub trait TranslationEngine: Send + Sync + Debug {
    /// Short identifier used in cache keys and logs
    fn id(&self) -> &str;

    /// Translate one chunk of text
    ///
    /// # Arguments
    /// * `text` - The text to translate, placeholders included
    /// * `target_language` - Target language code as configured
    /// * `source_language` - Source language code as configured
    async fn translate(
        &self,
        text: &str,
        target_language: &str,
        source_language: &str,
    ) -> Result<String, ProviderError>;

    /// Whether the error means "slow down and try again"
    fn is_rate_limited(&self, error: &ProviderError) -> bool {
        error.kind() == FailureKind::RateLimited
    }

    /// Size of `text` in the unit of `max_unit_size`
    fn measure(&self, text: &str) -> usize {
        text.chars().count()
    }

    /// Largest text (per `measure`) accepted in one call
    fn max_unit_size(&self) -> usize;
}

/// Build the engine selected by the configuration
pub fn create_engine(config: &Config) -> Result<Arc<dyn TranslationEngine>> {
    let engine: Arc<dyn TranslationEngine> = match config.engine {
        EngineKind::Google => Arc::new(google::GoogleEngine::new(&config.engines.google)?),
        EngineKind::DeepL => Arc::new(deepl::DeepLEngine::new(&config.engines.deepl)?),
        EngineKind::OpenAI => Arc::new(openai::OpenAIEngine::new(
            &config.engines.openai,
            &config.structure.math_code,
        )?),
    };
    Ok(engine)
}

/// Read an error response body for inclusion in the error message
pub(crate) async fn error_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to get error response text".to_string())
}

pub mod deepl;
pub mod google;
pub mod mock;
pub mod openai;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_createEngine_shouldHonorEngineKind() {
        let mut config = Config::default();
        assert_eq!(create_engine(&config).unwrap().id(), "google");

        config.engine = EngineKind::DeepL;
        config.engines.deepl.api_key = "key:fx".to_string();
        assert_eq!(create_engine(&config).unwrap().id(), "deepl");

        config.engine = EngineKind::OpenAI;
        config.engines.openai.api_key = "sk-test".to_string();
        assert_eq!(create_engine(&config).unwrap().id(), "openai");
    }
}

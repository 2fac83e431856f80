use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use super::{error_body, TranslationEngine};
use crate::app_config::{EngineKind, GoogleConfig};
use crate::errors::ProviderError;
use crate::language_utils::normalize_for_engine;

/// Client for the free Google web translation endpoint
#[derive(Debug)]
pub struct GoogleEngine {
    /// HTTP client for API requests
    client: Client,
    /// Endpoint URL
    endpoint: Url,
    /// Character limit per request
    max_chars: usize,
}

impl GoogleEngine {
    /// Create a new client from its configuration
    pub fn new(config: &GoogleConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .with_context(|| format!("Invalid Google endpoint: {}", config.endpoint))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint,
            max_chars: config.max_chars_per_request,
        })
    }
}

/// Concatenate the translated segments of a web endpoint response.
///
/// The response is a nested array whose first element lists
/// `[translated, original, ...]` segments.
pub fn parse_response(value: &Value) -> Result<String, ProviderError> {
    let segments = value
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::ParseError("response has no segment list".to_string()))?;

    let mut translated = String::new();
    for segment in segments {
        if let Some(text) = segment.get(0).and_then(Value::as_str) {
            translated.push_str(text);
        }
    }
    Ok(translated)
}

#[async_trait]
impl TranslationEngine for GoogleEngine {
    fn id(&self) -> &str {
        "google"
    }

    async fn translate(
        &self,
        text: &str,
        target_language: &str,
        source_language: &str,
    ) -> Result<String, ProviderError> {
        let target = normalize_for_engine(target_language, EngineKind::Google, true);
        let source = normalize_for_engine(source_language, EngineKind::Google, false);
        debug!("Google request: {} chars, {} -> {}", text.chars().count(), source, target);

        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[
                ("client", "gtx"),
                ("sl", source.as_str()),
                ("tl", target.as_str()),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            error!("Google API error ({}): {}", status, body);
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let value: Value = response.json().await?;
        parse_response(&value)
    }

    fn max_unit_size(&self) -> usize {
        self.max_chars
    }
}

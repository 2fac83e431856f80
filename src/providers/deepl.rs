use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, error};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{error_body, TranslationEngine};
use crate::app_config::{DeepLConfig, EngineKind};
use crate::errors::ProviderError;
use crate::language_utils::normalize_for_engine;

const FREE_ENDPOINT: &str = "https://api-free.deepl.com";
const PRO_ENDPOINT: &str = "https://api.deepl.com";

/// DeepL translate request
#[derive(Debug, Serialize)]
pub struct DeepLRequest {
    /// Texts to translate
    text: Vec<String>,

    /// Target language
    target_lang: String,

    /// Source language; omitted lets the service detect it
    #[serde(skip_serializing_if = "Option::is_none")]
    source_lang: Option<String>,

    /// Keep line breaks and spacing as sent
    preserve_formatting: bool,
}

/// DeepL translate response
#[derive(Debug, Deserialize)]
pub struct DeepLResponse {
    pub translations: Vec<DeepLTranslation>,
}

/// One translated text
#[derive(Debug, Deserialize)]
pub struct DeepLTranslation {
    #[serde(default)]
    pub detected_source_language: Option<String>,
    pub text: String,
}

/// DeepL client
#[derive(Debug)]
pub struct DeepLEngine {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication
    api_key: String,
    /// Base URL without the API path
    endpoint: String,
    /// Character limit per request
    max_chars: usize,
}

/// Free-plan keys end in `:fx` and only work against the free host
pub fn endpoint_for_key(api_key: &str) -> &'static str {
    if api_key.trim().ends_with(":fx") {
        FREE_ENDPOINT
    } else {
        PRO_ENDPOINT
    }
}

impl DeepLEngine {
    /// Create a new client from its configuration
    pub fn new(config: &DeepLConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        let endpoint = if config.endpoint.trim().is_empty() {
            endpoint_for_key(&config.api_key).to_string()
        } else {
            config.endpoint.trim_end_matches('/').to_string()
        };
        Ok(Self {
            client,
            api_key: config.api_key.trim().to_string(),
            endpoint,
            max_chars: config.max_chars_per_request,
        })
    }

    /// Base URL in use
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TranslationEngine for DeepLEngine {
    fn id(&self) -> &str {
        "deepl"
    }

    async fn translate(
        &self,
        text: &str,
        target_language: &str,
        source_language: &str,
    ) -> Result<String, ProviderError> {
        let request = DeepLRequest {
            text: vec![text.to_string()],
            target_lang: normalize_for_engine(target_language, EngineKind::DeepL, true),
            source_lang: Some(normalize_for_engine(source_language, EngineKind::DeepL, false))
                .filter(|s| !s.is_empty()),
            preserve_formatting: true,
        };
        debug!("DeepL request: {} chars -> {}", text.chars().count(), request.target_lang);

        let response = self
            .client
            .post(format!("{}/v2/translate", self.endpoint))
            .header(header::AUTHORIZATION, format!("DeepL-Auth-Key {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            error!("DeepL API error ({}): {}", status, body);
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let parsed: DeepLResponse = response.json().await?;
        parsed
            .translations
            .into_iter()
            .next()
            .map(|t| t.text)
            .ok_or_else(|| ProviderError::ParseError("DeepL returned no translations".to_string()))
    }

    fn max_unit_size(&self) -> usize {
        self.max_chars
    }
}

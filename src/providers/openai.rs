use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, error, warn};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{error_body, TranslationEngine};
use crate::app_config::{EngineKind, OpenAIConfig};
use crate::errors::ProviderError;
use crate::language_utils::normalize_for_engine;
use crate::translation::chunker::{join_chunks, Chunker};

/// Tokens kept free for role markers and other request overhead
const PROMPT_OVERHEAD_TOKENS: usize = 100;

/// Smallest prompt budget left for the text itself
const MIN_TEXT_TOKENS: usize = 64;

/// OpenAI chat completion request
#[derive(Debug, Serialize)]
pub struct OpenAIRequest {
    /// The model to use
    model: String,

    /// The messages for the conversation
    messages: Vec<OpenAIMessage>,

    /// Temperature for generation
    temperature: f32,

    /// Maximum number of tokens to generate
    max_tokens: u32,
}

/// Chat message format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIMessage {
    /// Role of the message sender (system, user, assistant)
    pub role: String,

    /// Content of the message
    pub content: String,
}

/// OpenAI chat completion response
#[derive(Debug, Deserialize)]
pub struct OpenAIResponse {
    pub choices: Vec<OpenAIChoice>,
}

/// Individual completion choice
#[derive(Debug, Deserialize)]
pub struct OpenAIChoice {
    pub message: OpenAIMessage,
}

/// Client for OpenAI-compatible chat completion endpoints
#[derive(Debug)]
pub struct OpenAIEngine {
    /// HTTP client for API requests
    client: Client,
    /// Engine settings
    config: OpenAIConfig,
    /// Splits text that does not fit one prompt
    chunker: Chunker,
    /// Tokens available for the text in one prompt
    text_budget: usize,
}

/// Rough token estimate: four characters per token
pub fn approximate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Fill the prompt template placeholders
pub fn render_prompt(template: &str, source_language: &str, target_language: &str, text: &str) -> String {
    template
        .replace("{source_language}", source_language)
        .replace("{target_language}", target_language)
        .replace("{text}", text)
}

impl OpenAIEngine {
    /// Create a new client; `math_code` is the placeholder stem chunk cuts must respect
    pub fn new(config: &OpenAIConfig, math_code: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        let template_tokens = approximate_tokens(&config.system_prompt)
            + approximate_tokens(&render_prompt(&config.user_prompt, "", "", ""));
        let text_budget = config
            .chunk_size
            .saturating_sub(template_tokens + PROMPT_OVERHEAD_TOKENS)
            .max(MIN_TEXT_TOKENS);

        Ok(Self {
            client,
            config: config.clone(),
            chunker: Chunker::new(math_code),
            text_budget,
        })
    }

    /// Send one prompt and return the completion text
    async fn complete(&self, text: &str, source: &str, target: &str) -> Result<String, ProviderError> {
        let request = OpenAIRequest {
            model: self.config.model.clone(),
            messages: vec![
                OpenAIMessage {
                    role: "system".to_string(),
                    content: self.config.system_prompt.clone(),
                },
                OpenAIMessage {
                    role: "user".to_string(),
                    content: render_prompt(&self.config.user_prompt, source, target, text),
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let api_url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&api_url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.config.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            error!("OpenAI API error ({}): {}", status, body);
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let parsed: OpenAIResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::ParseError("completion has no choices".to_string()))?;
        if content.trim().is_empty() {
            return Err(ProviderError::ParseError("completion is empty".to_string()));
        }
        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl TranslationEngine for OpenAIEngine {
    fn id(&self) -> &str {
        "openai"
    }

    async fn translate(
        &self,
        text: &str,
        target_language: &str,
        source_language: &str,
    ) -> Result<String, ProviderError> {
        let target = normalize_for_engine(target_language, EngineKind::OpenAI, true);
        let source = normalize_for_engine(source_language, EngineKind::OpenAI, false);

        if approximate_tokens(text) <= self.text_budget {
            return self.complete(text, &source, &target).await;
        }

        let chunks = self.chunker.split(text, self.text_budget, approximate_tokens);
        warn!(
            "Text of ~{} tokens exceeds the prompt budget, sending {} chunks",
            approximate_tokens(text),
            chunks.len()
        );
        let mut translated = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            debug!("OpenAI chunk {}/{}", i + 1, chunks.len());
            translated.push(self.complete(&chunk.text, &source, &target).await?);
        }
        Ok(join_chunks(&translated, &chunks))
    }

    fn measure(&self, text: &str) -> usize {
        approximate_tokens(text)
    }

    fn max_unit_size(&self) -> usize {
        self.text_budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renderPrompt_shouldFillPlaceholders() {
        let rendered = render_prompt("{source_language} to {target_language}: {text}", "English", "French", "Hi");
        assert_eq!(rendered, "English to French: Hi");
    }

    #[test]
    fn test_approximateTokens_shouldRoundUp() {
        assert_eq!(approximate_tokens(""), 0);
        assert_eq!(approximate_tokens("abcde"), 2);
        assert_eq!(approximate_tokens("abcd"), 1);
    }

    #[test]
    fn test_new_shouldReserveTemplateTokens() {
        let config = OpenAIConfig {
            chunk_size: 1000,
            system_prompt: "x".repeat(400),
            user_prompt: "{text}".to_string(),
            ..OpenAIConfig::default()
        };
        let engine = OpenAIEngine::new(&config, "XMATHX").unwrap();
        assert_eq!(engine.max_unit_size(), 1000 - 100 - 100);
    }

    #[test]
    fn test_new_withTinyChunkSize_shouldKeepMinimumBudget() {
        let config = OpenAIConfig {
            chunk_size: 10,
            ..OpenAIConfig::default()
        };
        let engine = OpenAIEngine::new(&config, "XMATHX").unwrap();
        assert_eq!(engine.max_unit_size(), MIN_TEXT_TOKENS);
    }

    #[test]
    fn test_measure_withLongCjkRun_shouldSplitWithinBudget() {
        let config = OpenAIConfig {
            chunk_size: 10,
            ..OpenAIConfig::default()
        };
        let engine = OpenAIEngine::new(&config, "XMATHX").unwrap();
        let budget = engine.max_unit_size();
        let text = "这是一个很长的句子，里面有公式XMATHX_0。".repeat(60);
        assert!(engine.measure(&text) > budget);

        let chunks = engine.chunker.split(&text, budget, |chunk| engine.measure(chunk));

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|chunk| engine.measure(&chunk.text) <= budget));
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        assert_eq!(join_chunks(&texts, &chunks), text);
    }

    #[test]
    fn test_isRateLimited_shouldFollowErrorClassification() {
        let engine = OpenAIEngine::new(&OpenAIConfig::default(), "XMATHX").unwrap();
        assert!(engine.is_rate_limited(&ProviderError::from_status(429, "slow down")));
        assert!(!engine.is_rate_limited(&ProviderError::from_status(500, "server error")));
        assert!(!engine.is_rate_limited(&ProviderError::from_status(401, "bad key")));
    }

    #[test]
    fn test_response_shouldDeserialize() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Bonjour"}}]}"#;
        let parsed: OpenAIResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content, "Bonjour");
    }
}

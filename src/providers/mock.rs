/*!
 * Mock engine implementations for testing.
 *
 * This module provides an engine that simulates different behaviors:
 * - `MockEngine::identity()` - Returns the text unchanged
 * - `MockEngine::tagging(tag)` - Prefixes the text with `[tag] `
 * - `MockEngine::failing()` - Always fails with a transient error
 * - `MockEngine::rate_limited_then_ok(n)` - Rate limited for the first n calls
 * - `MockEngine::fail_on(marker)` / `slow_on(marker, ms)` - Misbehaves only for
 *   texts containing a marker
 *
 * Every call is recorded so tests can assert on what reached the engine.
 */

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::ProviderError;
use crate::providers::TranslationEngine;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)XMATHX\s*_\s*\d+").expect("placeholder pattern"));

/// Behavior mode for the mock engine
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Returns the input unchanged
    Identity,
    /// Prefixes the input with `[tag] `
    Tagging(String),
    /// Lowercases everything, placeholders included
    Lowercase,
    /// Always fails with a transient error
    Failing,
    /// Always fails with an authentication error
    Fatal,
    /// Rate limited for the first `failures` calls, identity afterwards
    RateLimitedThenOk { failures: usize },
    /// Sleeps before answering with the identity
    Slow { delay_ms: u64 },
    /// Transient failure for texts containing `marker`, identity otherwise
    FailOn { marker: String },
    /// Sleeps only for texts containing `marker`
    SlowOn { marker: String, delay_ms: u64 },
    /// Deletes every placeholder token from the text
    DropPlaceholders,
}

/// Mock engine for testing translation behavior
#[derive(Debug, Clone)]
pub struct MockEngine {
    /// Behavior mode
    behavior: MockBehavior,
    /// Request counter, shared between clones
    request_count: Arc<AtomicUsize>,
    /// Texts received, in call order
    calls: Arc<Mutex<Vec<String>>>,
    /// Largest accepted unit, in characters
    max_unit_size: usize,
    /// Custom response generator (optional)
    custom_response: Option<fn(&str) -> String>,
}

impl MockEngine {
    /// Create a new mock engine with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(Mutex::new(Vec::new())),
            max_unit_size: 2000,
            custom_response: None,
        }
    }

    pub fn identity() -> Self {
        Self::new(MockBehavior::Identity)
    }

    pub fn tagging(tag: impl Into<String>) -> Self {
        Self::new(MockBehavior::Tagging(tag.into()))
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    pub fn fatal() -> Self {
        Self::new(MockBehavior::Fatal)
    }

    pub fn rate_limited_then_ok(failures: usize) -> Self {
        Self::new(MockBehavior::RateLimitedThenOk { failures })
    }

    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    pub fn fail_on(marker: impl Into<String>) -> Self {
        Self::new(MockBehavior::FailOn { marker: marker.into() })
    }

    pub fn slow_on(marker: impl Into<String>, delay_ms: u64) -> Self {
        Self::new(MockBehavior::SlowOn {
            marker: marker.into(),
            delay_ms,
        })
    }

    /// Set the largest accepted unit
    pub fn with_max_unit_size(mut self, max_unit_size: usize) -> Self {
        self.max_unit_size = max_unit_size;
        self
    }

    /// Set a custom response generator, used instead of the identity
    pub fn with_custom_response(mut self, generator: fn(&str) -> String) -> Self {
        self.custom_response = Some(generator);
        self
    }

    /// Number of calls made so far
    pub fn call_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Texts received so far
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn answer(&self, text: &str) -> String {
        match self.custom_response {
            Some(generator) => generator(text),
            None => text.to_string(),
        }
    }
}

#[async_trait]
impl TranslationEngine for MockEngine {
    fn id(&self) -> &str {
        "mock"
    }

    async fn translate(
        &self,
        text: &str,
        _target_language: &str,
        _source_language: &str,
    ) -> Result<String, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push(text.to_string());

        match &self.behavior {
            MockBehavior::Identity => Ok(self.answer(text)),

            MockBehavior::Tagging(tag) => Ok(format!("[{}] {}", tag, self.answer(text))),

            MockBehavior::Lowercase => Ok(self.answer(text).to_lowercase()),

            MockBehavior::Failing => Err(ProviderError::ApiError {
                message: "Simulated engine failure".to_string(),
                status_code: 500,
            }),

            MockBehavior::Fatal => Err(ProviderError::AuthenticationError("Simulated bad credentials".to_string())),

            MockBehavior::RateLimitedThenOk { failures } => {
                if count < *failures {
                    Err(ProviderError::RateLimitExceeded(format!(
                        "Simulated rate limit (request #{})",
                        count + 1
                    )))
                } else {
                    Ok(self.answer(text))
                }
            }

            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                Ok(self.answer(text))
            }

            MockBehavior::FailOn { marker } => {
                if text.contains(marker.as_str()) {
                    Err(ProviderError::ConnectionError(format!("Simulated failure on '{}'", marker)))
                } else {
                    Ok(self.answer(text))
                }
            }

            MockBehavior::SlowOn { marker, delay_ms } => {
                if text.contains(marker.as_str()) {
                    tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                }
                Ok(self.answer(text))
            }

            MockBehavior::DropPlaceholders => Ok(PLACEHOLDER.replace_all(&self.answer(text), "").into_owned()),
        }
    }

    fn max_unit_size(&self) -> usize {
        self.max_unit_size
    }
}

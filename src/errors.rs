/*!
 * Error types for the texlate application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 */

use thiserror::Error;

/// How the orchestrator should react to an engine failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Back off and retry the same call
    RateLimited,
    /// Give up on the current paragraph, keep its original text
    Transient,
    /// Unrecoverable for this call (bad credentials, quota exhausted)
    Fatal,
}

/// Errors that can occur when working with translation engines
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),
}

impl ProviderError {
    /// Classify the error for retry and fallback decisions
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::RateLimitExceeded(_) => FailureKind::RateLimited,
            Self::ApiError { status_code: 429, .. } => FailureKind::RateLimited,
            Self::AuthenticationError(_) => FailureKind::Fatal,
            Self::ApiError { status_code, .. } if matches!(status_code, 401 | 403 | 456) => {
                FailureKind::Fatal
            }
            _ => FailureKind::Transient,
        }
    }

    /// Build an error from an HTTP status and body
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status_code {
            429 => Self::RateLimitExceeded(message),
            401 | 403 => Self::AuthenticationError(message),
            _ => Self::ApiError { status_code, message },
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() || error.is_connect() {
            Self::ConnectionError(error.to_string())
        } else if error.is_decode() {
            Self::ParseError(error.to_string())
        } else {
            Self::RequestFailed(error.to_string())
        }
    }
}

/// Structural problems found while walking or restoring markup
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LatexError {
    /// A brace or bracket group never closes
    #[error("Unbalanced {delimiter} starting at byte {position}")]
    Unbalanced {
        /// The opening delimiter
        delimiter: char,
        /// Byte offset of the opening delimiter
        position: usize,
    },

    /// `\begin{name}` without its `\end{name}`
    #[error("Environment '{0}' is not closed")]
    UnclosedEnvironment(String),

    /// Placeholders that did not survive translation
    #[error("{bad} of {total} protected objects could not be recovered")]
    PlaceholderMismatch {
        /// Number of spans not cleanly recovered
        bad: usize,
        /// Number of spans extracted
        total: usize,
    },

    /// Nesting deeper than the configured bound
    #[error("Nesting depth {0} exceeds the configured limit")]
    TooDeep(usize),
}

/// Errors that can occur while translating a single paragraph
#[derive(Error, Debug)]
pub enum TranslationError {
    /// Error from the engine
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error while protecting or restoring markup
    #[error("Markup error: {0}")]
    Latex(#[from] LatexError),

    /// The paragraph exceeded its time budget
    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    /// The worker thread died
    #[error("Worker failed: {0}")]
    Worker(String),
}

/// Configuration problems detected before any work starts
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A credential required by the selected engine is empty
    #[error("Missing credential for engine '{engine}': {field}")]
    MissingCredential {
        /// Engine identifier
        engine: String,
        /// Name of the missing field
        field: String,
    },

    /// Unknown language code
    #[error("Invalid language code: {0}")]
    InvalidLanguage(String),

    /// Multi-argument selector outside the argument range
    #[error("Command '{name}' has {arg_count} arguments but selects position {position}")]
    InvalidArgumentPosition {
        /// Command name
        name: String,
        /// Declared argument count
        arg_count: usize,
        /// Offending 1-based position
        position: usize,
    },

    /// Any other invalid value
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from translation
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<ConfigError>() {
            Ok(config_error) => Self::Config(config_error),
            Err(error) => Self::Unknown(error.to_string()),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}

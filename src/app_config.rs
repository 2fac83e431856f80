use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::ConfigError;
use crate::language_utils;
use crate::latex::{
    Construct, BASELINE_COMMANDS, BASELINE_ENVIRONMENTS, DEFAULT_FORMAT_COMMANDS, DEFAULT_MATH_CODE,
    DEFAULT_SKIP_COMMANDS, DEFAULT_SKIP_ENVIRONMENTS,
};

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Source language code (ISO, optionally with a region such as `zh-CN`)
    #[serde(default = "default_source_language")]
    pub source_language: String,

    /// Target language code
    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Active translation engine
    #[serde(default)]
    pub engine: EngineKind,

    /// Per-engine settings
    #[serde(default)]
    pub engines: EnginesConfig,

    /// Which constructs are protected, walked into or stripped
    #[serde(default)]
    pub structure: StructureConfig,

    /// Workers, timeouts and retries
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Translation cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Translation engine type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    // @engine: free Google web endpoint
    #[default]
    Google,
    // @engine: DeepL cloud API
    DeepL,
    // @engine: OpenAI-compatible chat completions
    OpenAI,
}

impl EngineKind {
    // @returns: Capitalized engine name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Google => "Google",
            Self::DeepL => "DeepL",
            Self::OpenAI => "OpenAI",
        }
    }

    // @returns: Lowercase engine identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::Google => "google".to_string(),
            Self::DeepL => "deepl".to_string(),
            Self::OpenAI => "openai".to_string(),
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

impl std::str::FromStr for EngineKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "deepl" => Ok(Self::DeepL),
            "openai" => Ok(Self::OpenAI),
            _ => Err(anyhow!("Invalid engine type: {}", s)),
        }
    }
}

/// Settings for every engine; only the active one is used
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct EnginesConfig {
    #[serde(default)]
    pub google: GoogleConfig,
    #[serde(default)]
    pub deepl: DeepLConfig,
    #[serde(default)]
    pub openai: OpenAIConfig,
}

/// Free Google web endpoint configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GoogleConfig {
    /// Service endpoint URL
    #[serde(default = "default_google_endpoint")]
    pub endpoint: String,

    /// Maximum characters per request
    #[serde(default = "default_google_max_chars")]
    pub max_chars_per_request: usize,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            endpoint: default_google_endpoint(),
            max_chars_per_request: default_google_max_chars(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// DeepL service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DeepLConfig {
    /// API key for the service
    #[serde(default = "String::new")]
    pub api_key: String,

    /// Service endpoint URL. Empty picks the free or pro host from the key.
    #[serde(default = "String::new")]
    pub endpoint: String,

    /// Maximum characters per request
    #[serde(default = "default_deepl_max_chars")]
    pub max_chars_per_request: usize,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DeepLConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: String::new(),
            max_chars_per_request: default_deepl_max_chars(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// OpenAI service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OpenAIConfig {
    /// API key for the service
    #[serde(default = "String::new")]
    pub api_key: String,

    /// Base URL (for Azure OpenAI or any compatible server)
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Model name (e.g., "gpt-4", "gpt-3.5-turbo")
    #[serde(default = "default_openai_model")]
    pub model: String,

    /// Completion token limit
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature parameter for text generation (0.0 to 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Prompt size budget in approximate tokens
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Request timeout in seconds
    #[serde(default = "default_openai_timeout_secs")]
    pub timeout_secs: u64,

    /// System prompt sent with every request
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// User prompt template
    /// Placeholders: {source_language}, {target_language}, {text}
    #[serde(default = "default_user_prompt")]
    pub user_prompt: String,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            chunk_size: default_chunk_size(),
            timeout_secs: default_openai_timeout_secs(),
            system_prompt: default_system_prompt(),
            user_prompt: default_user_prompt(),
        }
    }
}

/// A command with several brace arguments of which only some are prose
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MultiArgCommand {
    // @field: Command name without backslash
    pub name: String,

    // @field: Number of brace arguments the command takes
    pub arg_count: usize,

    // @field: 1-based positions of the arguments to translate
    pub translate_positions: Vec<usize>,
}

/// Structural configuration: what is never exposed and what is always walked into
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StructureConfig {
    /// Placeholder stem
    #[serde(default = "default_math_code")]
    pub math_code: String,

    /// Commands kept verbatim with their arguments
    #[serde(default = "default_skip_commands")]
    pub skip_commands: Vec<String>,

    /// Environments kept verbatim with their bodies
    #[serde(default = "default_skip_environments")]
    pub skip_environments: Vec<String>,

    /// Formatting-only commands unwrapped before protection
    #[serde(default = "default_format_commands")]
    pub format_commands: Vec<String>,

    /// Extra environments whose bodies are translated
    #[serde(default)]
    pub custom_environments: Vec<String>,

    /// Extra commands whose arguments are translated
    #[serde(default)]
    pub custom_commands: Vec<String>,

    /// Commands where only some arguments are translated
    #[serde(default = "default_multi_arg_commands")]
    pub multi_arg_commands: Vec<MultiArgCommand>,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            math_code: default_math_code(),
            skip_commands: default_skip_commands(),
            skip_environments: default_skip_environments(),
            format_commands: default_format_commands(),
            custom_environments: Vec::new(),
            custom_commands: Vec::new(),
            multi_arg_commands: default_multi_arg_commands(),
        }
    }
}

impl StructureConfig {
    /// Stable serialization of the lists, used in cache keys
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Every construct the traversal walks into: the baseline lists, the
    /// detected theorem environments and the custom lists, minus the skip
    /// lists, plus the multi-argument commands.
    pub fn walk_constructs(&self, theorems: &[String]) -> Vec<Construct> {
        let mut constructs: Vec<Construct> = Vec::new();

        let environments = BASELINE_ENVIRONMENTS
            .iter()
            .map(|name| name.to_string())
            .chain(theorems.iter().cloned())
            .chain(self.custom_environments.iter().cloned());
        for name in environments {
            if self.skip_environments.contains(&name)
                || constructs.iter().any(|c| c.name == name && c.kind == crate::latex::ConstructKind::Environment)
            {
                continue;
            }
            constructs.push(Construct::environment(name));
        }

        let multi_arg_names: Vec<&str> = self.multi_arg_commands.iter().map(|c| c.name.as_str()).collect();
        let commands = BASELINE_COMMANDS
            .iter()
            .map(|name| name.to_string())
            .chain(self.custom_commands.iter().cloned());
        for name in commands {
            if self.skip_commands.contains(&name)
                || multi_arg_names.contains(&name.as_str())
                || constructs.iter().any(|c| c.name == name && c.kind == crate::latex::ConstructKind::Command)
            {
                continue;
            }
            constructs.push(Construct::command(name));
        }

        for command in &self.multi_arg_commands {
            if self.skip_commands.contains(&command.name) {
                continue;
            }
            constructs.push(Construct::multi_arg(
                command.name.clone(),
                command.translate_positions.clone(),
            ));
        }

        constructs
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.math_code.is_empty() || !self.math_code.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ConfigError::Invalid(format!(
                "math_code must be non-empty uppercase ASCII, got '{}'",
                self.math_code
            )));
        }
        for command in &self.multi_arg_commands {
            if command.translate_positions.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "Command '{}' selects no argument to translate",
                    command.name
                )));
            }
            if let Some(&position) = command
                .translate_positions
                .iter()
                .find(|&&p| p == 0 || p > command.arg_count)
            {
                return Err(ConfigError::InvalidArgumentPosition {
                    name: command.name.clone(),
                    arg_count: command.arg_count,
                    position,
                });
            }
        }
        Ok(())
    }
}

/// Worker, timeout and retry settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RuntimeConfig {
    /// Worker count; 0 picks the engine's default profile
    #[serde(default)]
    pub threads: usize,

    /// Per-paragraph time budget
    #[serde(default = "default_paragraph_timeout_secs")]
    pub paragraph_timeout_secs: u64,

    /// Whole-batch time budget
    #[serde(default = "default_batch_timeout_secs")]
    pub batch_timeout_secs: u64,

    /// Extra time given to outstanding paragraphs after the batch budget
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,

    /// Retry count for rate-limited requests
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Backoff base for retries (in milliseconds), doubled on each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Share of lost placeholders above which a paragraph counts as failed
    #[serde(default = "default_max_bad_placeholder_ratio")]
    pub max_bad_placeholder_ratio: f64,

    /// Bound on recursive translation of nested groups
    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: usize,

    /// Wrap documents without `\begin{document}` in a default skeleton
    #[serde(default = "default_true")]
    pub wrap_incomplete: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            paragraph_timeout_secs: default_paragraph_timeout_secs(),
            batch_timeout_secs: default_batch_timeout_secs(),
            grace_period_secs: default_grace_period_secs(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_bad_placeholder_ratio: default_max_bad_placeholder_ratio(),
            max_nesting_depth: default_max_nesting_depth(),
            wrap_incomplete: true,
        }
    }
}

/// Translation cache settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    /// Whether translated paragraphs are cached
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Database file; defaults to the user data directory
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Documents kept after pruning, least recently used first out
    #[serde(default = "default_max_documents")]
    pub max_documents: usize,

    /// Documents unused for longer than this are pruned
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            max_documents: default_max_documents(),
            max_age_days: default_max_age_days(),
        }
    }
}

impl CacheConfig {
    /// Database path, configured or default
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => crate::database::DatabaseConnection::default_database_path(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

fn default_source_language() -> String {
    "en".to_string()
}

fn default_target_language() -> String {
    "zh-CN".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_openai_timeout_secs() -> u64 {
    60
}

fn default_google_endpoint() -> String {
    "https://translate.googleapis.com/translate_a/single".to_string()
}

fn default_google_max_chars() -> usize {
    2000
}

fn default_deepl_max_chars() -> usize {
    5000
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_temperature() -> f32 {
    0.3
}

fn default_chunk_size() -> usize {
    3000
}

fn default_system_prompt() -> String {
    "You are a precise academic translator specializing in mathematical and technical documents. \
     Your primary directive is absolute faithfulness to the source text. NEVER add, remove, or modify \
     information that is not explicitly part of the translation process. Preserve all formatting, \
     mathematical notation, and technical terms exactly as written. Your role is translation ONLY, \
     not explanation or elaboration."
        .to_string()
}

fn default_user_prompt() -> String {
    "You are a professional academic translator. Your task is to translate the following text from {source_language} to {target_language}.

CRITICAL REQUIREMENTS:
1. Translate EXACTLY what is provided - DO NOT add any content that is not in the original text
2. DO NOT add explanations, examples, or clarifications that are not in the source
3. DO NOT omit any information from the original text
4. Preserve all LaTeX commands, mathematical formulas, technical notation and tokens such as XMATHX_0 exactly as they appear
5. Maintain the original structure, formatting, and paragraph breaks
6. Translate ONLY the text content, keeping all non-text elements unchanged
7. If you encounter ambiguous terms, choose the most literal translation rather than adding explanatory context

Text to translate:
{text}

Translated text (strictly faithful to original):"
        .to_string()
}

fn default_math_code() -> String {
    DEFAULT_MATH_CODE.to_string()
}

fn default_skip_commands() -> Vec<String> {
    DEFAULT_SKIP_COMMANDS.iter().map(|s| s.to_string()).collect()
}

fn default_skip_environments() -> Vec<String> {
    DEFAULT_SKIP_ENVIRONMENTS.iter().map(|s| s.to_string()).collect()
}

fn default_format_commands() -> Vec<String> {
    DEFAULT_FORMAT_COMMANDS.iter().map(|s| s.to_string()).collect()
}

fn default_multi_arg_commands() -> Vec<MultiArgCommand> {
    vec![
        MultiArgCommand {
            name: "textcolor".to_string(),
            arg_count: 2,
            translate_positions: vec![2],
        },
        // \href{url}{link text}
        MultiArgCommand {
            name: "href".to_string(),
            arg_count: 2,
            translate_positions: vec![2],
        },
    ]
}

fn default_paragraph_timeout_secs() -> u64 {
    180
}

fn default_batch_timeout_secs() -> u64 {
    600
}

fn default_grace_period_secs() -> u64 {
    10
}

fn default_retry_count() -> u32 {
    3 // Default to 3 retries
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_max_bad_placeholder_ratio() -> f64 {
    0.5
}

fn default_max_nesting_depth() -> usize {
    8
}

fn default_max_documents() -> usize {
    200
}

fn default_max_age_days() -> u32 {
    30
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        for code in [&self.source_language, &self.target_language] {
            if language_utils::validate_language_code(code).is_err() {
                return Err(ConfigError::InvalidLanguage(code.clone()));
            }
        }

        match self.engine {
            EngineKind::DeepL if self.engines.deepl.api_key.trim().is_empty() => {
                return Err(ConfigError::MissingCredential {
                    engine: self.engine.to_lowercase_string(),
                    field: "engines.deepl.api_key".to_string(),
                });
            }
            EngineKind::OpenAI if self.engines.openai.api_key.trim().is_empty() => {
                return Err(ConfigError::MissingCredential {
                    engine: self.engine.to_lowercase_string(),
                    field: "engines.openai.api_key".to_string(),
                });
            }
            _ => {}
        }

        if self.runtime.paragraph_timeout_secs == 0 || self.runtime.batch_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.runtime.max_bad_placeholder_ratio) {
            return Err(ConfigError::Invalid(format!(
                "max_bad_placeholder_ratio must lie in [0, 1], got {}",
                self.runtime.max_bad_placeholder_ratio
            )));
        }

        self.structure.validate()
    }

    /// Load configuration from a JSON file, writing defaults first if it does not exist
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("Config file {} not found, creating it with defaults", path.display());
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Append multi-argument commands from a separate JSON commands file
    pub fn load_commands_file(&mut self, path: &Path) -> Result<usize> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read commands file: {}", path.display()))?;
        let commands: Vec<MultiArgCommand> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse commands file: {}", path.display()))?;
        let count = commands.len();
        for command in commands {
            if self.structure.multi_arg_commands.iter().any(|c| c.name == command.name) {
                warn!("Command '{}' from {} overrides the configured one", command.name, path.display());
                self.structure.multi_arg_commands.retain(|c| c.name != command.name);
            }
            self.structure.multi_arg_commands.push(command);
        }
        Ok(count)
    }

    /// Worker count for the active engine
    pub fn worker_count(&self) -> usize {
        crate::translation::concurrency::EngineProfile::for_engine(self.engine)
            .resolve_workers(self.runtime.threads)
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: default_source_language(),
            target_language: default_target_language(),
            engine: EngineKind::default(),
            engines: EnginesConfig::default(),
            structure: StructureConfig::default(),
            runtime: RuntimeConfig::default(),
            cache: CacheConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}

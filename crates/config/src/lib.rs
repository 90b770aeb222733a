//! Configuration loading, validation, and management for askgate.
//!
//! Loads configuration from `~/.askgate/config.toml` (or `$ASKGATE_CONFIG`)
//! with environment variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.askgate/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP surface
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Service-account credentials for the completion API
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Upstream completion endpoint and generation parameters
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Screening collaborators
    #[serde(default)]
    pub safety: SafetyConfig,

    /// Document retrieval collaborator
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Prompt assembly
    #[serde(default)]
    pub context: ContextConfig,

    /// Conversation store
    #[serde(default)]
    pub memory: MemoryConfig,
}

fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,

    #[serde(default = "default_history_limit")]
    pub history_default_limit: usize,

    #[serde(default = "default_history_max_limit")]
    pub history_max_limit: usize,

    /// Origins allowed by CORS. Empty = same-origin only.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_port() -> u16 {
    8080
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_body_limit() -> usize {
    1024 * 1024
}
fn default_history_limit() -> usize {
    20
}
fn default_history_max_limit() -> usize {
    100
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            body_limit_bytes: default_body_limit(),
            history_default_limit: default_history_limit(),
            history_max_limit: default_history_max_limit(),
            cors_origins: vec![],
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Token exchange endpoint
    #[serde(default = "default_issuer_url")]
    pub issuer_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,

    /// Assertion signing key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_key: Option<String>,

    /// Lifetime of the self-signed assertion
    #[serde(default = "default_assertion_ttl")]
    pub assertion_ttl_secs: u64,

    /// A cached token is refreshed this long before it expires (min 60)
    #[serde(default = "default_safety_margin")]
    pub safety_margin_secs: u64,

    #[serde(default = "default_issuer_timeout")]
    pub timeout_secs: u64,
}

fn default_issuer_url() -> String {
    "https://iam.api.cloud.yandex.net/iam/v1/tokens".into()
}
fn default_assertion_ttl() -> u64 {
    360
}
fn default_safety_margin() -> u64 {
    60
}
fn default_issuer_timeout() -> u64 {
    10
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            issuer_url: default_issuer_url(),
            service_account_id: None,
            key_id: None,
            signing_key: None,
            assertion_ttl_secs: default_assertion_ttl(),
            safety_margin_secs: default_safety_margin(),
            timeout_secs: default_issuer_timeout(),
        }
    }
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("issuer_url", &self.issuer_url)
            .field("service_account_id", &self.service_account_id)
            .field("key_id", &self.key_id)
            .field("signing_key", &redact(&self.signing_key))
            .field("assertion_ttl_secs", &self.assertion_ttl_secs)
            .field("safety_margin_secs", &self.safety_margin_secs)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl CredentialsConfig {
    /// Service account, key id, and signing key are all present.
    pub fn is_configured(&self) -> bool {
        [&self.service_account_id, &self.key_id, &self.signing_key]
            .iter()
            .all(|v| v.as_deref().is_some_and(|s| !s.is_empty()))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Wire format: "foundation" or "openai"
    #[serde(default = "default_backend")]
    pub backend: String,

    #[serde(default = "default_completion_url")]
    pub api_url: String,

    /// Folder (project) the model is billed to; foundation backend only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,

    /// Static API key; openai backend only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_backend() -> String {
    "foundation".into()
}
fn default_completion_url() -> String {
    "https://llm.api.cloud.yandex.net/foundationModels/v1/completion".into()
}
fn default_model() -> String {
    "yandexgpt-lite".into()
}
fn default_temperature() -> f32 {
    0.6
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_completion_timeout() -> u64 {
    30
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            api_url: default_completion_url(),
            folder_id: None,
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_completion_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

impl std::fmt::Debug for CompletionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionConfig")
            .field("backend", &self.backend)
            .field("api_url", &self.api_url)
            .field("folder_id", &self.folder_id)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Bounded retry for the completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_retryable_statuses")]
    pub retryable_statuses: Vec<u16>,
}

fn default_max_attempts() -> u32 {
    2
}
fn default_initial_backoff() -> u64 {
    300
}
fn default_max_backoff() -> u64 {
    2000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_retryable_statuses() -> Vec<u16> {
    vec![429, 500, 502, 503, 504]
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            backoff_multiplier: default_multiplier(),
            retryable_statuses: default_retryable_statuses(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// "http" (security service) or "builtin" (in-process patterns)
    #[serde(default = "default_detector")]
    pub detector: String,

    #[serde(default = "default_detector_url")]
    pub detector_url: String,

    #[serde(default = "default_detector_timeout")]
    pub detector_timeout_secs: u64,

    #[serde(default = "default_moderator_url")]
    pub moderator_url: String,

    #[serde(default = "default_moderator_timeout")]
    pub moderator_timeout_secs: u64,

    /// Fixed reply for blocked questions
    #[serde(default = "default_blocked_message")]
    pub blocked_message: String,
}

fn default_detector() -> String {
    "http".into()
}
fn default_detector_url() -> String {
    "http://security-svc:8080".into()
}
fn default_detector_timeout() -> u64 {
    5
}
fn default_moderator_url() -> String {
    "http://moderation-svc:8080".into()
}
fn default_moderator_timeout() -> u64 {
    15
}
fn default_blocked_message() -> String {
    "Your request cannot be processed because it violates the usage rules.".into()
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            detector: default_detector(),
            detector_url: default_detector_url(),
            detector_timeout_secs: default_detector_timeout(),
            moderator_url: default_moderator_url(),
            moderator_timeout_secs: default_moderator_timeout(),
            blocked_message: default_blocked_message(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_retrieval_url")]
    pub url: String,

    /// Passages requested per question
    #[serde(default = "default_k")]
    pub k: usize,

    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    #[serde(default = "default_retrieval_timeout")]
    pub timeout_secs: u64,
}

fn default_retrieval_url() -> String {
    "http://rag-svc:8080".into()
}
fn default_k() -> usize {
    4
}
fn default_max_chars() -> usize {
    2500
}
fn default_retrieval_timeout() -> u64 {
    20
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            url: default_retrieval_url(),
            k: default_k(),
            max_chars: default_max_chars(),
            timeout_secs: default_retrieval_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Static policy instructions sent as the first prompt segment
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Longer questions are truncated, not rejected
    #[serde(default = "default_max_question_chars")]
    pub max_question_chars: usize,

    /// Most recent turns (user + assistant) included as history
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,

    /// Include history at all
    #[serde(default = "default_true")]
    pub include_history: bool,
}

fn default_system_prompt() -> String {
    "You are a corporate assistant. Answer strictly from the provided documents and \
     conversation history. If the documents contain no information on the question, \
     answer briefly: 'The documents do not say.' If only part of the answer is in the \
     documents, answer with that part only. Never invent facts outside the context."
        .into()
}
fn default_max_question_chars() -> usize {
    4000
}
fn default_history_turns() -> usize {
    10
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            max_question_chars: default_max_question_chars(),
            history_turns: default_history_turns(),
            include_history: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "sqlite" or "in_memory"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// SQLite database file; relative paths resolve against the config dir
    #[serde(default = "default_memory_path")]
    pub path: String,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_memory_backend() -> String {
    "sqlite".into()
}
fn default_memory_path() -> String {
    "history.db".into()
}
fn default_retention_days() -> u32 {
    7
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            path: default_memory_path(),
            retention_days: default_retention_days(),
        }
    }
}

impl MemoryConfig {
    /// Absolute database path.
    pub fn resolved_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.path);
        if path.is_absolute() {
            path
        } else {
            AppConfig::config_dir().join(path)
        }
    }
}

/// Upper bound for `credentials.safety_margin_secs` (one day).
pub const MAX_SAFETY_MARGIN_SECS: u64 = 86_400;
/// Upper bound for `credentials.assertion_ttl_secs` (one hour).
pub const MAX_ASSERTION_TTL_SECS: u64 = 3_600;
/// Upper bound for `memory.retention_days` (about a century).
pub const MAX_RETENTION_DAYS: u32 = 36_500;

/// Statuses worth retrying: rate limiting and server errors.
pub fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

impl AppConfig {
    /// Load configuration from `$ASKGATE_CONFIG` or `~/.askgate/config.toml`.
    ///
    /// Environment variables override file values:
    /// - `ASKGATE_SERVICE_ACCOUNT_ID`, `ASKGATE_KEY_ID`, `ASKGATE_SIGNING_KEY`
    /// - `ASKGATE_FOLDER_ID`
    /// - `ASKGATE_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

        if let Some(v) = env("ASKGATE_SERVICE_ACCOUNT_ID") {
            self.credentials.service_account_id = Some(v);
        }
        if let Some(v) = env("ASKGATE_KEY_ID") {
            self.credentials.key_id = Some(v);
        }
        if let Some(v) = env("ASKGATE_SIGNING_KEY") {
            // Keys pasted into env files often carry literal "\n".
            self.credentials.signing_key = Some(v.replace("\\n", "\n"));
        }
        if let Some(v) = env("ASKGATE_FOLDER_ID") {
            self.completion.folder_id = Some(v);
        }
        if let Some(v) = env("ASKGATE_API_KEY") {
            self.completion.api_key = Some(v);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".askgate")
    }

    /// The config file location.
    pub fn config_path() -> PathBuf {
        std::env::var("ASKGATE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.completion;
        if !(0.0..=2.0).contains(&c.temperature) {
            return Err(ConfigError::ValidationError(
                "completion.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "completion.max_tokens must be > 0".into(),
            ));
        }
        if !(1..=5).contains(&c.retry.max_attempts) {
            return Err(ConfigError::ValidationError(
                "completion.retry.max_attempts must be between 1 and 5".into(),
            ));
        }
        if let Some(status) = c
            .retry
            .retryable_statuses
            .iter()
            .find(|s| !is_transient_status(**s))
        {
            return Err(ConfigError::ValidationError(format!(
                "completion.retry.retryable_statuses may only hold 429 and 5xx, got {status}"
            )));
        }
        if !matches!(c.backend.as_str(), "foundation" | "openai") {
            return Err(ConfigError::ValidationError(format!(
                "completion.backend must be \"foundation\" or \"openai\", got \"{}\"",
                c.backend
            )));
        }
        if !(60..=MAX_SAFETY_MARGIN_SECS).contains(&self.credentials.safety_margin_secs) {
            return Err(ConfigError::ValidationError(format!(
                "credentials.safety_margin_secs must be between 60 and {MAX_SAFETY_MARGIN_SECS}"
            )));
        }
        if !(1..=MAX_ASSERTION_TTL_SECS).contains(&self.credentials.assertion_ttl_secs) {
            return Err(ConfigError::ValidationError(format!(
                "credentials.assertion_ttl_secs must be between 1 and {MAX_ASSERTION_TTL_SECS}"
            )));
        }
        if !matches!(self.safety.detector.as_str(), "http" | "builtin") {
            return Err(ConfigError::ValidationError(format!(
                "safety.detector must be \"http\" or \"builtin\", got \"{}\"",
                self.safety.detector
            )));
        }
        if self.gateway.history_default_limit == 0
            || self.gateway.history_default_limit > self.gateway.history_max_limit
        {
            return Err(ConfigError::ValidationError(
                "gateway.history_default_limit must be in 1..=history_max_limit".into(),
            ));
        }
        if !(1..=MAX_RETENTION_DAYS).contains(&self.memory.retention_days) {
            return Err(ConfigError::ValidationError(format!(
                "memory.retention_days must be between 1 and {MAX_RETENTION_DAYS}"
            )));
        }
        if !matches!(self.memory.backend.as_str(), "sqlite" | "in_memory") {
            return Err(ConfigError::ValidationError(format!(
                "memory.backend must be \"sqlite\" or \"in_memory\", got \"{}\"",
                self.memory.backend
            )));
        }
        if self.context.max_question_chars == 0 {
            return Err(ConfigError::ValidationError(
                "context.max_question_chars must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Whether the completion API can be authenticated.
    pub fn has_credentials(&self) -> bool {
        match self.completion.backend.as_str() {
            "openai" => self.completion.api_key.is_some(),
            _ => self.credentials.is_configured(),
        }
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

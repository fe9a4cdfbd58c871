//! Configuration loading, validation, and management for FinMentor.
//!
//! Loads configuration from `~/.finmentor/config.toml` (or the file named by
//! `FINMENTOR_CONFIG`) with environment variable overrides. Validates all
//! settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.finmentor/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// The single active LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Locale used when a request names none or an unknown one
    #[serde(default = "default_locale")]
    pub default_locale: String,

    /// External call settings
    #[serde(default)]
    pub provider: ProviderCallConfig,

    /// Rate and budget guard
    #[serde(default)]
    pub guard: GuardConfig,

    /// Context window management
    #[serde(default)]
    pub context: ContextConfig,

    /// Response cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Variable reward pre-step
    #[serde(default)]
    pub reward: RewardConfig,

    /// Persistence backend
    #[serde(default)]
    pub store: StoreConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "gemini".into()
}
fn default_model() -> String {
    "gemini-1.5-flash".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_locale() -> String {
    "vi".into()
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

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("default_locale", &self.default_locale)
            .field("provider", &self.provider)
            .field("guard", &self.guard)
            .field("context", &self.context)
            .field("cache", &self.cache)
            .field("reward", &self.reward)
            .field("store", &self.store)
            .field("gateway", &self.gateway)
            .field("providers", &self.providers)
            .finish()
    }
}

/// Per-provider overrides, keyed by provider name.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Settings applied to every external call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCallConfig {
    /// Hard timeout; an expired call counts as a failed call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ProviderCallConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Sliding-window rate limit and monthly token budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    #[serde(default = "default_max_calls")]
    pub max_calls_per_window: u64,

    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    #[serde(default = "default_monthly_budget")]
    pub monthly_token_budget: u64,

    /// Serialize check-and-record per user to close the check-then-act race
    #[serde(default)]
    pub serialize_per_user: bool,
}

fn default_max_calls() -> u64 {
    20
}
fn default_window_secs() -> u64 {
    60
}
fn default_monthly_budget() -> u64 {
    50_000
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_calls_per_window: default_max_calls(),
            window_secs: default_window_secs(),
            monthly_token_budget: default_monthly_budget(),
            serialize_per_user: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Summarize once a thread's unsummarized history exceeds this many messages
    #[serde(default = "default_summarize_threshold")]
    pub summarize_threshold: usize,

    /// Most recent messages always kept verbatim
    #[serde(default = "default_retained_tail")]
    pub retained_tail: usize,
}

fn default_summarize_threshold() -> usize {
    12
}
fn default_retained_tail() -> usize {
    8
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            summarize_threshold: default_summarize_threshold(),
            retained_tail: default_retained_tail(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    #[serde(default = "default_cache_entries")]
    pub max_entries: usize,
}

fn default_cache_ttl() -> u64 {
    86_400
}
fn default_cache_entries() -> usize {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_cache_ttl(),
            max_entries: default_cache_entries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Chance of a grant per turn, 0.0 to 1.0
    #[serde(default = "default_reward_probability")]
    pub probability: f64,

    #[serde(default = "default_reward_min")]
    pub min_points: u32,

    #[serde(default = "default_reward_max")]
    pub max_points: u32,
}

fn default_reward_probability() -> f64 {
    0.1
}
fn default_reward_min() -> u32 {
    10
}
fn default_reward_max() -> u32 {
    50
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            probability: default_reward_probability(),
            min_points: default_reward_min(),
            max_points: default_reward_max(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "memory" or "sqlite"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// SQLite database file; defaults to `~/.finmentor/finmentor.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_store_backend() -> String {
    "sqlite".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

impl StoreConfig {
    /// Resolved database path.
    pub fn database_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("finmentor.db"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    42618
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.finmentor/config.toml).
    ///
    /// `FINMENTOR_CONFIG` names an alternative file. API keys are also read
    /// from the environment:
    /// - `FINMENTOR_API_KEY` (highest priority)
    /// - `GEMINI_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("FINMENTOR_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"));
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("FINMENTOR_API_KEY")
                .ok()
                .or_else(|| std::env::var("GEMINI_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("FINMENTOR_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("FINMENTOR_MODEL") {
            config.default_model = model;
        }

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

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".finmentor")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.provider.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "provider.timeout_secs must be > 0".into(),
            ));
        }

        if self.guard.window_secs == 0 || self.guard.window_secs > MAX_DURATION_SECS {
            return Err(ConfigError::ValidationError(format!(
                "guard.window_secs must be between 1 and {MAX_DURATION_SECS}"
            )));
        }

        if self.cache.ttl_secs > MAX_DURATION_SECS {
            return Err(ConfigError::ValidationError(format!(
                "cache.ttl_secs must not exceed {MAX_DURATION_SECS}"
            )));
        }

        if self.context.retained_tail >= self.context.summarize_threshold {
            return Err(ConfigError::ValidationError(
                "context.retained_tail must be smaller than context.summarize_threshold".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.reward.probability) {
            return Err(ConfigError::ValidationError(
                "reward.probability must be between 0.0 and 1.0".into(),
            ));
        }

        if self.reward.min_points > self.reward.max_points {
            return Err(ConfigError::ValidationError(
                "reward.min_points must not exceed reward.max_points".into(),
            ));
        }

        match self.store.backend.as_str() {
            "memory" | "sqlite" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "unknown store.backend '{other}' (expected 'memory' or 'sqlite')"
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
            || self
                .providers
                .get(&self.default_provider)
                .is_some_and(|p| p.api_key.is_some())
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            default_locale: default_locale(),
            provider: ProviderCallConfig::default(),
            guard: GuardConfig::default(),
            context: ContextConfig::default(),
            cache: CacheConfig::default(),
            reward: RewardConfig::default(),
            store: StoreConfig::default(),
            gateway: GatewayConfig::default(),
            providers: HashMap::new(),
        }
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

/// Longest accepted rate window or cache TTL: one year.
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "gemini");
        assert_eq!(config.guard.max_calls_per_window, 20);
        assert_eq!(config.guard.window_secs, 60);
        assert_eq!(config.guard.monthly_token_budget, 50_000);
        assert_eq!(config.context.summarize_threshold, 12);
        assert_eq!(config.cache.ttl_secs, 86_400);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.gateway.port, config.gateway.port);
        assert_eq!(parsed.context.retained_tail, config.context.retained_tail);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn tail_must_be_below_threshold() {
        let config = AppConfig {
            context: ContextConfig {
                summarize_threshold: 6,
                retained_tail: 6,
            },
            ..AppConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("retained_tail"));
    }

    #[test]
    fn window_and_ttl_are_bounded() {
        let mut config = AppConfig::default();
        config.guard.window_secs = 10_000_000_000_000_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("guard.window_secs"));

        config.guard.window_secs = MAX_DURATION_SECS;
        assert!(config.validate().is_ok());

        config.cache.ttl_secs = u64::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cache.ttl_secs"));

        config.cache.ttl_secs = MAX_DURATION_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_store_backend_rejected() {
        let mut config = AppConfig::default();
        config.store.backend = "redis".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        let config = result.unwrap();
        assert_eq!(config.default_provider, "gemini");
    }

    #[test]
    fn partial_file_keeps_section_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
default_provider = "openai"

[guard]
max_calls_per_window = 5

[store]
backend = "memory"

[providers.openai]
api_key = "sk-test"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.default_provider, "openai");
        assert_eq!(config.guard.max_calls_per_window, 5);
        assert_eq!(config.guard.monthly_token_budget, 50_000);
        assert_eq!(config.store.backend, "memory");
        assert!(config.has_api_key());
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_provider = [").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn debug_output_redacts_keys() {
        let mut config = AppConfig {
            api_key: Some("secret-key".into()),
            ..AppConfig::default()
        };
        config.providers.insert(
            "openai".into(),
            ProviderConfig {
                api_key: Some("sk-other".into()),
                api_url: None,
                default_model: None,
            },
        );
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-key"));
        assert!(!debug.contains("sk-other"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gemini"));
        assert!(toml_str.contains("monthly_token_budget"));
    }
}

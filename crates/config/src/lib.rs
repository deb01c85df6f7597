//! Configuration loading, validation, and management for HemoBank.
//!
//! Loads configuration from `~/.hemobank/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use hemobank_core::RefillPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.hemobank/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the classifier provider (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Intent classifier settings
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Persistence backend
    #[serde(default)]
    pub store: StoreConfig,

    /// Daily assignment scheduler
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Defaults applied at registration time
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

fn default_true() -> bool {
    true
}

/// Redact a secret for Debug output.
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
            .field("classifier", &self.classifier)
            .field("providers", &self.providers)
            .field("store", &self.store)
            .field("scheduler", &self.scheduler)
            .field("defaults", &self.defaults)
            .finish()
    }
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

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: f32,

    /// Upper bound on one classification call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// History entries kept per session (user + model turns)
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

fn default_provider() -> String {
    "gemini".into()
}
fn default_model() -> String {
    "gemini-1.5-flash".into()
}
fn default_timeout_secs() -> u64 {
    20
}
fn default_max_history() -> usize {
    20
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            temperature: 0.0,
            timeout_secs: default_timeout_secs(),
            max_history: default_max_history(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// SQLite database file
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    AppConfig::config_dir().join("hemobank.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cron expression (5-field: minute hour dom month dow)
    #[serde(default = "default_schedule")]
    pub schedule: String,

    /// Receivers due within this many days of the cycle date are served
    #[serde(default = "default_lookahead_days")]
    pub lookahead_days: u32,

    #[serde(default)]
    pub refill: RefillPolicy,

    #[serde(default = "default_max_parallel_cities")]
    pub max_parallel_cities: usize,
}

fn default_schedule() -> String {
    "0 1 * * *".into()
}
fn default_lookahead_days() -> u32 {
    1
}
fn default_max_parallel_cities() -> usize {
    4
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule: default_schedule(),
            lookahead_days: default_lookahead_days(),
            refill: RefillPolicy::default(),
            max_parallel_cities: default_max_parallel_cities(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_donation_interval")]
    pub donation_interval_days: u32,

    #[serde(default = "default_transfusion_interval")]
    pub transfusion_interval_days: u32,

    #[serde(default = "default_required_units")]
    pub required_units: u32,
}

fn default_donation_interval() -> u32 {
    hemobank_core::people::DEFAULT_DONATION_INTERVAL_DAYS
}
fn default_transfusion_interval() -> u32 {
    hemobank_core::people::DEFAULT_TRANSFUSION_INTERVAL_DAYS
}
fn default_required_units() -> u32 {
    1
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            donation_interval_days: default_donation_interval(),
            transfusion_interval_days: default_transfusion_interval(),
            required_units: default_required_units(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.hemobank/config.toml).
    ///
    /// Also checks environment variables:
    /// - `HEMOBANK_API_KEY`, `GEMINI_API_KEY`, `OPENAI_API_KEY` (in that order)
    /// - `HEMOBANK_MODEL` overrides the classifier model
    /// - `HEMOBANK_DB` overrides the SQLite path
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("HEMOBANK_API_KEY")
                .ok()
                .or_else(|| std::env::var("GEMINI_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("HEMOBANK_MODEL") {
            config.classifier.model = model;
        }

        if let Ok(path) = std::env::var("HEMOBANK_DB") {
            config.store.path = PathBuf::from(path);
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
        dirs_home().join(".hemobank")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.classifier.temperature) {
            return Err(ConfigError::ValidationError(
                "classifier.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.classifier.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "classifier.timeout_secs must be > 0".into(),
            ));
        }

        if self.classifier.max_history == 0 {
            return Err(ConfigError::ValidationError(
                "classifier.max_history must be > 0".into(),
            ));
        }

        if self.scheduler.schedule.split_whitespace().count() != 5 {
            return Err(ConfigError::ValidationError(
                "scheduler.schedule must have 5 fields (minute hour dom month dow)".into(),
            ));
        }

        if self.scheduler.max_parallel_cities == 0 {
            return Err(ConfigError::ValidationError(
                "scheduler.max_parallel_cities must be > 0".into(),
            ));
        }

        if self.defaults.required_units == 0 {
            return Err(ConfigError::ValidationError(
                "defaults.required_units must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
            || self
                .providers
                .get(&self.classifier.provider)
                .is_some_and(|p| p.api_key.is_some())
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            classifier: ClassifierConfig::default(),
            providers: HashMap::new(),
            store: StoreConfig::default(),
            scheduler: SchedulerConfig::default(),
            defaults: DefaultsConfig::default(),
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

//! TOML Configuration File Support
//!
//! Centralized configuration loading for the capture subsystem, from a TOML
//! file at `~/.config/netcapture/capture.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [capture]
//! enabled = true
//! max_records = 100
//! max_body_capture_bytes = 1048576
//! body_preview_chars = 10000
//!
//! [transport]
//! timeout_secs = 60
//! connect_timeout_secs = 10
//! user_agent = "netcapture/0.1"
//! event_buffer = 64
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::DEFAULT_BODY_PREVIEW_CHARS;
use crate::store::DEFAULT_MAX_RECORDS;

/// Default ceiling on bytes accumulated per captured body
pub const DEFAULT_MAX_BODY_CAPTURE_BYTES: usize = 1024 * 1024;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// Resolved Settings
// =============================================================================

/// Settings for the capture layer and its store
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Whether capture starts enabled
    pub enabled: bool,
    /// Records retained by the store
    pub max_records: usize,
    /// Bytes of each body kept on a record; the caller always gets all of it
    pub max_body_capture_bytes: usize,
    /// Character ceiling for rendered bodies
    pub body_preview_chars: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_records: DEFAULT_MAX_RECORDS,
            max_body_capture_bytes: DEFAULT_MAX_BODY_CAPTURE_BYTES,
            body_preview_chars: DEFAULT_BODY_PREVIEW_CHARS,
        }
    }
}

/// Settings for the isolated network channel
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportSettings {
    /// Total request timeout
    pub timeout: Duration,
    /// Connection establishment timeout
    pub connect_timeout: Duration,
    /// User-Agent header sent by the client
    pub user_agent: String,
    /// Capacity of each exchange's event channel
    pub event_buffer: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("netcapture/{}", env!("CARGO_PKG_VERSION")),
            event_buffer: 64,
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Capture section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureToml {
    /// Whether capture starts enabled
    pub enabled: Option<bool>,

    /// Records retained by the store
    pub max_records: Option<usize>,

    /// Bytes of each body kept on a record
    pub max_body_capture_bytes: Option<usize>,

    /// Character ceiling for rendered bodies
    pub body_preview_chars: Option<usize>,
}

/// Transport section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportToml {
    /// Total request timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Connection timeout in seconds
    pub connect_timeout_secs: Option<u64>,

    /// User-Agent header
    pub user_agent: Option<String>,

    /// Event channel capacity
    pub event_buffer: Option<usize>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetcaptureToml {
    /// Capture configuration section
    pub capture: CaptureToml,

    /// Transport configuration section
    pub transport: TransportToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Centralized configuration for the capture subsystem
#[derive(Clone, Debug)]
pub struct CaptureConfigFile {
    /// Capture layer settings
    pub capture: CaptureSettings,

    /// Network channel settings
    pub transport: TransportSettings,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for CaptureConfigFile {
    fn default() -> Self {
        Self {
            capture: CaptureSettings::default(),
            transport: TransportSettings::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl CaptureConfigFile {
    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Reject values the subsystem cannot run with
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.max_records == 0 {
            return Err(ConfigError::ValidationError(
                "capture.max_records must be at least 1".to_string(),
            ));
        }
        if self.transport.event_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "transport.event_buffer must be at least 1".to_string(),
            ));
        }
        if self.transport.timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "transport.timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/netcapture/capture.toml` or
/// `~/.config/netcapture/capture.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("netcapture").join("capture.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if
/// the resulting configuration is invalid. A missing config file is not an
/// error (defaults are used).
pub fn load_config() -> Result<CaptureConfigFile, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path and the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or if the resulting configuration is invalid.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<CaptureConfigFile, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration, resolving environment variables through `env`
///
/// # Errors
///
/// Same as [`load_config_from_path`].
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<CaptureConfigFile, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // Start with defaults
    let mut config = CaptureConfigFile::default();

    // Try to load from file
    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: NetcaptureToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    // Apply environment variables (overrides file values)
    apply_env_config(&mut config, env);

    config.validate()?;
    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut CaptureConfigFile, toml: &NetcaptureToml) {
    // Capture settings
    if let Some(enabled) = toml.capture.enabled {
        config.capture.enabled = enabled;
    }
    if let Some(max) = toml.capture.max_records {
        config.capture.max_records = max;
    }
    if let Some(bytes) = toml.capture.max_body_capture_bytes {
        config.capture.max_body_capture_bytes = bytes;
    }
    if let Some(chars) = toml.capture.body_preview_chars {
        config.capture.body_preview_chars = chars;
    }

    // Transport settings
    if let Some(secs) = toml.transport.timeout_secs {
        config.transport.timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.transport.connect_timeout_secs {
        config.transport.connect_timeout = Duration::from_secs(secs);
    }
    if let Some(ref agent) = toml.transport.user_agent {
        config.transport.user_agent.clone_from(agent);
    }
    if let Some(buffer) = toml.transport.event_buffer {
        config.transport.event_buffer = buffer;
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut CaptureConfigFile, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(max) = env("NETCAPTURE_MAX_RECORDS") {
        if let Ok(n) = max.parse::<usize>() {
            config.capture.max_records = n;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(enabled) = env("NETCAPTURE_ENABLED") {
        config.capture.enabled = enabled != "0" && enabled.to_lowercase() != "false";
        config.source = ConfigSource::Env;
    }
    if let Some(bytes) = env("NETCAPTURE_MAX_BODY_BYTES") {
        if let Ok(n) = bytes.parse::<usize>() {
            config.capture.max_body_capture_bytes = n;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(timeout) = env("NETCAPTURE_TIMEOUT_SECS") {
        if let Ok(secs) = timeout.parse::<u64>() {
            config.transport.timeout = Duration::from_secs(secs);
            config.source = ConfigSource::Env;
        }
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Capture enabled override
    pub enabled: Option<bool>,

    /// Store capacity override
    pub max_records: Option<usize>,

    /// Request timeout override (seconds)
    pub timeout_secs: Option<u64>,

    /// User-Agent override
    pub user_agent: Option<String>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set capture enabled override
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Set store capacity override
    #[must_use]
    pub fn with_max_records(mut self, max: usize) -> Self {
        self.max_records = Some(max);
        self
    }

    /// Set timeout override
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Set User-Agent override
    #[must_use]
    pub fn with_user_agent(mut self, agent: String) -> Self {
        self.user_agent = Some(agent);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut CaptureConfigFile) {
        if self.enabled.is_some()
            || self.max_records.is_some()
            || self.timeout_secs.is_some()
            || self.user_agent.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(enabled) = self.enabled {
            config.capture.enabled = enabled;
        }
        if let Some(max) = self.max_records {
            config.capture.max_records = max;
        }
        if let Some(secs) = self.timeout_secs {
            config.transport.timeout = Duration::from_secs(secs);
        }
        if let Some(ref agent) = self.user_agent {
            config.transport.user_agent.clone_from(agent);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

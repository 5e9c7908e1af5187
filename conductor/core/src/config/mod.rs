//! TOML Configuration File Support
//!
//! Centralized configuration loading for the face, with a TOML file at
//! `~/.config/robot-face/face.toml`.
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
//! [transport]
//! listen_addr = "127.0.0.1:8888"
//! max_line_bytes = 65536
//! max_connections = 100
//!
//! [expression]
//! idle_timeout_ms = 10000
//! transition_policy = "drop"
//!
//! [blink]
//! interval_min_ms = 4000
//! interval_max_ms = 7000
//! phase_ms = 100
//!
//! [pacer]
//! tick_ms = 30
//! chars_per_tick = 3
//! max_pending_chars = 65536
//! transcript_mode = "verbatim"
//! ```

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::conductor::ConductorConfig;
use crate::session::{SessionConfig, TransitionPolicy};
use crate::streaming::RevealMode;
use crate::transport::config::{TransportConfig, TransportType};

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
// TOML Configuration Structures
// =============================================================================

/// Transport section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportToml {
    /// TCP listen address
    pub listen_addr: Option<String>,

    /// Unix socket path (takes precedence over `listen_addr`)
    pub socket_path: Option<String>,

    /// Longest accepted line in bytes
    pub max_line_bytes: Option<usize>,

    /// Connections served at once
    pub max_connections: Option<usize>,
}

/// Expression section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpressionToml {
    /// Inactivity before sleeping, in milliseconds
    pub idle_timeout_ms: Option<u64>,

    /// `drop` or `latest`
    pub transition_policy: Option<TransitionPolicy>,
}

/// Blink section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BlinkToml {
    /// Shortest wait between blinks, in milliseconds
    pub interval_min_ms: Option<u64>,

    /// Longest wait between blinks, in milliseconds
    pub interval_max_ms: Option<u64>,

    /// Delay per blink phase, in milliseconds
    pub phase_ms: Option<u64>,

    /// Fixed RNG seed
    pub seed: Option<u64>,
}

/// Pacer section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PacerToml {
    /// Reveal tick, in milliseconds
    pub tick_ms: Option<u64>,

    /// Characters revealed per tick
    pub chars_per_tick: Option<usize>,

    /// Pending character cap per channel
    pub max_pending_chars: Option<usize>,

    /// `verbatim` or `paced`
    pub transcript_mode: Option<RevealMode>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceToml {
    /// Transport configuration section
    pub transport: TransportToml,

    /// Expression configuration section
    pub expression: ExpressionToml,

    /// Blink configuration section
    pub blink: BlinkToml,

    /// Pacer configuration section
    pub pacer: PacerToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Centralized configuration for the face daemon
///
/// Use [`load_config`] to load configuration with proper priority handling.
#[derive(Clone, Debug)]
pub struct FaceConfig {
    /// Listener configuration
    pub transport: TransportConfig,

    /// Session behavior
    pub session: SessionConfig,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            session: SessionConfig::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl FaceConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Settings for the session task
    #[must_use]
    pub fn conductor_config(&self) -> ConductorConfig {
        ConductorConfig {
            session: self.session.clone(),
            ..ConductorConfig::default()
        }
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let blink = &self.session.blink;
        let pacer = &self.session.pacer;

        if blink.interval_min > blink.interval_max {
            return Err(ConfigError::ValidationError(format!(
                "blink.interval_min_ms ({}) exceeds blink.interval_max_ms ({})",
                blink.interval_min.as_millis(),
                blink.interval_max.as_millis()
            )));
        }
        if blink.phase_delay.is_zero() {
            return Err(invalid("blink.phase_ms must be greater than 0"));
        }
        if pacer.tick.is_zero() {
            return Err(invalid("pacer.tick_ms must be greater than 0"));
        }
        if pacer.chars_per_tick == 0 {
            return Err(invalid("pacer.chars_per_tick must be at least 1"));
        }
        if self.session.idle_timeout.is_zero() {
            return Err(invalid("expression.idle_timeout_ms must be greater than 0"));
        }
        if self.transport.max_line_bytes == 0 {
            return Err(invalid("transport.max_line_bytes must be at least 1"));
        }
        if self.transport.max_connections == 0 {
            return Err(invalid("transport.max_connections must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/robot-face/face.toml` or
/// `~/.config/robot-face/face.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("robot-face").join("face.toml"))
}

/// Load configuration from the default path and the process environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or the
/// result fails validation. A missing config file is not an error.
pub fn load_config() -> Result<FaceConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path and the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or the result fails validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<FaceConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration with a custom environment lookup
///
/// # Errors
///
/// Same as [`load_config_from_path`].
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<FaceConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // Start with defaults
    let mut config = FaceConfig::default();

    // Try to load from file
    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: FaceToml = toml::from_str(&toml_content)?;
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
    apply_env_config(&mut config, &env);

    config.validate()?;
    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut FaceConfig, toml: &FaceToml) {
    // Transport settings
    if let Some(ref addr) = toml.transport.listen_addr {
        config.transport.transport = TransportType::Tcp { addr: addr.clone() };
    }
    #[cfg(unix)]
    if let Some(ref path) = toml.transport.socket_path {
        config.transport.transport = TransportType::UnixSocket {
            path: Some(PathBuf::from(path)),
        };
    }
    if let Some(max) = toml.transport.max_line_bytes {
        config.transport.max_line_bytes = max;
    }
    if let Some(max) = toml.transport.max_connections {
        config.transport.max_connections = max;
    }

    // Expression settings
    if let Some(ms) = toml.expression.idle_timeout_ms {
        config.session.idle_timeout = Duration::from_millis(ms);
    }
    if let Some(policy) = toml.expression.transition_policy {
        config.session.transition_policy = policy;
    }

    // Blink settings
    if let Some(ms) = toml.blink.interval_min_ms {
        config.session.blink.interval_min = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.blink.interval_max_ms {
        config.session.blink.interval_max = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.blink.phase_ms {
        config.session.blink.phase_delay = Duration::from_millis(ms);
    }
    if toml.blink.seed.is_some() {
        config.session.blink.seed = toml.blink.seed;
    }

    // Pacer settings
    if let Some(ms) = toml.pacer.tick_ms {
        config.session.pacer.tick = Duration::from_millis(ms);
    }
    if let Some(n) = toml.pacer.chars_per_tick {
        config.session.pacer.chars_per_tick = n;
    }
    if let Some(n) = toml.pacer.max_pending_chars {
        config.session.pacer.max_pending_chars = n;
    }
    if let Some(mode) = toml.pacer.transcript_mode {
        config.session.pacer.transcript_mode = mode;
    }
}

/// Read and parse one variable; unparsable values are logged and skipped
fn env_parse<T, F>(env: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparsable environment variable");
            None
        }
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut FaceConfig, env: &F)
where
    F: Fn(&str) -> Option<String>,
{
    let mut touched = false;

    // Transport settings from environment
    if let Some(addr) = env("FACE_LISTEN") {
        config.transport.transport = TransportType::Tcp { addr };
        touched = true;
    }
    #[cfg(unix)]
    if let Some(path) = env("FACE_SOCKET") {
        config.transport.transport = TransportType::UnixSocket {
            path: Some(PathBuf::from(path)),
        };
        touched = true;
    }
    if let Some(n) = env_parse(env, "FACE_MAX_LINE_BYTES") {
        config.transport.max_line_bytes = n;
        touched = true;
    }
    if let Some(n) = env_parse(env, "FACE_MAX_CONNECTIONS") {
        config.transport.max_connections = n;
        touched = true;
    }

    // Expression settings from environment
    if let Some(ms) = env_parse(env, "FACE_IDLE_TIMEOUT_MS") {
        config.session.idle_timeout = Duration::from_millis(ms);
        touched = true;
    }
    if let Some(raw) = env("FACE_TRANSITION_POLICY") {
        match TransitionPolicy::parse(&raw) {
            Some(policy) => {
                config.session.transition_policy = policy;
                touched = true;
            }
            None => tracing::warn!(value = %raw, "Unknown FACE_TRANSITION_POLICY, ignoring"),
        }
    }

    // Blink settings from environment
    if let Some(ms) = env_parse(env, "FACE_BLINK_MIN_MS") {
        config.session.blink.interval_min = Duration::from_millis(ms);
        touched = true;
    }
    if let Some(ms) = env_parse(env, "FACE_BLINK_MAX_MS") {
        config.session.blink.interval_max = Duration::from_millis(ms);
        touched = true;
    }
    if let Some(ms) = env_parse(env, "FACE_BLINK_PHASE_MS") {
        config.session.blink.phase_delay = Duration::from_millis(ms);
        touched = true;
    }
    if let Some(seed) = env_parse(env, "FACE_BLINK_SEED") {
        config.session.blink.seed = Some(seed);
        touched = true;
    }

    // Pacer settings from environment
    if let Some(ms) = env_parse(env, "FACE_PACER_TICK_MS") {
        config.session.pacer.tick = Duration::from_millis(ms);
        touched = true;
    }
    if let Some(n) = env_parse(env, "FACE_PACER_CHARS") {
        config.session.pacer.chars_per_tick = n;
        touched = true;
    }
    if let Some(n) = env_parse(env, "FACE_PACER_MAX_PENDING") {
        config.session.pacer.max_pending_chars = n;
        touched = true;
    }
    if let Some(raw) = env("FACE_TRANSCRIPT_MODE") {
        match RevealMode::parse(&raw) {
            Some(mode) => {
                config.session.pacer.transcript_mode = mode;
                touched = true;
            }
            None => tracing::warn!(value = %raw, "Unknown FACE_TRANSCRIPT_MODE, ignoring"),
        }
    }

    if touched {
        config.source = ConfigSource::Env;
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
    /// TCP listen address override
    pub listen_addr: Option<String>,
    /// Unix socket path override
    pub socket_path: Option<PathBuf>,
    /// Transition policy override
    pub transition_policy: Option<TransitionPolicy>,
    /// Blink seed override
    pub blink_seed: Option<u64>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set listen address override
    #[must_use]
    pub fn with_listen_addr(mut self, addr: String) -> Self {
        self.listen_addr = Some(addr);
        self
    }

    /// Set socket path override
    #[must_use]
    pub fn with_socket_path(mut self, path: PathBuf) -> Self {
        self.socket_path = Some(path);
        self
    }

    /// Set transition policy override
    #[must_use]
    pub fn with_transition_policy(mut self, policy: TransitionPolicy) -> Self {
        self.transition_policy = Some(policy);
        self
    }

    /// Set blink seed override
    #[must_use]
    pub fn with_blink_seed(mut self, seed: u64) -> Self {
        self.blink_seed = Some(seed);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut FaceConfig) {
        if self.listen_addr.is_some()
            || self.socket_path.is_some()
            || self.transition_policy.is_some()
            || self.blink_seed.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref addr) = self.listen_addr {
            config.transport.transport = TransportType::Tcp { addr: addr.clone() };
        }
        #[cfg(unix)]
        if let Some(ref path) = self.socket_path {
            config.transport.transport = TransportType::UnixSocket {
                path: Some(path.clone()),
            };
        }
        if let Some(policy) = self.transition_policy {
            config.session.transition_policy = policy;
        }
        if self.blink_seed.is_some() {
            config.session.blink.seed = self.blink_seed;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

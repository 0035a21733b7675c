//! Configuration management for cursord
//!
//! This module handles loading, parsing, and managing configuration from various sources:
//! - Configuration files (TOML format)
//! - Environment variables
//! - Command-line arguments
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::GrantLevel;
use crate::error::{ConfigError, Result};

/// Prefix of all environment overrides.
pub const ENV_PREFIX: &str = "CURSORD_";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Cluster and listener configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Cursor lifecycle configuration
    #[serde(default)]
    pub cursor: CursorConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Users provisioned at startup
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

/// Cluster and listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the coordinators bind to
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Port of the first coordinator; the others use consecutive ports
    #[serde(default = "default_base_port")]
    pub base_port: u16,

    /// Number of coordinators to start
    #[serde(default = "default_coordinators")]
    pub coordinators: usize,

    /// Prefix of coordinator names (defaults to the host name)
    #[serde(default)]
    pub name_prefix: Option<String>,
}

/// Cursor lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorConfig {
    /// Batch size used when a request does not specify one
    #[serde(default = "default_batch_size")]
    pub default_batch_size: usize,

    /// Largest accepted batch size
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Idle time-to-live of a cursor in seconds
    #[serde(default = "default_ttl")]
    pub ttl: u64,

    /// Interval of the expiry sweep in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// A user provisioned from the configuration file
///
/// ```toml
/// [[users]]
/// username = "alice"
/// password = "pass1"
///
/// [users.databases._system]
/// level = "ro"
/// collections = { animals = "ro", fruits = "none" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Grants keyed by database name
    #[serde(default)]
    pub databases: BTreeMap<String, DatabaseGrantConfig>,
}

/// Grants a user holds within one database
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseGrantConfig {
    /// Database-level grant
    #[serde(default)]
    pub level: Option<GrantLevel>,

    /// Collection-level overrides
    #[serde(default)]
    pub collections: BTreeMap<String, GrantLevel>,
}

// Default value functions
fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_base_port() -> u16 {
    8529
}

fn default_coordinators() -> usize {
    2
}

fn default_batch_size() -> usize {
    1000
}

fn default_max_batch_size() -> usize {
    100_000
}

fn default_ttl() -> u64 {
    30
}

fn default_sweep_interval() -> u64 {
    5
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            cursor: CursorConfig::default(),
            logging: LoggingConfig::default(),
            users: Vec::new(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            base_port: default_base_port(),
            coordinators: default_coordinators(),
            name_prefix: None,
        }
    }
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            default_batch_size: default_batch_size(),
            max_batch_size: default_max_batch_size(),
            ttl: default_ttl(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Load configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Load configuration from an explicit path or the default location
    ///
    /// An explicit path must exist. When no path is given, a missing default
    /// file yields the default configuration.
    pub fn load_from_file(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default_path = Self::default_path();
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cursord")
            .join("config.toml")
    }

    /// Render the configuration as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Save configuration to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// Apply `CURSORD_*` environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    ///
    /// Recognized keys (without prefix): `BIND`, `BASE_PORT`, `COORDINATORS`,
    /// `BATCH_SIZE`, `CURSOR_TTL`, `SWEEP_INTERVAL`, `LOG_LEVEL`.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(bind) = get("BIND") {
            self.server.bind = bind;
        }
        if let Some(v) = get("BASE_PORT") {
            self.server.base_port = parse_field("server.base_port", &v)?;
        }
        if let Some(v) = get("COORDINATORS") {
            self.server.coordinators = parse_field("server.coordinators", &v)?;
        }
        if let Some(v) = get("BATCH_SIZE") {
            self.cursor.default_batch_size = parse_field("cursor.default_batch_size", &v)?;
        }
        if let Some(v) = get("CURSOR_TTL") {
            self.cursor.ttl = parse_field("cursor.ttl", &v)?;
        }
        if let Some(v) = get("SWEEP_INTERVAL") {
            self.cursor.sweep_interval = parse_field("cursor.sweep_interval", &v)?;
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.logging.level = LogLevel::parse(&v).ok_or_else(|| ConfigError::InvalidValue {
                field: "logging.level".to_string(),
                value: v.clone(),
            })?;
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.coordinators == 0 {
            return Err(invalid("server.coordinators", "0"));
        }
        if self.cursor.default_batch_size == 0 {
            return Err(invalid("cursor.default_batch_size", "0"));
        }
        if self.cursor.max_batch_size < self.cursor.default_batch_size {
            return Err(invalid(
                "cursor.max_batch_size",
                &self.cursor.max_batch_size.to_string(),
            ));
        }
        if self.cursor.ttl == 0 {
            return Err(invalid("cursor.ttl", "0"));
        }
        if self.cursor.sweep_interval == 0 {
            return Err(invalid("cursor.sweep_interval", "0"));
        }
        let mut seen = std::collections::HashSet::new();
        for user in &self.users {
            if user.username.is_empty() || !seen.insert(user.username.as_str()) {
                return Err(invalid("users.username", &user.username));
            }
        }
        Ok(())
    }

    /// Cursor idle time-to-live as Duration
    pub fn cursor_ttl(&self) -> Duration {
        Duration::from_secs(self.cursor.ttl)
    }

    /// Expiry sweep interval as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cursor.sweep_interval)
    }
}

fn parse_field<T: std::str::FromStr>(field: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| invalid(field, value))
}

fn invalid(field: &str, value: &str) -> crate::error::CursordError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}

impl LogLevel {
    /// Parse a level name, case-insensitive
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

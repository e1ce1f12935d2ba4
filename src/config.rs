//! Configuration management for redis-info-collector
//!
//! Handles loading and validating configuration from YAML files. The file
//! carries the collector's own settings plus the `plugin` tree, a list of
//! `key`/`values`/`children` items that `registry::configure` walks.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dispatcher::{EmptyFetchPolicy, NonNumericPolicy};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Error reading the configuration file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Error parsing the configuration file
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation error
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Seconds between read ticks
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Timeout for one INFO request in milliseconds
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// Host name reported to the metrics pipeline
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// What to do with the rest of a tick when a node returns no data
    #[serde(default)]
    pub on_empty_fetch: EmptyFetchPolicy,

    /// What to do when a selected field is not an integer
    #[serde(default)]
    pub on_non_numeric: NonNumericPolicy,

    /// Where metrics are sent
    #[serde(default)]
    pub sink: SinkConfig,

    /// Plugin configuration tree (`Node`, `Verbose`)
    #[serde(default)]
    pub plugin: Vec<ConfigItem>,
}

/// Metric sink configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink implementation
    #[serde(default)]
    pub kind: SinkKind,

    /// collectd `write_http` endpoint (http sink only)
    pub url: Option<String>,
}

/// Available sink implementations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// collectd plain-text `PUTVAL` lines on stdout
    #[default]
    Putval,
    /// collectd `write_http` JSON over HTTP POST
    Http,
}

/// One block of the plugin configuration tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigItem {
    /// Block key (e.g. `Node`, `Host`)
    pub key: String,

    /// Block values
    #[serde(default)]
    pub values: Vec<ConfigValue>,

    /// Nested blocks
    #[serde(default)]
    pub children: Vec<ConfigItem>,
}

impl ConfigItem {
    /// Create an item with values and no children
    pub fn new(key: &str, values: Vec<ConfigValue>) -> Self {
        Self {
            key: key.to_string(),
            values,
            children: Vec::new(),
        }
    }

    /// Attach nested blocks
    pub fn with_children(mut self, children: Vec<ConfigItem>) -> Self {
        self.children = children;
        self
    }

    /// First value, or a validation error naming the key
    pub fn first_value(&self) -> Result<&ConfigValue, ConfigError> {
        self.values.first().ok_or_else(|| {
            ConfigError::ValidationError(format!("'{}' requires a value", self.key))
        })
    }
}

/// A single value in the plugin configuration tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl ConfigValue {
    /// Interpret as a boolean
    ///
    /// Numbers are true when non-zero; strings accept true/yes/on/1.
    pub fn as_bool(&self) -> bool {
        match self {
            ConfigValue::Bool(b) => *b,
            ConfigValue::Number(n) => *n != 0.0,
            ConfigValue::String(s) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "true" | "yes" | "on" | "1"
            ),
        }
    }

    /// Interpret as a whole number
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ConfigValue::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            ConfigValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(b) => write!(f, "{}", b),
            ConfigValue::Number(n) if n.fract() == 0.0 => write!(f, "{}", *n as i64),
            ConfigValue::Number(n) => write!(f, "{}", n),
            ConfigValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::String(s.to_string())
    }
}

impl From<f64> for ConfigValue {
    fn from(n: f64) -> Self {
        ConfigValue::Number(n)
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Bool(b)
    }
}

// Default value functions
fn default_interval() -> u64 {
    10
}

fn default_timeout() -> u64 {
    5000
}

fn default_hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            timeout_ms: default_timeout(),
            hostname: default_hostname(),
            on_empty_fetch: EmptyFetchPolicy::default(),
            on_non_numeric: NonNumericPolicy::default(),
            sink: SinkConfig::default(),
            plugin: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML file, falling back to defaults if not found
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }

        Self::load(path)
    }

    /// Parse and validate configuration from a YAML string
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.hostname.is_empty() || self.hostname.contains('/') {
            return Err(ConfigError::ValidationError(format!(
                "hostname '{}' must be non-empty and must not contain '/'",
                self.hostname
            )));
        }

        if self.sink.kind == SinkKind::Http {
            let raw = self.sink.url.as_deref().ok_or_else(|| {
                ConfigError::ValidationError("sink.url is required for the http sink".to_string())
            })?;
            let url = url::Url::parse(raw).map_err(|e| {
                ConfigError::ValidationError(format!("Invalid sink.url '{}': {}", raw, e))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::ValidationError(format!(
                    "sink.url '{}' must use http or https",
                    raw
                )));
            }
        }

        Ok(())
    }
}

//! CLI argument parsing for redis-info-collector
//!
//! This module provides the command-line interface using clap derive macros.
//!
//! # Options
//!
//! - `--config` / `-c`: Configuration file path (default: config.yaml, env: REDIS_INFO_CONFIG)
//! - `--interval` / `-i`: Seconds between read ticks (env: REDIS_INFO_INTERVAL)
//! - `--hostname`: Host name reported with every metric (env: REDIS_INFO_HOSTNAME)
//! - `--sink-url`: Send metrics to a collectd `write_http` endpoint (env: REDIS_INFO_SINK_URL)
//! - `--validate`: Validate configuration and print the configured nodes
//! - `--once`: Run a single read tick and exit
//! - `--log-level` / `-l`: Log level (trace/debug/info/warn/error, env: REDIS_INFO_LOG_LEVEL)
//! - `--log-format`: Log format (text/json)
//! - `--output-format`: Output format for --validate (text/json/yaml)
//!
//! # Precedence
//!
//! Configuration values are resolved in the following order (highest to lowest priority):
//! 1. CLI arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values

use std::fmt::Write as _;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use serde::Serialize;

use crate::config::{Config, SinkKind};
use crate::registry::{NodeSummary, Registry};

/// redis-info-collector - Redis INFO metrics collector
///
/// Polls Redis servers for their INFO report and forwards selected
/// fields to a collectd-style metrics pipeline.
///
/// Environment variables can be used for all configuration options.
/// CLI arguments take precedence over environment variables,
/// which take precedence over config file values.
#[derive(Parser, Debug)]
#[command(name = "redis-info-collector")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "config.yaml",
        env = "REDIS_INFO_CONFIG"
    )]
    pub config: PathBuf,

    /// Seconds between read ticks (overrides config file)
    #[arg(short, long, value_name = "SECS", env = "REDIS_INFO_INTERVAL")]
    pub interval: Option<u64>,

    /// Host name reported with every metric (overrides config file)
    #[arg(long, value_name = "NAME", env = "REDIS_INFO_HOSTNAME")]
    pub hostname: Option<String>,

    /// collectd write_http endpoint; switches the sink to http
    #[arg(long, value_name = "URL", env = "REDIS_INFO_SINK_URL")]
    pub sink_url: Option<String>,

    /// Validate configuration without starting collection
    #[arg(long)]
    pub validate: bool,

    /// Run a single read tick and exit
    #[arg(long, conflicts_with = "validate")]
    pub once: bool,

    /// Log level
    #[arg(
        short,
        long,
        value_enum,
        default_value = "info",
        env = "REDIS_INFO_LOG_LEVEL"
    )]
    pub log_level: LogLevel,

    /// Log line format
    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Output format for --validate
    #[arg(long, value_enum, default_value = "text")]
    pub output_format: OutputFormat,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(interval) = self.interval {
            config.interval_secs = interval;
        }
        if let Some(hostname) = &self.hostname {
            config.hostname = hostname.clone();
        }
        if let Some(url) = &self.sink_url {
            config.sink.kind = SinkKind::Http;
            config.sink.url = Some(url.clone());
        }
    }
}

/// Log level options
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Trace level - most verbose
    Trace,
    /// Debug level
    Debug,
    /// Info level - default
    Info,
    /// Warn level
    Warn,
    /// Error level - least verbose
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Log line formats
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

/// Output format options for validate mode
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Yaml => write!(f, "yaml"),
        }
    }
}

/// Result of `--validate`
#[derive(Debug, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub interval_secs: u64,
    pub hostname: String,
    pub sink: SinkKind,
    pub verbose: bool,
    pub nodes: Vec<NodeSummary>,
}

impl ValidationReport {
    pub fn new(config: &Config, verbose: bool, registry: &Registry) -> Self {
        Self {
            valid: true,
            interval_secs: config.interval_secs,
            hostname: config.hostname.clone(),
            sink: config.sink.kind,
            verbose,
            nodes: registry.iter().map(|n| n.summary()).collect(),
        }
    }

    /// Render the report in the requested format
    pub fn render(&self, format: OutputFormat) -> anyhow::Result<String> {
        match format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            OutputFormat::Yaml => Ok(serde_yaml::to_string(self)?),
            OutputFormat::Text => {
                let mut out = String::from("Configuration is valid\n");
                writeln!(out, "  interval: {}s", self.interval_secs)?;
                writeln!(out, "  hostname: {}", self.hostname)?;
                writeln!(out, "  nodes: {}", self.nodes.len())?;
                for node in &self.nodes {
                    writeln!(
                        out,
                        "  - {} ({}:{}) {} selection, {} keys, {} dbs",
                        node.name,
                        node.host,
                        node.port,
                        node.selection,
                        node.keys.len(),
                        node.dbs.len()
                    )?;
                }
                Ok(out)
            }
        }
    }
}

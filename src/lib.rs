//! redis-info-collector library
//!
//! This crate polls Redis servers for their INFO report, parses it into
//! typed fields and forwards selected fields as metrics to a collectd-style
//! pipeline on a fixed interval.

pub mod cli;
pub mod collector;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod runner;
pub mod sink;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the logging subsystem
///
/// Logs go to stderr; stdout is reserved for the `PUTVAL` stream.
///
/// # Arguments
/// * `level` - Log level string (trace, debug, info, warn, error)
/// * `json` - Emit JSON log lines instead of human-readable text
///
/// # Errors
/// Returns an error if the logging system fails to initialize
pub fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

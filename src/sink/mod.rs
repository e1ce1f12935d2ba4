//! Metric sinks
//!
//! A sink receives every [`MetricPoint`] the dispatcher produces, exactly
//! once, and is flushed at the end of each read tick.

mod http;
mod putval;

pub use http::HttpSink;
pub use putval::{identifier, PutvalSink};

use std::io::Stdout;

use crate::config::{Config, SinkKind};
use crate::dispatcher::MetricPoint;
use crate::error::SinkError;

/// Destination for metric points
#[allow(async_fn_in_trait)]
pub trait MetricSink {
    /// Accept one point
    async fn emit(&mut self, point: &MetricPoint) -> Result<(), SinkError>;

    /// Push out anything buffered since the last flush
    async fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Keeps every point in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    points: Vec<MetricPoint>,
    flushes: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points received so far, in emission order
    pub fn points(&self) -> &[MetricPoint] {
        &self.points
    }

    /// Number of flush calls
    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

impl MetricSink for MemorySink {
    async fn emit(&mut self, point: &MetricPoint) -> Result<(), SinkError> {
        self.points.push(point.clone());
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.flushes += 1;
        Ok(())
    }
}

/// The sink selected in the configuration file
#[derive(Debug)]
pub enum ConfiguredSink {
    Putval(PutvalSink<Stdout>),
    Http(HttpSink),
}

impl ConfiguredSink {
    /// Build the sink described by `config.sink`
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created
    pub fn from_config(config: &Config) -> Result<Self, SinkError> {
        match config.sink.kind {
            SinkKind::Putval => Ok(ConfiguredSink::Putval(PutvalSink::new(
                std::io::stdout(),
                &config.hostname,
                config.interval_secs,
            ))),
            SinkKind::Http => {
                // validate() guarantees the url for the http sink
                let url = config.sink.url.as_deref().unwrap_or_default();
                Ok(ConfiguredSink::Http(HttpSink::new(
                    url,
                    &config.hostname,
                    config.interval_secs,
                    config.timeout_ms,
                )?))
            }
        }
    }
}

impl MetricSink for ConfiguredSink {
    async fn emit(&mut self, point: &MetricPoint) -> Result<(), SinkError> {
        match self {
            ConfiguredSink::Putval(sink) => sink.emit(point).await,
            ConfiguredSink::Http(sink) => sink.emit(point).await,
        }
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        match self {
            ConfiguredSink::Putval(sink) => sink.flush().await,
            ConfiguredSink::Http(sink) => sink.flush().await,
        }
    }
}

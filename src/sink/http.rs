//! collectd `write_http` JSON output
//!
//! Buffers the points of one tick and POSTs them as a single JSON array in
//! the format collectd's `write_http` plugin produces, so any endpoint that
//! accepts collectd JSON (or a collectd `network`-to-HTTP bridge) can ingest
//! them.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::{Client, ClientBuilder};
use serde::Serialize;
use tracing::{debug, instrument};

use super::MetricSink;
use crate::dispatcher::MetricPoint;
use crate::error::SinkError;

/// One value list in collectd JSON
#[derive(Debug, Serialize)]
struct ValueList<'a> {
    values: [i64; 1],
    dstypes: [&'static str; 1],
    dsnames: [&'static str; 1],
    time: f64,
    interval: f64,
    host: &'a str,
    plugin: &'a str,
    plugin_instance: &'a str,
    #[serde(rename = "type")]
    metric_type: &'a str,
    type_instance: &'a str,
}

/// Data-source type for a collectd type name
fn dstype(metric_type: &str) -> &'static str {
    match metric_type {
        "counter" => "counter",
        "derive" => "derive",
        "absolute" => "absolute",
        _ => "gauge",
    }
}

/// HTTP sink posting collectd JSON
#[derive(Debug)]
pub struct HttpSink {
    client: Client,
    url: String,
    hostname: String,
    interval_secs: u64,
    pending: Vec<MetricPoint>,
}

impl HttpSink {
    /// Create a new HTTP sink
    ///
    /// # Arguments
    /// * `url` - Endpoint receiving the JSON array
    /// * `hostname` - Host reported in each value list
    /// * `interval_secs` - Collection interval reported in each value list
    /// * `timeout_ms` - Request timeout (milliseconds)
    pub fn new(
        url: &str,
        hostname: &str,
        interval_secs: u64,
        timeout_ms: u64,
    ) -> Result<Self, SinkError> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_millis(timeout_ms))
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(SinkError::HttpClientInit)?;

        Ok(Self {
            client,
            url: url.to_string(),
            hostname: hostname.to_string(),
            interval_secs,
            pending: Vec::new(),
        })
    }

    /// Points waiting for the next flush
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Build the JSON body for a batch of points
    ///
    /// # Errors
    /// Returns an error if the value lists cannot be encoded
    pub fn payload(
        &self,
        points: &[MetricPoint],
        time: f64,
    ) -> Result<serde_json::Value, SinkError> {
        let lists: Vec<ValueList<'_>> = points
            .iter()
            .map(|p| ValueList {
                values: [p.value],
                dstypes: [dstype(&p.metric_type)],
                dsnames: ["value"],
                time,
                interval: self.interval_secs as f64,
                host: &self.hostname,
                plugin: p.plugin,
                plugin_instance: &p.plugin_instance,
                metric_type: &p.metric_type,
                type_instance: &p.type_instance,
            })
            .collect();

        Ok(serde_json::to_value(lists)?)
    }
}

impl MetricSink for HttpSink {
    async fn emit(&mut self, point: &MetricPoint) -> Result<(), SinkError> {
        self.pending.push(point.clone());
        Ok(())
    }

    /// POST the buffered points; they are dropped even if the request fails
    #[instrument(skip(self), fields(url = %self.url, count = self.pending.len()))]
    async fn flush(&mut self) -> Result<(), SinkError> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let points = std::mem::take(&mut self.pending);
        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let body = self.payload(&points, time)?;

        debug!("Posting value lists");

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(SinkError::HttpRequest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::HttpStatus(status.as_u16()));
        }

        Ok(())
    }
}

//! collectd plain-text protocol output
//!
//! Writes one `PUTVAL` command per metric, the format accepted by collectd's
//! exec and unixsock plugins:
//!
//! ```text
//! PUTVAL "<host>/redis_info-<node>/<type>-<type_instance>" interval=<secs> N:<value>
//! ```

use std::io::Write;

use super::MetricSink;
use crate::dispatcher::MetricPoint;
use crate::error::SinkError;

/// collectd value identifier: `host/plugin-instance/type-type_instance`
pub fn identifier(host: &str, point: &MetricPoint) -> String {
    format!(
        "{}/{}-{}/{}-{}",
        host, point.plugin, point.plugin_instance, point.metric_type, point.type_instance
    )
}

/// `PUTVAL` line writer
#[derive(Debug)]
pub struct PutvalSink<W: Write> {
    writer: W,
    hostname: String,
    interval_secs: u64,
}

impl<W: Write> PutvalSink<W> {
    /// Create a sink writing to `writer`
    pub fn new(writer: W, hostname: &str, interval_secs: u64) -> Self {
        Self {
            writer,
            hostname: hostname.to_string(),
            interval_secs,
        }
    }

    /// Format one point (without trailing newline)
    pub fn format_line(&self, point: &MetricPoint) -> String {
        format!(
            "PUTVAL \"{}\" interval={} N:{}",
            escape(&identifier(&self.hostname, point)),
            self.interval_secs,
            point.value
        )
    }

    /// Consume the sink and return the writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> MetricSink for PutvalSink<W> {
    async fn emit(&mut self, point: &MetricPoint) -> Result<(), SinkError> {
        let line = self.format_line(point);
        writeln!(self.writer, "{}", line)?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Escape backslashes and double quotes inside a quoted identifier
fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

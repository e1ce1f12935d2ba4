//! Metric dispatcher
//!
//! Turns each node's INFO report into metric points on every read tick.
//!
//! For every node in registry order the dispatcher fetches the report,
//! parses it, and emits one point per selected field:
//!
//! - explicit selection: each configured key, then every sub-key of each
//!   configured database section as `<db>-<subkey>`
//! - builtin selection: the fixed field list, every `vm_stats_*` field and
//!   the `keys` count of every `db*` section

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::collector::{parse_info, parse_integer, FieldLookup, InfoSource, ParsedInfo};
use crate::error::DispatchError;
use crate::registry::{
    KeySpec, Node, Registry, Selection, DB_PREFIX, DEFAULT_METRIC_TYPE, VM_STATS_PREFIX,
};
use crate::sink::MetricSink;

/// Plugin name attached to every metric point
pub const PLUGIN_NAME: &str = "redis_info";

/// What happens to the rest of a tick when a node yields no data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyFetchPolicy {
    /// Stop polling the remaining nodes until the next tick
    #[default]
    Abort,
    /// Skip only the failing node
    Continue,
}

/// What happens when a selected field is not an integer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NonNumericPolicy {
    /// Fail the dispatch call, which aborts the tick
    #[default]
    Fail,
    /// Log a warning and skip the field
    Skip,
}

/// A single metric value handed to the sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricPoint {
    /// Always [`PLUGIN_NAME`]
    pub plugin: &'static str,
    /// Node name
    pub plugin_instance: String,
    /// Metric type (collectd type name)
    pub metric_type: String,
    /// Label distinguishing the metric within its type
    pub type_instance: String,
    pub value: i64,
}

impl MetricPoint {
    /// Create a point for the given node
    pub fn new(node: &str, metric_type: &str, type_instance: &str, value: i64) -> Self {
        Self {
            plugin: PLUGIN_NAME,
            plugin_instance: node.to_string(),
            metric_type: metric_type.to_string(),
            type_instance: type_instance.to_string(),
            value,
        }
    }
}

/// Outcome of one read tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Nodes whose report was fetched and parsed
    pub nodes_polled: usize,
    /// Nodes that returned no data
    pub nodes_failed: usize,
    /// Points handed to the sink
    pub metrics_emitted: usize,
    /// Selected fields absent from the report
    pub fields_missing: usize,
    /// Fields skipped because they were not integers
    pub fields_skipped: usize,
    /// Database sections absent from the report
    pub databases_missing: usize,
    /// Remaining nodes were not polled
    pub aborted: bool,
}

/// Metric dispatcher over a configured registry
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher<'a> {
    registry: &'a Registry,
    verbose: bool,
    on_empty_fetch: EmptyFetchPolicy,
    on_non_numeric: NonNumericPolicy,
}

impl<'a> Dispatcher<'a> {
    /// Create a dispatcher with default policies
    pub fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            verbose: false,
            on_empty_fetch: EmptyFetchPolicy::default(),
            on_non_numeric: NonNumericPolicy::default(),
        }
    }

    /// Log every emitted value at info level
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_empty_fetch_policy(mut self, policy: EmptyFetchPolicy) -> Self {
        self.on_empty_fetch = policy;
        self
    }

    pub fn with_non_numeric_policy(mut self, policy: NonNumericPolicy) -> Self {
        self.on_non_numeric = policy;
        self
    }

    /// Poll every node once and emit its selected metrics
    ///
    /// A node that fails to fetch, returns no data, or returns a report
    /// without fields is logged; with [`EmptyFetchPolicy::Abort`] the
    /// remaining nodes are not polled in this tick.
    ///
    /// # Errors
    /// Returns an error when a selected field is not an integer under
    /// [`NonNumericPolicy::Fail`], or when the sink rejects a point. Points
    /// emitted before the error stay emitted.
    pub async fn read_tick<S, K>(
        &self,
        source: &S,
        sink: &mut K,
    ) -> Result<TickSummary, DispatchError>
    where
        S: InfoSource,
        K: MetricSink,
    {
        if self.verbose {
            info!(nodes = self.registry.len(), "Read tick started");
        }

        let mut summary = TickSummary::default();

        for node in self.registry.iter() {
            let info = match source.fetch(node).await {
                Ok(Some(report)) => parse_info(&report),
                Ok(None) => ParsedInfo::new(),
                Err(e) => {
                    error!(node = %node.name, error = %e, "Failed to fetch info");
                    ParsedInfo::new()
                }
            };

            if info.is_empty() {
                error!(node = %node.name, "No info received");
                summary.nodes_failed += 1;
                match self.on_empty_fetch {
                    EmptyFetchPolicy::Abort => {
                        summary.aborted = true;
                        break;
                    }
                    EmptyFetchPolicy::Continue => continue,
                }
            }

            summary.nodes_polled += 1;
            self.dispatch_node(sink, &mut summary, node, &info).await?;
        }

        debug!(
            nodes_polled = summary.nodes_polled,
            metrics_emitted = summary.metrics_emitted,
            aborted = summary.aborted,
            "Read tick complete"
        );

        Ok(summary)
    }

    /// Emit the selected metrics of one parsed report
    async fn dispatch_node<K: MetricSink>(
        &self,
        sink: &mut K,
        summary: &mut TickSummary,
        node: &Node,
        info: &ParsedInfo,
    ) -> Result<(), DispatchError> {
        match &node.selection {
            Selection::Explicit { keys, dbs } => {
                for spec in keys {
                    self.dispatch_value(sink, summary, info, &node.name, spec)
                        .await?;
                }

                for db in dbs {
                    let Some(record) = info.get(db).and_then(|v| v.as_record()) else {
                        error!(node = %node.name, database = %db, "Database not found in data");
                        summary.databases_missing += 1;
                        continue;
                    };

                    for sub_key in record.keys() {
                        let spec = KeySpec::new(sub_key, DEFAULT_METRIC_TYPE)
                            .with_rename(&format!("{}-{}", db, sub_key));
                        self.dispatch_value(sink, summary, record, &node.name, &spec)
                            .await?;
                    }
                }
            }
            Selection::Builtin => {
                for spec in Selection::builtin_keys() {
                    self.dispatch_value(sink, summary, info, &node.name, &spec)
                        .await?;
                }

                for (field, value) in info.iter() {
                    if field.starts_with(VM_STATS_PREFIX) {
                        let spec = KeySpec::new(field, DEFAULT_METRIC_TYPE);
                        self.dispatch_value(sink, summary, info, &node.name, &spec)
                            .await?;
                    }

                    if field.starts_with(DB_PREFIX) {
                        let Some(record) = value.as_record() else {
                            debug!(field = %field, "Skipping non-record db field");
                            continue;
                        };
                        let spec = KeySpec::new("keys", DEFAULT_METRIC_TYPE)
                            .with_rename(&format!("{}-keys", field));
                        self.dispatch_value(sink, summary, record, &node.name, &spec)
                            .await?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Read one field and emit it as an integer metric
    ///
    /// A missing field is logged and skipped. The type-instance is the key
    /// spec's rename, or the field name when there is none.
    ///
    /// # Errors
    /// Returns [`DispatchError::NonNumeric`] for a non-integer value under
    /// [`NonNumericPolicy::Fail`], or a sink error.
    pub async fn dispatch_value<F, K>(
        &self,
        sink: &mut K,
        summary: &mut TickSummary,
        fields: &F,
        node: &str,
        spec: &KeySpec,
    ) -> Result<(), DispatchError>
    where
        F: FieldLookup + ?Sized,
        K: MetricSink,
    {
        let Some(raw) = fields.raw(&spec.field) else {
            warn!(node = %node, key = %spec.field, "Info key not found");
            summary.fields_missing += 1;
            return Ok(());
        };

        let Some(value) = parse_integer(&raw) else {
            return match self.on_non_numeric {
                NonNumericPolicy::Fail => Err(DispatchError::NonNumeric {
                    node: node.to_string(),
                    key: spec.field.clone(),
                    value: raw.into_owned(),
                }),
                NonNumericPolicy::Skip => {
                    warn!(
                        node = %node,
                        key = %spec.field,
                        value = %raw,
                        "Skipping non-integer value"
                    );
                    summary.fields_skipped += 1;
                    Ok(())
                }
            };
        };

        let type_instance = spec.type_instance();
        if self.verbose {
            info!(node = %node, type_instance = %type_instance, value, "Sending value");
        }

        let point = MetricPoint::new(node, &spec.metric_type, type_instance, value);
        sink.emit(&point).await?;
        summary.metrics_emitted += 1;
        Ok(())
    }
}

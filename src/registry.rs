//! Node registry
//!
//! Builds the set of polled nodes from the plugin configuration tree. The
//! registry is constructed once by [`configure`] and only read afterwards.
//!
//! ```text
//! Node "primary"
//!   Host "10.0.0.5"
//!   Port 6379
//!   Keys "uptime_in_seconds:gauge" "total_commands_processed:counter:commands"
//!   Dbs 0 "db1"
//! Verbose true
//! ```

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::collector::InfoClient;
use crate::config::{ConfigError, ConfigItem, ConfigValue};

/// Default server host
pub const DEFAULT_HOST: &str = "localhost";

/// Default server port
pub const DEFAULT_PORT: u16 = 6379;

/// Metric type used when a key does not name one
pub const DEFAULT_METRIC_TYPE: &str = "gauge";

/// Fields starting with this prefix are emitted by the builtin selection
pub const VM_STATS_PREFIX: &str = "vm_stats_";

/// Prefix of per-database sections
pub const DB_PREFIX: &str = "db";

/// Fixed field list of the builtin selection: (field, type, rename)
const BUILTIN_FIELDS: &[(&str, &str, Option<&str>)] = &[
    ("uptime_in_seconds", "gauge", None),
    ("connected_clients", "gauge", None),
    ("connected_slaves", "gauge", None),
    ("blocked_clients", "gauge", None),
    ("evicted_keys", "gauge", None),
    ("used_memory", "bytes", None),
    ("changes_since_last_save", "gauge", None),
    (
        "total_connections_received",
        "counter",
        Some("connections_received"),
    ),
    (
        "total_commands_processed",
        "counter",
        Some("commands_processed"),
    ),
];

/// One selected field: which field, as which metric type, under which name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeySpec {
    /// Field name in the INFO report
    pub field: String,
    /// Metric type (collectd type name)
    pub metric_type: String,
    /// Type-instance override; the field name is used when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rename: Option<String>,
}

impl KeySpec {
    /// Create a key spec without a rename
    pub fn new(field: &str, metric_type: &str) -> Self {
        Self {
            field: field.to_string(),
            metric_type: metric_type.to_string(),
            rename: None,
        }
    }

    /// Set the type-instance override
    pub fn with_rename(mut self, rename: &str) -> Self {
        self.rename = Some(rename.to_string());
        self
    }

    /// Parse a `Keys` entry: `field`, `field:type` or `field:type:rename`
    ///
    /// # Errors
    /// Returns an error for an empty field name or an invalid metric type
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut parts = raw.splitn(3, ':');
        let field = parts.next().unwrap_or_default().trim();
        if field.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "Keys entry '{}' has an empty field name",
                raw
            )));
        }

        let metric_type = match parts.next().map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => DEFAULT_METRIC_TYPE,
        };
        validate_metric_type(metric_type)?;

        let mut spec = Self::new(field, metric_type);
        if let Some(rename) = parts.next().map(str::trim).filter(|r| !r.is_empty()) {
            spec = spec.with_rename(rename);
        }
        Ok(spec)
    }

    /// Type-instance label for this key
    pub fn type_instance(&self) -> &str {
        self.rename.as_deref().unwrap_or(&self.field)
    }
}

fn validate_metric_type(metric_type: &str) -> Result<(), ConfigError> {
    static METRIC_TYPE_RE: OnceLock<Regex> = OnceLock::new();
    let re = METRIC_TYPE_RE
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("invalid metric type regex"));

    if re.is_match(metric_type) {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(format!(
            "Invalid metric type '{}': expected letters, digits or '_'",
            metric_type
        )))
    }
}

/// Which fields of a node's report become metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Operator-chosen keys plus whole database sections
    Explicit {
        keys: Vec<KeySpec>,
        dbs: Vec<String>,
    },
    /// Fixed list of well-known fields, `vm_stats_*` and every `db*` key count
    Builtin,
}

impl Selection {
    /// Key specs of the builtin selection's fixed list
    pub fn builtin_keys() -> Vec<KeySpec> {
        BUILTIN_FIELDS
            .iter()
            .map(|(field, metric_type, rename)| {
                let spec = KeySpec::new(field, metric_type);
                match rename {
                    Some(r) => spec.with_rename(r),
                    None => spec,
                }
            })
            .collect()
    }
}

/// A configured server
pub struct Node {
    /// Registry key, used as plugin instance
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Stored for completeness; never sent to the server
    pub password: Option<String>,
    pub selection: Selection,
    client: InfoClient,
}

impl Node {
    /// Create a node and its connection handle
    pub fn new(name: &str, host: &str, port: u16, selection: Selection, timeout_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            host: host.to_string(),
            port,
            password: None,
            selection,
            client: InfoClient::new(host, port, timeout_ms),
        }
    }

    /// Connection handle
    pub fn client(&self) -> &InfoClient {
        &self.client
    }

    /// Serializable view for `--validate` output
    pub fn summary(&self) -> NodeSummary {
        let (selection, keys, dbs) = match &self.selection {
            Selection::Explicit { keys, dbs } => ("explicit", keys.clone(), dbs.clone()),
            Selection::Builtin => ("builtin", Selection::builtin_keys(), Vec::new()),
        };
        NodeSummary {
            name: self.name.clone(),
            host: self.host.clone(),
            port: self.port,
            selection,
            keys,
            dbs,
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("selection", &self.selection)
            .finish()
    }
}

/// Summary of a configured node
#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub selection: &'static str,
    pub keys: Vec<KeySpec>,
    pub dbs: Vec<String>,
}

/// Configured nodes in definition order
#[derive(Debug, Default)]
pub struct Registry {
    nodes: Vec<Node>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node; a node with the same name is replaced in place
    ///
    /// Returns `true` when an existing node was replaced.
    pub fn insert(&mut self, node: Node) -> bool {
        match self.nodes.iter_mut().find(|n| n.name == node.name) {
            Some(existing) => {
                *existing = node;
                true
            }
            None => {
                self.nodes.push(node);
                false
            }
        }
    }

    /// Look up a node by name
    pub fn get(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Iterate nodes in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Walk the plugin configuration tree
///
/// Returns the verbose flag and the node registry. Unknown top-level keys are
/// logged and skipped; unknown keys inside a `Node` block are ignored.
///
/// # Arguments
/// * `items` - Top-level plugin configuration blocks
/// * `timeout_ms` - Request timeout for each node's connection handle
///
/// # Errors
/// Returns an error when a recognized key carries an unusable value
pub fn configure(items: &[ConfigItem], timeout_ms: u64) -> Result<(bool, Registry), ConfigError> {
    let mut verbose = false;
    let mut nodes = Vec::new();

    for item in items {
        match item.key.as_str() {
            "Node" => nodes.push(item),
            "Verbose" => verbose = item.first_value()?.as_bool(),
            other => warn!(key = %other, "Unknown config key"),
        }
    }

    let mut registry = Registry::new();
    for item in nodes {
        let node = configure_node(item, timeout_ms)?;
        if verbose {
            info!(
                node = %node.name,
                host = %node.host,
                port = node.port,
                "Configured node"
            );
        }
        let name = node.name.clone();
        if registry.insert(node) {
            warn!(node = %name, "Duplicate node definition, later one wins");
        }
    }

    Ok((verbose, registry))
}

fn configure_node(item: &ConfigItem, timeout_ms: u64) -> Result<Node, ConfigError> {
    let name = item.first_value()?.to_string();
    if name.is_empty() {
        return Err(ConfigError::ValidationError(
            "Node name must not be empty".to_string(),
        ));
    }

    let mut host = DEFAULT_HOST.to_string();
    let mut port = DEFAULT_PORT;
    let mut password = None;
    let mut keys: Option<Vec<KeySpec>> = None;
    let mut dbs: Option<Vec<String>> = None;

    for param in &item.children {
        match param.key.as_str() {
            "Host" => host = param.first_value()?.to_string(),
            "Port" => port = parse_port(param.first_value()?)?,
            "Password" => password = Some(param.first_value()?.to_string()),
            "Keys" => {
                let keys = keys.get_or_insert_with(Vec::new);
                for value in &param.values {
                    keys.push(KeySpec::parse(&value.to_string())?);
                }
            }
            "Dbs" => {
                let dbs = dbs.get_or_insert_with(Vec::new);
                for value in &param.values {
                    dbs.push(normalize_db(value)?);
                }
            }
            _ => {}
        }
    }

    let selection = match (keys, dbs) {
        (None, None) => Selection::Builtin,
        (keys, dbs) => Selection::Explicit {
            keys: keys.unwrap_or_default(),
            dbs: dbs.unwrap_or_default(),
        },
    };

    let mut node = Node::new(&name, &host, port, selection, timeout_ms);
    node.password = password;
    Ok(node)
}

fn parse_port(value: &ConfigValue) -> Result<u16, ConfigError> {
    value
        .as_integer()
        .and_then(|p| u16::try_from(p).ok())
        .filter(|p| *p > 0)
        .ok_or_else(|| ConfigError::ValidationError(format!("Invalid port '{}'", value)))
}

/// Normalize a `Dbs` entry to `db<N>`
///
/// Values already starting with `db` are kept as given.
pub fn normalize_db(value: &ConfigValue) -> Result<String, ConfigError> {
    if let ConfigValue::String(s) = value {
        if s.starts_with(DB_PREFIX) {
            return Ok(s.clone());
        }
    }

    value
        .as_integer()
        .filter(|n| *n >= 0)
        .map(|n| format!("{}{}", DB_PREFIX, n))
        .ok_or_else(|| ConfigError::ValidationError(format!("Invalid database '{}'", value)))
}

//! End-to-end dispatch tests
//!
//! YAML configuration -> registry -> canned INFO reports -> recorded points.

use std::collections::HashMap;

use redis_info_collector::collector::{InfoSource, RawReport};
use redis_info_collector::config::Config;
use redis_info_collector::dispatcher::EmptyFetchPolicy;
use redis_info_collector::error::FetchError;
use redis_info_collector::registry::Node;
use redis_info_collector::runner::Runner;
use redis_info_collector::sink::{MemorySink, PutvalSink};

/// Canned reports by node name; unknown nodes time out
#[derive(Default)]
struct CannedSource(HashMap<&'static str, Option<&'static str>>);

impl CannedSource {
    fn report(mut self, node: &'static str, text: &'static str) -> Self {
        self.0.insert(node, Some(text));
        self
    }

    fn no_data(mut self, node: &'static str) -> Self {
        self.0.insert(node, None);
        self
    }
}

impl InfoSource for CannedSource {
    async fn fetch(&self, node: &Node) -> Result<Option<RawReport>, FetchError> {
        match self.0.get(node.name.as_str()) {
            Some(Some(text)) => Ok(Some(text.lines().map(str::to_string).collect())),
            Some(None) => Ok(None),
            None => Err(FetchError::Timeout(5000)),
        }
    }
}

const PRIMARY_REPORT: &str = "\
# Server
redis_version:7.2.4
uptime_in_seconds:86400

# Clients
connected_clients:12
blocked_clients:0

# Memory
used_memory:1048576
mem_fragmentation_ratio:1.12

# Persistence
rdb_changes_since_last_save:17

# Stats
total_connections_received:900
total_commands_processed:123456
evicted_keys:4

# Replication
role:master
connected_slaves:1

# Keyspace
db0:keys=120,expires=8,avg_ttl=3000
db3:keys=5,expires=0,avg_ttl=0
";

fn points(sink: &MemorySink) -> Vec<(String, String, String, i64)> {
    sink.points()
        .iter()
        .map(|p| {
            (
                p.plugin_instance.clone(),
                p.metric_type.clone(),
                p.type_instance.clone(),
                p.value,
            )
        })
        .collect()
}

fn point(
    node: &str,
    metric_type: &str,
    type_instance: &str,
    value: i64,
) -> (String, String, String, i64) {
    (
        node.to_string(),
        metric_type.to_string(),
        type_instance.to_string(),
        value,
    )
}

#[tokio::test]
async fn test_explicit_keys_and_databases() {
    let config = Config::from_yaml(
        r#"
plugin:
  - key: Node
    values: [primary]
    children:
      - { key: Keys, values: ["uptime_in_seconds", "used_memory:bytes", "total_commands_processed:counter:commands"] }
      - { key: Dbs, values: [0, db7] }
"#,
    )
    .unwrap();
    let mut runner = Runner::with_sink(config, MemorySink::new()).unwrap();
    let source = CannedSource::default().report("primary", PRIMARY_REPORT);

    let summary = runner.tick(&source).await.unwrap();

    assert_eq!(
        points(runner.sink()),
        vec![
            point("primary", "gauge", "uptime_in_seconds", 86400),
            point("primary", "bytes", "used_memory", 1048576),
            point("primary", "counter", "commands", 123456),
            point("primary", "gauge", "db0-avg_ttl", 3000),
            point("primary", "gauge", "db0-expires", 8),
            point("primary", "gauge", "db0-keys", 120),
        ]
    );
    assert_eq!(summary.databases_missing, 1);
    assert_eq!(summary.metrics_emitted, 6);
}

#[tokio::test]
async fn test_builtin_selection() {
    let config = Config::from_yaml(
        r#"
plugin:
  - key: Node
    values: [legacy]
"#,
    )
    .unwrap();
    let mut runner = Runner::with_sink(config, MemorySink::new()).unwrap();
    let source = CannedSource::default().report("legacy", PRIMARY_REPORT);

    runner.tick(&source).await.unwrap();
    let emitted = points(runner.sink());

    assert!(emitted.contains(&point("legacy", "gauge", "uptime_in_seconds", 86400)));
    assert!(emitted.contains(&point("legacy", "bytes", "used_memory", 1048576)));
    // legacy alias for changes_since_last_save
    assert!(emitted.contains(&point("legacy", "gauge", "changes_since_last_save", 17)));
    assert!(emitted.contains(&point("legacy", "counter", "connections_received", 900)));
    assert!(emitted.contains(&point("legacy", "counter", "commands_processed", 123456)));
    assert!(emitted.contains(&point("legacy", "gauge", "db0-keys", 120)));
    assert!(emitted.contains(&point("legacy", "gauge", "db3-keys", 5)));
    assert!(!emitted.iter().any(|p| p.2 == "db0-expires"));
}

#[tokio::test]
async fn test_empty_fetch_aborts_remaining_nodes() {
    let config = Config::from_yaml(
        r#"
plugin:
  - key: Node
    values: [a]
    children: [{ key: Keys, values: [uptime_in_seconds] }]
  - key: Node
    values: [b]
    children: [{ key: Keys, values: [uptime_in_seconds] }]
  - key: Node
    values: [c]
    children: [{ key: Keys, values: [uptime_in_seconds] }]
"#,
    )
    .unwrap();
    let source = CannedSource::default()
        .report("a", "uptime_in_seconds:1")
        .no_data("b")
        .report("c", "uptime_in_seconds:3");

    let mut runner = Runner::with_sink(config.clone(), MemorySink::new()).unwrap();
    let summary = runner.tick(&source).await.unwrap();
    assert!(summary.aborted);
    assert_eq!(points(runner.sink()), vec![point("a", "gauge", "uptime_in_seconds", 1)]);

    let mut config = config;
    config.on_empty_fetch = EmptyFetchPolicy::Continue;
    let mut runner = Runner::with_sink(config, MemorySink::new()).unwrap();
    let summary = runner.tick(&source).await.unwrap();
    assert!(!summary.aborted);
    assert_eq!(summary.nodes_failed, 1);
    assert_eq!(
        points(runner.sink()),
        vec![
            point("a", "gauge", "uptime_in_seconds", 1),
            point("c", "gauge", "uptime_in_seconds", 3),
        ]
    );
}

#[tokio::test]
async fn test_non_numeric_policy_from_config() {
    let yaml = r#"
on_non_numeric: skip
plugin:
  - key: Node
    values: [primary]
    children:
      - { key: Keys, values: [role, mem_fragmentation_ratio, connected_clients] }
"#;
    let config = Config::from_yaml(yaml).unwrap();
    let mut runner = Runner::with_sink(config, MemorySink::new()).unwrap();
    let source = CannedSource::default().report("primary", PRIMARY_REPORT);

    let summary = runner.tick(&source).await.unwrap();
    assert_eq!(summary.fields_skipped, 2);
    assert_eq!(
        points(runner.sink()),
        vec![point("primary", "gauge", "connected_clients", 12)]
    );

    let strict = yaml.replace("on_non_numeric: skip", "on_non_numeric: fail");
    let config = Config::from_yaml(&strict).unwrap();
    let mut runner = Runner::with_sink(config, MemorySink::new()).unwrap();
    assert!(runner.tick(&source).await.is_none());
    assert!(runner.sink().points().is_empty());
}

#[tokio::test]
async fn test_duplicate_node_later_definition_wins() {
    let config = Config::from_yaml(
        r#"
plugin:
  - key: Node
    values: [primary]
    children: [{ key: Keys, values: [uptime_in_seconds] }]
  - key: Node
    values: [primary]
    children: [{ key: Keys, values: [connected_clients] }]
"#,
    )
    .unwrap();
    let mut runner = Runner::with_sink(config, MemorySink::new()).unwrap();
    assert_eq!(runner.registry().len(), 1);

    let source = CannedSource::default().report("primary", PRIMARY_REPORT);
    runner.tick(&source).await.unwrap();
    assert_eq!(
        points(runner.sink()),
        vec![point("primary", "gauge", "connected_clients", 12)]
    );
}

#[tokio::test]
async fn test_putval_output() {
    let config = Config::from_yaml(
        r#"
plugin:
  - key: Node
    values: [primary]
    children: [{ key: Keys, values: ["used_memory:bytes"] }]
"#,
    )
    .unwrap();
    let sink = PutvalSink::new(Vec::new(), "cache-01", 10);
    let mut runner = Runner::with_sink(config, sink).unwrap();
    let source = CannedSource::default().report("primary", PRIMARY_REPORT);

    runner.tick(&source).await.unwrap();

    let output = String::from_utf8(runner.into_sink().into_inner()).unwrap();
    assert_eq!(
        output,
        "PUTVAL \"cache-01/redis_info-primary/bytes-used_memory\" interval=10 N:1048576\n"
    );
}

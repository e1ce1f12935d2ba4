//! Collection loop
//!
//! Configures the registry once, then runs a read tick on every interval
//! until the process is asked to stop.

use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::collector::{InfoSource, LiveSource};
use crate::config::Config;
use crate::dispatcher::{Dispatcher, TickSummary};
use crate::error::AppResult;
use crate::registry::{configure, Registry};
use crate::sink::{ConfiguredSink, MetricSink};

/// Owns the configured registry and sink
#[derive(Debug)]
pub struct Runner<K = ConfiguredSink> {
    config: Config,
    registry: Registry,
    verbose: bool,
    sink: K,
}

impl Runner<ConfiguredSink> {
    /// Configure the registry and sink from the loaded configuration
    ///
    /// # Errors
    /// Returns an error if the plugin tree is invalid or the sink cannot be built
    pub fn from_config(config: Config) -> AppResult<Self> {
        let sink = ConfiguredSink::from_config(&config)?;
        Self::with_sink(config, sink)
    }
}

impl<K: MetricSink> Runner<K> {
    /// Configure the registry and use the given sink
    pub fn with_sink(config: Config, sink: K) -> AppResult<Self> {
        let (verbose, registry) = configure(&config.plugin, config.timeout_ms)?;
        if registry.is_empty() {
            warn!("No nodes configured, nothing will be collected");
        }

        Ok(Self {
            config,
            registry,
            verbose,
            sink,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Consume the runner and return its sink
    pub fn into_sink(self) -> K {
        self.sink
    }

    /// Run one read tick against `source` and flush the sink
    ///
    /// Tick and flush failures are logged; `None` means the tick failed.
    pub async fn tick<S: InfoSource>(&mut self, source: &S) -> Option<TickSummary> {
        let dispatcher = Dispatcher::new(&self.registry)
            .with_verbose(self.verbose)
            .with_empty_fetch_policy(self.config.on_empty_fetch)
            .with_non_numeric_policy(self.config.on_non_numeric);

        let outcome = dispatcher.read_tick(source, &mut self.sink).await;

        if let Err(e) = self.sink.flush().await {
            error!(error = %e, "Failed to flush metrics");
        }

        match outcome {
            Ok(summary) => {
                if summary.aborted {
                    warn!(
                        nodes_polled = summary.nodes_polled,
                        "Read tick aborted after a node returned no data"
                    );
                }
                Some(summary)
            }
            Err(e) => {
                error!(error = %e, "Read tick failed");
                None
            }
        }
    }

    /// Run a single tick against the live servers
    pub async fn run_once(&mut self) -> Option<TickSummary> {
        self.tick(&LiveSource).await
    }

    /// Tick on the configured interval until Ctrl+C or SIGTERM
    pub async fn run(mut self) -> Result<()> {
        let period = Duration::from_secs(self.config.interval_secs);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            nodes = self.registry.len(),
            interval_secs = self.config.interval_secs,
            "Collector started"
        );

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    self.run_once().await;
                }
            }
        }

        info!("Collector shutdown complete");
        Ok(())
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::RawReport;
    use crate::error::FetchError;
    use crate::registry::Node;
    use crate::sink::MemorySink;

    struct FixedSource(Vec<&'static str>);

    impl InfoSource for FixedSource {
        async fn fetch(&self, _node: &Node) -> Result<Option<RawReport>, FetchError> {
            Ok(Some(self.0.iter().map(|l| l.to_string()).collect()))
        }
    }

    fn config() -> Config {
        Config::from_yaml(
            r#"
plugin:
  - key: Node
    values: [a]
    children:
      - { key: Keys, values: [uptime_in_seconds, role] }
"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_tick_flushes_sink() {
        let mut runner = Runner::with_sink(config(), MemorySink::new()).unwrap();
        let source = FixedSource(vec!["uptime_in_seconds:5", "role:7"]);

        let summary = runner.tick(&source).await.unwrap();
        assert_eq!(summary.metrics_emitted, 2);
        assert_eq!(runner.sink().flushes(), 1);
    }

    #[tokio::test]
    async fn test_failed_tick_still_flushes() {
        let mut runner = Runner::with_sink(config(), MemorySink::new()).unwrap();
        let source = FixedSource(vec!["uptime_in_seconds:5", "role:master"]);

        assert!(runner.tick(&source).await.is_none());
        assert_eq!(runner.sink().points().len(), 1);
        assert_eq!(runner.sink().flushes(), 1);
    }

    #[test]
    fn test_invalid_plugin_tree_is_rejected() {
        let mut config = config();
        config.plugin[0].children[0].key = "Port".to_string();
        assert!(Runner::with_sink(config, MemorySink::new()).is_err());
    }
}

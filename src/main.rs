//! redis-info-collector - Redis INFO metrics collector
//!
//! This binary polls Redis servers for their INFO report and emits the
//! selected fields as collectd metrics on a fixed interval.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use redis_info_collector::cli::{Cli, LogFormat, ValidationReport};
use redis_info_collector::config::Config;
use redis_info_collector::registry::configure;
use redis_info_collector::runner::Runner;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    redis_info_collector::init_logging(
        &cli.log_level.to_string(),
        cli.log_format == LogFormat::Json,
    )?;

    if cli.validate {
        return validate(&cli);
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting redis-info-collector"
    );

    let mut config = Config::load_or_default(&cli.config)?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    let mut runner = Runner::from_config(config)?;

    if cli.once {
        let summary = runner
            .run_once()
            .await
            .context("Read tick failed")?;
        info!(
            metrics = summary.metrics_emitted,
            failed = summary.nodes_failed,
            "Single tick complete"
        );
        return Ok(());
    }

    runner.run().await
}

/// Load, override and validate the configuration, then print the nodes
fn validate(cli: &Cli) -> Result<()> {
    let mut config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    let (verbose, registry) = configure(&config.plugin, config.timeout_ms)?;
    let report = ValidationReport::new(&config, verbose, &registry);
    let output = report.render(cli.output_format)?;
    println!("{}", output.trim_end());

    Ok(())
}

//! CLI command implementations
//!
//! Boot order for both commands:
//! 1. Configuration load and validation
//! 2. Log severity from `logLevel`
//! 3. Query context (built once per process)

use std::io;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use crate::accumulator::ModPowEncryptor;
use crate::config::ResponderConfig;
use crate::observability::{log_event, log_event_with_fields, Event, Logger, MetricsRegistry};
use crate::pipeline::{Pipeline, PipelineHandles};
use crate::query::{QueryContext, SharedQueryContext};

use super::args::Command;
use super::echo::run_echo;
use super::errors::{CliError, CliResult};
use super::io::{forward_records, write_response};

static QUERY_CONTEXT: SharedQueryContext = SharedQueryContext::new();

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Check { config } => check(&config),
        Command::Run { config } => run_stream(&config),
    }
}

fn boot(config_path: &Path) -> CliResult<(ResponderConfig, Arc<QueryContext>)> {
    log_event(Event::BootStart);

    let config = ResponderConfig::load(config_path)?;
    Logger::set_min_severity(config.log_severity()?);
    log_event_with_fields(
        Event::ConfigLoaded,
        &[
            ("path", &config_path.display().to_string()),
            ("accumulators", &config.accumulator_instances.to_string()),
            ("downstream", &config.downstream_parallelism.to_string()),
        ],
    );

    let context = QUERY_CONTEXT.get_or_init(&config.query)?;
    Ok((config, context))
}

/// Validate the configuration and print a summary
pub fn check(config_path: &Path) -> CliResult<()> {
    let (config, context) = boot(config_path)?;

    write_response(json!({
        "valid": true,
        "rows": context.row_count(),
        "partitionBytes": context.info().partition_bytes(),
        "timeToFlush": config.time_to_flush,
        "ackDeadline": config.ack_deadline,
        "accumulatorInstances": config.accumulator_instances,
        "downstreamParallelism": config.downstream_parallelism,
        "splitPartitions": config.split_partitions,
    }))
}

/// Stream stdin through the pipeline into an echo downstream tier
pub fn run_stream(config_path: &Path) -> CliResult<()> {
    let (config, context) = boot(config_path)?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::runtime_error(format!("Failed to create tokio runtime: {}", e)))?;

    let metrics = Arc::new(MetricsRegistry::new());
    rt.block_on(stream_stdin(&config, context, Arc::clone(&metrics)))?;

    log_event_with_fields(Event::MetricsSnapshot, &[("metrics", &metrics.to_json())]);
    Ok(())
}

async fn stream_stdin(
    config: &ResponderConfig,
    context: Arc<QueryContext>,
    metrics: Arc<MetricsRegistry>,
) -> CliResult<()> {
    let (pipeline, handles) = Pipeline::spawn(
        config,
        context,
        Arc::new(ModPowEncryptor),
        Arc::clone(&metrics),
    );
    let PipelineHandles {
        records,
        downstream,
        session_ends,
        ..
    } = handles;

    let echoes: Vec<_> = downstream
        .into_iter()
        .map(|port| tokio::spawn(run_echo(port, session_ends.clone())))
        .collect();
    drop(session_ends);

    // Dropping `records` when stdin ends starts the drain.
    let reader_metrics = Arc::clone(&metrics);
    let forwarded = tokio::task::spawn_blocking(move || {
        forward_records(io::stdin().lock(), &records, &reader_metrics)
    })
    .await
    .map_err(|e| CliError::runtime_error(format!("stdin reader failed: {}", e)))
    .and_then(|result| result);

    // Output already accepted is drained even when reading failed.
    pipeline.join().await?;
    let submitted = forwarded?;

    let mut printed = 0;
    for echo in echoes {
        let summary = echo
            .await
            .map_err(|e| CliError::runtime_error(format!("echo downstream failed: {}", e)))?;
        printed += summary.elements;
    }

    log_event_with_fields(
        Event::StreamComplete,
        &[
            ("records", &submitted.to_string()),
            ("elements", &printed.to_string()),
        ],
    );
    Ok(())
}

//! Beacon event dispatcher.
//!
//! Reads newline-delimited JSON log events from stdin and hands each one to
//! the dispatch engine. On end of input, Ctrl-C or SIGTERM the engine drains
//! for up to the configured close timeout and a run summary is printed to
//! stdout as one JSON line. Logs go to stderr.

use anyhow::{Context, Result};
use beacon_dispatch::{DispatchEngine, EngineStats, LogEvent};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

mod config;

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config.log_level);

    info!(
        queue_capacity = config.queue_capacity,
        worker_count = config.worker_count,
        max_connections = config.max_connections,
        connections_per_route = config.connections_per_route,
        "starting beacon"
    );

    let engine = DispatchEngine::new(config.to_dispatch_config())
        .context("failed to start dispatch engine")?;

    let input = tokio::select! {
        result = pump_stdin(&engine) => result?,
        () = shutdown_signal() => {
            info!("shutdown signal received, stopping intake");
            InputSummary::default()
        },
    };

    let undelivered = engine.shutdown_graceful(config.close_timeout()).await;
    let summary = RunSummary {
        lines_read: input.lines_read,
        malformed_lines: input.malformed_lines,
        undelivered,
        stats: engine.stats(),
    };

    info!(
        lines_read = summary.lines_read,
        malformed_lines = summary.malformed_lines,
        undelivered,
        delivered = summary.stats.successful_deliveries,
        "beacon shutdown complete"
    );
    println!("{}", serde_json::to_string(&summary).context("failed to encode run summary")?);

    Ok(())
}

/// Counts of what was read from stdin.
#[derive(Debug, Default)]
struct InputSummary {
    lines_read: u64,
    malformed_lines: u64,
}

/// Final report written to stdout.
#[derive(Debug, Serialize)]
struct RunSummary {
    lines_read: u64,
    malformed_lines: u64,
    undelivered: usize,
    #[serde(flatten)]
    stats: EngineStats,
}

/// Dispatches every well-formed line until stdin closes.
async fn pump_stdin(engine: &DispatchEngine) -> Result<InputSummary> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut summary = InputSummary::default();

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        summary.lines_read += 1;
        match serde_json::from_str::<LogEvent>(line) {
            Ok(event) => engine.dispatch(event),
            Err(e) => {
                summary.malformed_lines += 1;
                warn!(line_number = summary.lines_read, error = %e, "skipping malformed event");
            },
        }
    }

    debug!(lines_read = summary.lines_read, "stdin closed");
    Ok(summary)
}

/// Initializes tracing, preferring `RUST_LOG` over the configured level.
fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received Ctrl+C");
        },
        () = terminate => {
            info!("received SIGTERM");
        },
    }
}

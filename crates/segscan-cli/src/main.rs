#![doc = include_str!("../README.md")]

mod config;
mod observer;
mod seed;
mod telemetry;

use anyhow::Context;
use clap::Parser;
use config::{CliArgs, CliConfig, OutputFormat};
use observer::TelemetryObserver;
use segscan::{ScanOutcome, Scanner};
use std::io::{BufWriter, Write};
use std::sync::Arc;
use telemetry::init_telemetry;
use tokio::signal;
use tokio_util::sync::CancellationToken;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = CliConfig::try_from(args)?;

    let providers = init_telemetry(config.log_format)?;
    log_startup_info(&config);

    let store = Arc::new(seed::seeded_store(&config));
    let scanner = Scanner::new(config.scan.clone(), store)
        .with_observer(Arc::new(TelemetryObserver::default()));

    let cancel = CancellationToken::new();
    let signals = tokio::spawn(shutdown_signal(cancel.clone()));
    let outcome = scanner.scan_with_cancellation(cancel).await;
    signals.abort();

    let result = outcome
        .map_err(anyhow::Error::from)
        .and_then(|outcome| finish(outcome, &config));
    providers.shutdown();
    result
}

/// Prints the outcome and decides the exit status.
fn finish(outcome: ScanOutcome, config: &CliConfig) -> anyhow::Result<()> {
    match config.output {
        OutputFormat::Summary => print_summary(&outcome)?,
        OutputFormat::Json => print_items(&outcome)?,
    }

    if config.allow_partial || outcome.is_complete() {
        return Ok(());
    }

    let failed = outcome
        .failures()
        .map(|f| format!("segment {}: {}", f.segment, f.error))
        .collect::<Vec<_>>()
        .join("; ");
    outcome
        .into_complete()
        .map(drop)
        .with_context(|| format!("Failed segments: {failed}"))
}

fn print_summary(outcome: &ScanOutcome) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    writeln!(out, "Scanning {} took {:?}", outcome.len(), outcome.elapsed())?;
    for report in outcome.segments() {
        let status = match report.error() {
            None => "completed".to_owned(),
            Some(err) => format!("failed: {err}"),
        };
        writeln!(
            out,
            "  segment {}: {} items in {} pages, {:?}, {}",
            report.segment, report.items, report.pages, report.elapsed, status
        )?;
    }
    Ok(())
}

fn print_items(outcome: &ScanOutcome) -> anyhow::Result<()> {
    let mut out = BufWriter::new(std::io::stdout().lock());
    for item in outcome.items() {
        serde_json::to_writer(&mut out, item)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    eprintln!("Scanning {} took {:?}", outcome.len(), outcome.elapsed());
    Ok(())
}

fn log_startup_info(_config: &CliConfig) {
    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::info!("Starting scan with full config: {:#?}", _config);
    } else {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting scan of {} seeded items with {} segments",
            _config.seed_items,
            _config.scan.parallelism()
        );
    }
}

/// Cancels `cancel` on Ctrl+C or SIGTERM. In-flight segments stop at their
/// next page and the partial result is still reported.
async fn shutdown_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Failed to install SIGTERM handler: {:?}", _e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(_e) = signal::ctrl_c().await {
            #[cfg(feature = "tracing")]
            tracing::warn!("Failed to install Ctrl+C handler: {:?}", _e);
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received SIGTERM signal");
        },
    }

    #[cfg(feature = "tracing")]
    tracing::info!("Shutdown signal received, cancelling scan...");
    cancel.cancel();
}

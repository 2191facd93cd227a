//! plur-sweep - Background daemon for scheduled pruning
//!
//! Runs the pruning pipeline for every enabled platform on its own interval
//! and serves the live status over HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use futures::future::join_all;
use libplurprune::config::Config;
use libplurprune::logging;
use libplurprune::metrics::{install_prometheus, MetricsSink, NoopMetrics, PrometheusMetrics};
use libplurprune::prune::{ContinuationDriver, PruneOptions};
use libplurprune::server::{serve, AppState, PlatformJob, PlatformScheduler, StatusStore};
use libplurprune::PruneError;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "plur-sweep")]
#[command(version)]
#[command(about = "Background daemon that prunes old posts on a schedule")]
#[command(long_about = "\
plur-sweep - Background daemon that prunes old posts on a schedule

DESCRIPTION:
    plur-sweep is a long-running daemon that prunes every enabled platform
    in the config file on its own interval. A platform never has two runs
    in flight: a tick that arrives while the previous run is still going
    is dropped and counted.

    Live status is served over HTTP:
        /                      status page
        /api/status            all platforms as JSON
        /api/status/<name>     one platform as JSON
        /metrics               Prometheus metrics
        /healthz               liveness

USAGE:
    # Run in foreground (logs to stderr)
    plur-sweep

    # Preview every platform once and exit
    plur-sweep --once --dry-run

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (runs stop at their next round)

CONFIGURATION:
    Configuration file: ~/.config/plurprune/config.toml

    [prune]
    max_age = \"1y\"
    unlike = true

    [server]
    bind = \"127.0.0.1:8787\"
    shutdown_grace = \"30s\"
    default_interval = \"6h\"

    [[platforms]]
    name = \"mastodon\"
    kind = \"archive\"
    path = \"~/exports/mastodon.json\"
    interval = \"12h\"

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Authentication error
    3 - Configuration error
")]
struct Cli {
    /// Config file (defaults to ~/.config/plurprune/config.toml)
    #[arg(short, long, value_name = "PATH", env = "PLURPRUNE_CONFIG")]
    config: Option<PathBuf>,

    /// Status server address (overrides config)
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,

    /// Classify and report without changing anything
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Do not install the Prometheus recorder
    #[arg(long)]
    no_metrics: bool,

    /// Run every platform once, print the summaries, and exit
    #[arg(long)]
    once: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logging::config_from_env(cli.verbose).init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(exit_code(&e));
        }
    }
}

/// Exit code for an error, taken from the library error when there is one
fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<PruneError>()
        .map(PruneError::exit_code)
        .unwrap_or(1)
}

async fn run(cli: Cli) -> Result<i32> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    config.validate()?;

    let mut options = config.prune.to_options()?;
    options.dry_run |= cli.dry_run;

    if config.enabled_platforms().next().is_none() {
        return Err(PruneError::InvalidInput("no enabled platforms in config".to_string()).into());
    }

    if cli.once {
        run_once(&config, options).await
    } else {
        run_daemon(&cli, &config, options).await
    }
}

/// Run every platform to completion concurrently
async fn run_once(config: &Config, options: PruneOptions) -> Result<i32> {
    let mut drivers = Vec::new();
    for platform in config.enabled_platforms() {
        let source = platform.open_source()?;
        drivers.push(ContinuationDriver::new(source, platform.user.clone(), options.clone())?);
    }

    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone())?;

    info!(platforms = drivers.len(), dry_run = options.dry_run, "Running every platform once");
    let summaries = join_all(drivers.iter().map(|d| d.run_until_cancelled(true, &cancel))).await;
    cancel.cancel();

    let mut failed = false;
    for summary in &summaries {
        failed |= summary.is_fetch_error() || summary.result.error_count > 0;
        println!(
            "{}",
            json!({
                "run": summary,
                "totals": summary.result.summary(),
                "errors": summary.result.errors,
            })
        );
    }

    Ok(if failed { 1 } else { 0 })
}

async fn run_daemon(cli: &Cli, config: &Config, options: PruneOptions) -> Result<i32> {
    info!("plur-sweep daemon starting");

    let grace = config.server.shutdown_grace()?;
    let metrics_handle = if cli.no_metrics {
        None
    } else {
        Some(install_prometheus().context("Failed to install metrics recorder")?)
    };
    let sink: Arc<dyn MetricsSink> = match metrics_handle {
        Some(_) => Arc::new(PrometheusMetrics),
        None => Arc::new(NoopMetrics),
    };

    let status = StatusStore::new();
    let mut scheduler = PlatformScheduler::new(status.clone(), sink, options)?;
    for platform in config.enabled_platforms() {
        let interval = platform.interval(&config.server)?;
        info!(
            platform = %platform.name,
            interval = ?interval,
            "Scheduling platform"
        );
        scheduler.register(PlatformJob::new(
            platform.open_source()?,
            platform.user.clone(),
            interval,
        ))?;
    }

    let bind = cli.bind.clone().unwrap_or_else(|| config.server.bind.clone());
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind status server to {}", bind))?;

    let handle = scheduler.start();
    let cancel = handle.cancellation_token();
    spawn_signal_listener(cancel.clone())?;

    let server = tokio::spawn(serve(
        listener,
        AppState::new(status.clone(), metrics_handle),
        cancel.clone(),
    ));

    cancel.cancelled().await;
    info!("Shutdown requested, stopping scheduler");
    if status.any_running() {
        info!(grace = ?grace, "Waiting for in-flight runs to reach a round boundary");
    }

    if !handle.shutdown(grace).await {
        warn!("Some runs were still in flight when the grace period ended");
    }

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Status server failed: {}", e),
        Err(e) => error!("Status server task panicked: {}", e),
    }

    info!("plur-sweep daemon stopped");
    Ok(0)
}

/// Cancel `cancel` on SIGINT or SIGTERM
#[cfg(unix)]
fn spawn_signal_listener(cancel: CancellationToken) -> Result<()> {
    use futures::stream::StreamExt;
    use signal_hook::consts::signal::{SIGINT, SIGTERM};
    use signal_hook_tokio::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("Signal setup failed")?;
    let handle = signals.handle();

    tokio::spawn(async move {
        tokio::select! {
            Some(signal) = signals.next() => {
                info!(signal, "Received shutdown signal, stopping gracefully...");
                cancel.cancel();
            }
            _ = cancel.cancelled() => {}
        }
        handle.close();
    });

    Ok(())
}

#[cfg(not(unix))]
fn spawn_signal_listener(cancel: CancellationToken) -> Result<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for Ctrl-C: {}", e);
                    return;
                }
                info!("Received Ctrl-C, stopping gracefully...");
                cancel.cancel();
            }
            _ = cancel.cancelled() => {}
        }
    });
    Ok(())
}

//! Metrics for pruning runs
//!
//! The pipeline reports through the [`MetricsSink`] trait so the library never
//! depends on a global recorder being installed. [`PrometheusMetrics`] emits
//! through the `metrics` facade; `plur-sweep` installs the Prometheus recorder
//! and serves its handle on `/metrics`.
//!
//! Exported series:
//! - `plurprune_rounds_total{platform}`
//! - `plurprune_actions_total{platform, action, outcome}`
//! - `plurprune_runs_total{platform, outcome}`
//! - `plurprune_run_in_progress{platform}`
//! - `plurprune_dropped_ticks_total{platform}`

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

use crate::prune::driver::RunSummary;
use crate::prune::result::RoundResult;
use crate::server::status::RunOutcome;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Failed to install metrics recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}

/// Receiver of pipeline and scheduler events
pub trait MetricsSink: Send + Sync {
    fn record_round(&self, platform: &str, round: &RoundResult);

    fn record_run(&self, summary: &RunSummary, outcome: RunOutcome);

    fn set_running(&self, platform: &str, running: bool);

    fn record_dropped_tick(&self, platform: &str);
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_round(&self, _platform: &str, _round: &RoundResult) {}

    fn record_run(&self, _summary: &RunSummary, _outcome: RunOutcome) {}

    fn set_running(&self, _platform: &str, _running: bool) {}

    fn record_dropped_tick(&self, _platform: &str) {}
}

/// Emits through whatever `metrics` recorder is current
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusMetrics;

impl PrometheusMetrics {
    /// Register metric descriptions with the current recorder
    pub fn describe() {
        describe_counter!("plurprune_rounds_total", "Pagination rounds completed");
        describe_counter!(
            "plurprune_actions_total",
            "Actions classified, by action and outcome"
        );
        describe_counter!("plurprune_runs_total", "Runs finished, by outcome");
        describe_gauge!(
            "plurprune_run_in_progress",
            "1 while a run is active for the platform"
        );
        describe_counter!(
            "plurprune_dropped_ticks_total",
            "Scheduled ticks skipped because a run was still active"
        );
    }
}

impl MetricsSink for PrometheusMetrics {
    fn record_round(&self, platform: &str, round: &RoundResult) {
        counter!("plurprune_rounds_total", "platform" => platform.to_string()).increment(1);

        for (action, outcome) in &round.actions {
            counter!(
                "plurprune_actions_total",
                "platform" => platform.to_string(),
                "action" => action.as_str(),
                "outcome" => outcome.as_str()
            )
            .increment(1);
        }
    }

    fn record_run(&self, summary: &RunSummary, outcome: RunOutcome) {
        counter!(
            "plurprune_runs_total",
            "platform" => summary.platform.clone(),
            "outcome" => outcome.as_str()
        )
        .increment(1);
    }

    fn set_running(&self, platform: &str, running: bool) {
        gauge!("plurprune_run_in_progress", "platform" => platform.to_string())
            .set(if running { 1.0 } else { 0.0 });
    }

    fn record_dropped_tick(&self, platform: &str) {
        counter!("plurprune_dropped_ticks_total", "platform" => platform.to_string())
            .increment(1);
    }
}

/// Install the global Prometheus recorder and return its render handle
///
/// # Errors
///
/// Fails if a global recorder is already installed.
pub fn install_prometheus() -> Result<PrometheusHandle, MetricsError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    PrometheusMetrics::describe();
    Ok(handle)
}

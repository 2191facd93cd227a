//! Shared per-platform status table
//!
//! Written by the scheduler as rounds and runs complete, read by the HTTP
//! surface on every request. Locks are held only for the duration of a map
//! update, never across an `.await`.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::prune::driver::{RunSummary, TerminationReason};
use crate::prune::result::RoundResult;

/// Coarse outcome of a finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    /// Every call succeeded
    Success,
    /// The run finished but some actions failed
    Partial,
    /// The platform could not be read
    Error,
}

impl RunOutcome {
    pub fn from_summary(summary: &RunSummary) -> Self {
        if summary.is_fetch_error() {
            RunOutcome::Error
        } else if summary.result.error_count > 0 {
            RunOutcome::Partial
        } else {
            RunOutcome::Success
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// History and live state of one platform
#[derive(Debug, Clone, Serialize)]
pub struct PlatformStatus {
    pub platform: String,
    pub interval_secs: u64,
    pub running: bool,
    /// Rounds completed by the run in flight
    pub current_rounds: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<RunOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_termination: Option<TerminationReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub last_rounds: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run_at: Option<DateTime<Utc>>,
    pub runs_total: u64,
    pub runs_succeeded: u64,
    pub deleted_total: u64,
    pub unliked_total: u64,
    pub unshared_total: u64,
    pub preserved_total: u64,
    pub errors_total: u64,
    pub dropped_ticks: u64,
}

impl PlatformStatus {
    fn new(platform: &str, interval: Duration) -> Self {
        Self {
            platform: platform.to_string(),
            interval_secs: interval.as_secs(),
            running: false,
            current_rounds: 0,
            last_run_at: None,
            last_outcome: None,
            last_termination: None,
            last_error: None,
            last_rounds: 0,
            next_run_at: None,
            runs_total: 0,
            runs_succeeded: 0,
            deleted_total: 0,
            unliked_total: 0,
            unshared_total: 0,
            preserved_total: 0,
            errors_total: 0,
            dropped_ticks: 0,
        }
    }
}

/// Cloneable handle to the status table
#[derive(Debug, Clone, Default)]
pub struct StatusStore {
    inner: Arc<RwLock<HashMap<String, PlatformStatus>>>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a platform with empty history
    pub fn register(&self, platform: &str, interval: Duration) {
        self.inner
            .write()
            .entry(platform.to_string())
            .or_insert_with(|| PlatformStatus::new(platform, interval));
    }

    fn update<F>(&self, platform: &str, f: F)
    where
        F: FnOnce(&mut PlatformStatus),
    {
        let mut table = self.inner.write();
        let status = table
            .entry(platform.to_string())
            .or_insert_with(|| PlatformStatus::new(platform, Duration::ZERO));
        f(status);
    }

    pub fn mark_started(&self, platform: &str, at: DateTime<Utc>) {
        self.update(platform, |status| {
            status.running = true;
            status.current_rounds = 0;
            status.last_run_at = Some(at);
        });
    }

    pub fn record_round(&self, platform: &str, round: &RoundResult) {
        self.update(platform, |status| {
            status.current_rounds = round.round;
        });
    }

    /// Fold a finished run into the history
    pub fn record_run(&self, summary: &RunSummary) {
        let outcome = RunOutcome::from_summary(summary);
        let result = &summary.result;

        self.update(&summary.platform, |status| {
            status.running = false;
            status.current_rounds = 0;
            status.last_outcome = Some(outcome);
            status.last_termination = Some(summary.termination);
            status.last_error = result.errors.last().cloned();
            status.last_rounds = summary.rounds;
            status.runs_total += 1;
            if outcome == RunOutcome::Success {
                status.runs_succeeded += 1;
            }
            status.deleted_total += result.deleted_count as u64;
            status.unliked_total += result.unliked_count as u64;
            status.unshared_total += result.unshared_count as u64;
            status.preserved_total += result.preserved_count as u64;
            status.errors_total += result.error_count as u64;
        });
    }

    pub fn record_dropped_tick(&self, platform: &str) {
        self.update(platform, |status| status.dropped_ticks += 1);
    }

    /// `None` clears the next run time
    pub fn set_next_run(&self, platform: &str, at: Option<DateTime<Utc>>) {
        self.update(platform, |status| status.next_run_at = at);
    }

    pub fn get(&self, platform: &str) -> Option<PlatformStatus> {
        self.inner.read().get(platform).cloned()
    }

    /// All platforms, sorted by name
    pub fn snapshot(&self) -> Vec<PlatformStatus> {
        let mut statuses: Vec<_> = self.inner.read().values().cloned().collect();
        statuses.sort_by(|a, b| a.platform.cmp(&b.platform));
        statuses
    }

    pub fn any_running(&self) -> bool {
        self.inner.read().values().any(|status| status.running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prune::result::PruneResult;
    use crate::types::Cursor;
    use uuid::Uuid;

    fn summary(platform: &str, termination: TerminationReason, result: PruneResult) -> RunSummary {
        RunSummary {
            run_id: Uuid::new_v4(),
            platform: platform.to_string(),
            dry_run: false,
            rounds: 3,
            termination,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            result,
        }
    }

    #[test]
    fn test_run_lifecycle() {
        let store = StatusStore::new();
        store.register("mastodon", Duration::from_secs(3600));

        store.mark_started("mastodon", Utc::now());
        assert!(store.get("mastodon").unwrap().running);
        assert!(store.any_running());

        store.record_round("mastodon", &RoundResult::new(2, Cursor::start()));
        assert_eq!(store.get("mastodon").unwrap().current_rounds, 2);

        let mut result = PruneResult::new();
        result.deleted_count = 4;
        result.preserved_count = 1;
        store.record_run(&summary("mastodon", TerminationReason::CursorStalled, result));

        let status = store.get("mastodon").unwrap();
        assert!(!status.running);
        assert_eq!(status.interval_secs, 3600);
        assert_eq!(status.last_outcome, Some(RunOutcome::Success));
        assert_eq!(status.last_rounds, 3);
        assert_eq!(status.runs_total, 1);
        assert_eq!(status.runs_succeeded, 1);
        assert_eq!(status.deleted_total, 4);
        assert_eq!(status.preserved_total, 1);
    }

    #[test]
    fn test_fetch_error_marks_outcome_error() {
        let store = StatusStore::new();
        let mut result = PruneResult::new();
        result.record_failure("fetch bluesky at cursor <start> failed: timeout".to_string());

        store.record_run(&summary("bluesky", TerminationReason::FetchError, result));

        let status = store.get("bluesky").unwrap();
        assert_eq!(status.last_outcome, Some(RunOutcome::Error));
        assert_eq!(status.runs_succeeded, 0);
        assert_eq!(
            status.last_error.as_deref(),
            Some("fetch bluesky at cursor <start> failed: timeout")
        );
    }

    #[test]
    fn test_action_errors_mark_outcome_partial() {
        let mut result = PruneResult::new();
        result.record_failure("delete x:1 failed: 404".to_string());
        let summary = summary("x", TerminationReason::Exhausted, result);
        assert_eq!(RunOutcome::from_summary(&summary), RunOutcome::Partial);
    }

    #[test]
    fn test_snapshot_sorted_and_isolated() {
        let store = StatusStore::new();
        store.register("zeta", Duration::from_secs(60));
        store.register("alpha", Duration::from_secs(60));
        store.record_dropped_tick("zeta");

        let snapshot = store.snapshot();
        assert_eq!(snapshot[0].platform, "alpha");
        assert_eq!(snapshot[1].platform, "zeta");
        assert_eq!(snapshot[0].dropped_ticks, 0);
        assert_eq!(snapshot[1].dropped_ticks, 1);
    }

    #[test]
    fn test_register_keeps_existing_history() {
        let store = StatusStore::new();
        store.register("a", Duration::from_secs(60));
        store.record_dropped_tick("a");
        store.register("a", Duration::from_secs(120));

        let status = store.get("a").unwrap();
        assert_eq!(status.dropped_ticks, 1);
        assert_eq!(status.interval_secs, 60);
    }

    #[test]
    fn test_clones_share_state() {
        let store = StatusStore::new();
        let reader = store.clone();
        store.set_next_run("a", Some(Utc::now()));
        assert!(reader.get("a").unwrap().next_run_at.is_some());
        assert!(reader.get("missing").is_none());
    }
}

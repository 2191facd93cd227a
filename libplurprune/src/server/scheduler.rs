//! Per-platform scheduling of pruning runs
//!
//! Every registered platform gets its own ticker task. A tick tries to take
//! the platform's run lock without waiting; if the previous run still holds
//! it, the tick is dropped and counted rather than queued. Runs are spawned
//! onto a shared [`TaskTracker`] so shutdown can wait for them.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, Result};
use crate::metrics::MetricsSink;
use crate::platforms::PostSource;
use crate::prune::driver::{system_clock, Clock, ContinuationDriver, RoundObserver, RunSummary};
use crate::prune::options::PruneOptions;
use crate::prune::result::RoundResult;
use crate::server::status::{RunOutcome, StatusStore};

/// One platform to prune on a schedule
pub struct PlatformJob {
    pub name: String,
    pub source: Arc<dyn PostSource>,
    pub user: String,
    pub interval: Duration,
    /// Overrides the scheduler-wide policy
    pub options: Option<PruneOptions>,
}

impl PlatformJob {
    pub fn new(source: Arc<dyn PostSource>, user: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: source.platform_name().to_string(),
            source,
            user: user.into(),
            interval,
            options: None,
        }
    }

    pub fn with_options(mut self, options: PruneOptions) -> Self {
        self.options = Some(options);
        self
    }
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Started,
    /// A run for the platform was already in progress
    Dropped,
    /// The scheduler is shutting down
    Stopped,
}

struct PlatformWorker {
    job: PlatformJob,
    run_lock: Arc<Mutex<()>>,
}

/// Feeds round and run events into the status table and metrics
struct RunReporter {
    status: StatusStore,
    metrics: Arc<dyn MetricsSink>,
}

impl RoundObserver for RunReporter {
    fn on_round(&self, platform: &str, round: &RoundResult) {
        self.status.record_round(platform, round);
        self.metrics.record_round(platform, round);
    }

    fn on_run_complete(&self, summary: &RunSummary) {
        let outcome = RunOutcome::from_summary(summary);
        self.status.record_run(summary);
        self.metrics.record_run(summary, outcome);
        self.metrics.set_running(&summary.platform, false);
    }
}

/// Runs one continuation driver per platform on independent timers
pub struct PlatformScheduler {
    status: StatusStore,
    metrics: Arc<dyn MetricsSink>,
    options: PruneOptions,
    workers: BTreeMap<String, Arc<PlatformWorker>>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    clock: Clock,
}

impl PlatformScheduler {
    /// Create a scheduler applying `options` to every platform
    ///
    /// # Errors
    ///
    /// Fails if `options` does not pass [`PruneOptions::validate`].
    pub fn new(
        status: StatusStore,
        metrics: Arc<dyn MetricsSink>,
        options: PruneOptions,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            status,
            metrics,
            options,
            workers: BTreeMap::new(),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            clock: system_clock(),
        })
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Add a platform
    ///
    /// # Errors
    ///
    /// Fails for a duplicate name, a zero interval, or per-job options that
    /// do not validate.
    pub fn register(&mut self, job: PlatformJob) -> Result<()> {
        if let Some(options) = &job.options {
            options.validate()?;
        }
        if self.workers.contains_key(&job.name) {
            return Err(ConfigError::InvalidValue {
                field: "platforms".to_string(),
                reason: format!("platform '{}' registered twice", job.name),
            }
            .into());
        }
        if job.interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: format!("platforms.{}.interval", job.name),
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }

        self.status.register(&job.name, job.interval);
        info!(
            platform = %job.name,
            interval = %humantime::format_duration(job.interval),
            "Registered platform"
        );
        self.workers.insert(
            job.name.clone(),
            Arc::new(PlatformWorker {
                job,
                run_lock: Arc::new(Mutex::new(())),
            }),
        );
        Ok(())
    }

    pub fn platforms(&self) -> Vec<&str> {
        self.workers.keys().map(String::as_str).collect()
    }

    pub fn status(&self) -> &StatusStore {
        &self.status
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Attempt one run for `platform` right now
    ///
    /// # Errors
    ///
    /// Fails if the platform was never registered.
    pub fn try_run(&self, platform: &str) -> Result<TickOutcome> {
        let worker = self
            .workers
            .get(platform)
            .ok_or_else(|| ConfigError::UnknownPlatform(platform.to_string()))?;
        Ok(self.tick(worker))
    }

    fn tick(&self, worker: &PlatformWorker) -> TickOutcome {
        let platform = worker.job.name.as_str();

        if self.cancel.is_cancelled() {
            debug!(platform = %platform, "Scheduler stopping, ignoring tick");
            return TickOutcome::Stopped;
        }

        let guard = match worker.run_lock.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                warn!(platform = %platform, "Previous run still in progress, dropping tick");
                self.status.record_dropped_tick(platform);
                self.metrics.record_dropped_tick(platform);
                return TickOutcome::Dropped;
            }
        };

        self.status.mark_started(platform, (self.clock)());
        self.metrics.set_running(platform, true);

        let options = worker
            .job
            .options
            .clone()
            .unwrap_or_else(|| self.options.clone());
        let reporter = Arc::new(RunReporter {
            status: self.status.clone(),
            metrics: self.metrics.clone(),
        });
        let driver = ContinuationDriver::assemble(
            worker.job.source.clone(),
            worker.job.user.clone(),
            options,
        )
        .with_observer(reporter)
        .with_clock(self.clock.clone());
        let cancel = self.cancel.clone();

        self.tracker.spawn(async move {
            let _guard = guard;
            driver.run_until_cancelled(true, &cancel).await;
        });
        TickOutcome::Started
    }

    async fn tick_loop(&self, worker: Arc<PlatformWorker>) {
        let platform = worker.job.name.as_str();
        let period = worker.job.interval;
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(platform = %platform, "Ticker stopped");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick(&worker);
                    self.status.set_next_run(platform, next_run_after(Utc::now(), period));
                }
            }
        }
    }

    /// Spawn one ticker per platform; the first tick fires immediately
    pub fn start(self) -> SchedulerHandle {
        let scheduler = Arc::new(self);
        let tracker = scheduler.tracker.clone();

        for worker in scheduler.workers.values() {
            let scheduler = scheduler.clone();
            let worker = worker.clone();
            tracker.spawn(async move { scheduler.tick_loop(worker).await });
        }

        info!(platforms = scheduler.workers.len(), "Scheduler started");
        SchedulerHandle { scheduler }
    }

    /// Stop ticking and wait up to `grace` for in-flight runs
    ///
    /// Runs are not interrupted mid-round; they stop at their next round
    /// boundary. Returns false if the grace period ran out first.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        info!(grace = %humantime::format_duration(grace), "Shutting down scheduler");
        self.cancel.cancel();
        self.tracker.close();

        match timeout(grace, self.tracker.wait()).await {
            Ok(()) => {
                info!("All platform workers stopped");
                true
            }
            Err(_) => {
                warn!(
                    remaining = self.tracker.len(),
                    "Grace period elapsed with runs still in flight"
                );
                false
            }
        }
    }
}

/// When a tick after `now` is due, or `None` past the calendar range
fn next_run_after(now: DateTime<Utc>, period: Duration) -> Option<DateTime<Utc>> {
    TimeDelta::from_std(period)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
}

/// Handle to a started scheduler
#[derive(Clone)]
pub struct SchedulerHandle {
    scheduler: Arc<PlatformScheduler>,
}

impl SchedulerHandle {
    pub fn status(&self) -> &StatusStore {
        self.scheduler.status()
    }

    pub fn try_run(&self, platform: &str) -> Result<TickOutcome> {
        self.scheduler.try_run(platform)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.scheduler.cancellation_token()
    }

    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.scheduler.shutdown(grace).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PruneError;
    use crate::metrics::NoopMetrics;
    use crate::platforms::mock::{MockConfig, MockSource};
    use crate::platforms::Page;
    use crate::prune::driver::TerminationReason;
    use crate::types::{Post, PostKind};
    use tokio::sync::Semaphore;

    fn old_post(id: &str) -> Post {
        Post::new(id, "alice", PostKind::Original, Utc::now() - TimeDelta::days(90))
    }

    fn options() -> PruneOptions {
        PruneOptions::builder()
            .max_age(Duration::from_secs(30 * 86_400))
            .action_delay(Duration::ZERO)
            .round_delay(Duration::ZERO)
            .build()
            .unwrap()
    }

    fn scheduler() -> PlatformScheduler {
        PlatformScheduler::new(StatusStore::new(), Arc::new(NoopMetrics), options()).unwrap()
    }

    fn gated(name: &str, gate: &Arc<Semaphore>) -> MockSource {
        MockSource::new(MockConfig {
            name: name.to_string(),
            pages: vec![Page::last(vec![old_post("1")])],
            fetch_gate: Some(gate.clone()),
            ..Default::default()
        })
    }

    fn job(source: &MockSource) -> PlatformJob {
        PlatformJob::new(Arc::new(source.clone()), "me", Duration::from_secs(3600))
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_dropped_not_queued() {
        let gate = Arc::new(Semaphore::new(0));
        let source = gated("mastodon", &gate);
        let mut scheduler = scheduler();
        scheduler.register(job(&source)).unwrap();

        assert_eq!(scheduler.try_run("mastodon").unwrap(), TickOutcome::Started);
        wait_until(|| source.fetch_count() == 1).await;
        assert_eq!(scheduler.try_run("mastodon").unwrap(), TickOutcome::Dropped);

        let status = scheduler.status().get("mastodon").unwrap();
        assert!(status.running);
        assert_eq!(status.dropped_ticks, 1);

        gate.add_permits(1);
        assert!(scheduler.shutdown(Duration::from_secs(5)).await);

        let status = scheduler.status().get("mastodon").unwrap();
        assert_eq!(status.runs_total, 1);
        assert_eq!(source.fetch_count(), 1);
        assert_eq!(source.action_count(), 1);
    }

    #[tokio::test]
    async fn test_platforms_run_independently() {
        let gate = Arc::new(Semaphore::new(0));
        let slow = gated("slow", &gate);
        let fast = MockSource::single_page("fast", vec![old_post("1"), old_post("2")]);
        let mut scheduler = scheduler();
        scheduler.register(job(&slow)).unwrap();
        scheduler.register(job(&fast)).unwrap();

        scheduler.try_run("slow").unwrap();
        scheduler.try_run("fast").unwrap();

        let status = scheduler.status().clone();
        wait_until(|| status.get("fast").map_or(false, |s| s.runs_total == 1)).await;
        assert!(status.get("slow").unwrap().running);
        assert_eq!(status.get("fast").unwrap().deleted_total, 2);

        gate.add_permits(1);
        assert!(scheduler.shutdown(Duration::from_secs(5)).await);
        assert_eq!(status.get("slow").unwrap().runs_total, 1);
    }

    #[tokio::test]
    async fn test_fetch_error_marks_run_and_next_tick_still_runs() {
        let failing = MockSource::fetch_failure(
            "bluesky",
            vec![Page::last(vec![old_post("1")])],
            1,
            "upstream timeout",
        );
        let healthy = MockSource::single_page("mastodon", vec![old_post("1")]);
        let mut scheduler = scheduler();
        scheduler.register(job(&failing)).unwrap();
        scheduler.register(job(&healthy)).unwrap();
        let status = scheduler.status().clone();

        scheduler.try_run("bluesky").unwrap();
        scheduler.try_run("mastodon").unwrap();
        wait_until(|| status.snapshot().iter().all(|s| s.runs_total == 1)).await;

        let bluesky = status.get("bluesky").unwrap();
        assert_eq!(bluesky.last_outcome, Some(RunOutcome::Error));
        assert_eq!(bluesky.last_termination, Some(TerminationReason::FetchError));
        assert!(bluesky.last_error.unwrap().contains("upstream timeout"));
        assert_eq!(
            status.get("mastodon").unwrap().last_outcome,
            Some(RunOutcome::Success)
        );

        assert_eq!(scheduler.try_run("bluesky").unwrap(), TickOutcome::Started);
        wait_until(|| status.get("bluesky").map_or(false, |s| s.runs_total == 2)).await;
        assert_eq!(
            status.get("bluesky").unwrap().last_outcome,
            Some(RunOutcome::Success)
        );

        assert!(scheduler.shutdown(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_start_ticks_immediately_and_stops_on_shutdown() {
        let source = MockSource::single_page("mastodon", vec![old_post("1")]);
        let mut scheduler = scheduler();
        scheduler.register(job(&source)).unwrap();

        let handle = scheduler.start();
        let status = handle.status().clone();
        wait_until(|| status.get("mastodon").map_or(false, |s| s.runs_total == 1)).await;
        assert!(status.get("mastodon").unwrap().next_run_at.is_some());

        assert!(handle.shutdown(Duration::from_secs(5)).await);
        assert!(handle.cancellation_token().is_cancelled());
        assert_eq!(handle.try_run("mastodon").unwrap(), TickOutcome::Stopped);
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_run_at_round_boundary() {
        let pages = (0..50)
            .map(|i| Page::new(vec![old_post(&format!("p{}", i))], format!("c{}", i + 1)))
            .collect();
        let source = MockSource::paged("mastodon", pages);
        let slow_rounds = PruneOptions {
            round_delay: Duration::from_secs(600),
            ..options()
        };
        let mut scheduler = scheduler();
        scheduler
            .register(job(&source).with_options(slow_rounds))
            .unwrap();
        let status = scheduler.status().clone();

        scheduler.try_run("mastodon").unwrap();
        wait_until(|| status.get("mastodon").map_or(false, |s| s.current_rounds == 1)).await;

        assert!(scheduler.shutdown(Duration::from_secs(5)).await);

        let status = status.get("mastodon").unwrap();
        assert!(!status.running);
        assert_eq!(status.last_termination, Some(TerminationReason::Cancelled));
        assert_eq!(status.last_rounds, 1);
        assert_eq!(status.deleted_total, 1);
    }

    #[tokio::test]
    async fn test_shutdown_reports_grace_overrun() {
        let gate = Arc::new(Semaphore::new(0));
        let source = gated("stuck", &gate);
        let mut scheduler = scheduler();
        scheduler.register(job(&source)).unwrap();

        scheduler.try_run("stuck").unwrap();
        wait_until(|| source.fetch_count() == 1).await;

        assert!(!scheduler.shutdown(Duration::from_millis(50)).await);
        gate.add_permits(1);
    }

    #[test]
    fn test_register_rejects_duplicates_and_zero_interval() {
        let source = MockSource::single_page("a", Vec::new());
        let mut scheduler = scheduler();
        scheduler.register(job(&source)).unwrap();

        assert!(scheduler.register(job(&source)).is_err());

        let other = MockSource::single_page("b", Vec::new());
        let zero = PlatformJob::new(Arc::new(other), "me", Duration::ZERO);
        assert!(scheduler.register(zero).is_err());
        assert_eq!(scheduler.platforms(), vec!["a"]);
    }

    #[test]
    fn test_try_run_unknown_platform() {
        let scheduler = scheduler();
        assert!(matches!(
            scheduler.try_run("nope"),
            Err(PruneError::Config(ConfigError::UnknownPlatform(_)))
        ));
    }

    #[test]
    fn test_policy_without_threshold_is_rejected() {
        assert!(matches!(
            PlatformScheduler::new(StatusStore::new(), Arc::new(NoopMetrics), PruneOptions::default()),
            Err(PruneError::Config(ConfigError::NoThreshold))
        ));

        let source = MockSource::single_page("mastodon", vec![old_post("1")]);
        let mut scheduler = scheduler();
        let result = scheduler.register(job(&source).with_options(PruneOptions::default()));

        assert!(matches!(result, Err(PruneError::Config(ConfigError::NoThreshold))));
        assert!(scheduler.platforms().is_empty());
        assert_eq!(source.fetch_count(), 0);
    }

    #[test]
    fn test_next_run_after_out_of_range_interval() {
        let now = Utc::now();
        assert_eq!(
            next_run_after(now, Duration::from_secs(60)),
            Some(now + TimeDelta::seconds(60))
        );
        let forever = Duration::from_secs(1_000_000 * 365 * 86_400);
        assert_eq!(next_run_after(now, forever), None);
    }

    #[tokio::test]
    async fn test_huge_interval_keeps_ticker_running() {
        let source = MockSource::single_page("mastodon", vec![old_post("1")]);
        let forever = Duration::from_secs(1_000_000 * 365 * 86_400);
        let mut scheduler = scheduler();
        scheduler
            .register(PlatformJob::new(Arc::new(source.clone()), "me", forever))
            .unwrap();

        let handle = scheduler.start();
        let status = handle.status().clone();
        wait_until(|| status.get("mastodon").map_or(false, |s| s.runs_total == 1)).await;

        // Only the ticker remains once the run task has finished
        let tracker = handle.scheduler.tracker.clone();
        wait_until(|| tracker.len() <= 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(tracker.len(), 1);
        assert!(status.get("mastodon").unwrap().next_run_at.is_none());

        assert!(handle.shutdown(Duration::from_secs(5)).await);
        assert_eq!(tracker.len(), 0);
    }
}

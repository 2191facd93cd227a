//! Round-based continuation over a platform's history
//!
//! Each round fetches one page at the current cursor, filters it, applies
//! preservation and classification to the in-scope posts, executes the
//! resulting actions, and folds the outcome into the run totals. The driver
//! then decides whether to advance the cursor or stop:
//!
//! | Condition after a round                     | Result                  |
//! |---------------------------------------------|-------------------------|
//! | fetch failed                                | `FetchError`            |
//! | page empty                                  | `Exhausted`             |
//! | page straddles the threshold (not draining) | `AgeThresholdReached`   |
//! | next cursor empty or unchanged              | `CursorStalled`         |
//! | round limit hit                             | `RoundLimitReached`     |
//! | shutdown requested                          | `Cancelled`             |
//!
//! Cancellation is only observed between rounds, never in the middle of one.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::platforms::PostSource;
use crate::prune::classify::{classify, is_considered};
use crate::prune::executor::ActionExecutor;
use crate::prune::filter::partition;
use crate::prune::options::PruneOptions;
use crate::prune::preserve;
use crate::prune::result::{PruneResult, RoundResult};
use crate::types::Cursor;

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Exhausted,
    CursorStalled,
    AgeThresholdReached,
    FetchError,
    RoundLimitReached,
    Cancelled,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exhausted => "exhausted",
            Self::CursorStalled => "cursor_stalled",
            Self::AgeThresholdReached => "age_threshold_reached",
            Self::FetchError => "fetch_error",
            Self::RoundLimitReached => "round_limit_reached",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Loop state of one run
#[derive(Debug, Clone, Default)]
pub struct ContinuationState {
    pub cursor: Cursor,
    /// Rounds attempted so far
    pub round: u32,
    pub result: PruneResult,
    pub termination: Option<TerminationReason>,
}

impl ContinuationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_terminated(&self) -> bool {
        self.termination.is_some()
    }
}

/// Final report of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub platform: String,
    pub dry_run: bool,
    pub rounds: u32,
    pub termination: TerminationReason,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(skip)]
    pub result: PruneResult,
}

impl RunSummary {
    pub fn processed(&self) -> usize {
        self.result.processed()
    }

    /// The run ended because the platform could not be read
    pub fn is_fetch_error(&self) -> bool {
        self.termination == TerminationReason::FetchError
    }
}

/// Receives progress while a run is underway
pub trait RoundObserver: Send + Sync {
    /// Called after every round, before it is folded into the totals
    fn on_round(&self, platform: &str, round: &RoundResult);

    fn on_run_complete(&self, _summary: &RunSummary) {}
}

/// Source of the current time, sampled once per round
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Drives one platform's pruning pipeline to termination
pub struct ContinuationDriver {
    source: Arc<dyn PostSource>,
    user: String,
    options: PruneOptions,
    executor: ActionExecutor,
    observers: Vec<Arc<dyn RoundObserver>>,
    clock: Clock,
}

impl ContinuationDriver {
    /// Create a driver for one platform
    ///
    /// # Errors
    ///
    /// Fails with a configuration error, before anything is fetched, if
    /// `options` does not pass [`PruneOptions::validate`].
    pub fn new(
        source: Arc<dyn PostSource>,
        user: impl Into<String>,
        options: PruneOptions,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self::assemble(source, user, options))
    }

    /// Build a driver from options the caller has already validated
    pub(crate) fn assemble(
        source: Arc<dyn PostSource>,
        user: impl Into<String>,
        options: PruneOptions,
    ) -> Self {
        let executor = ActionExecutor::from_options(&options);
        Self {
            source,
            user: user.into(),
            options,
            executor,
            observers: Vec::new(),
            clock: system_clock(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RoundObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn platform(&self) -> &str {
        self.source.platform_name()
    }

    /// Run until a terminal state
    ///
    /// A non-continuous run stops after its first round.
    pub async fn run(&self, continuous: bool) -> RunSummary {
        self.run_until_cancelled(continuous, &CancellationToken::new())
            .await
    }

    /// Like [`ContinuationDriver::run`], stopping between rounds once `cancel` fires
    pub async fn run_until_cancelled(
        &self,
        continuous: bool,
        cancel: &CancellationToken,
    ) -> RunSummary {
        let run_id = Uuid::new_v4();
        let platform = self.platform().to_string();
        let started_at = (self.clock)();
        let round_limit = if continuous {
            self.options.max_rounds
        } else {
            Some(1)
        };

        info!(
            platform = %platform,
            run_id = %run_id,
            continuous,
            dry_run = self.options.dry_run,
            "Starting prune run"
        );

        let mut state = ContinuationState::new();
        let termination = loop {
            if cancel.is_cancelled() {
                break TerminationReason::Cancelled;
            }

            if let Some(reason) = self.run_round(&mut state).await {
                break reason;
            }

            if round_limit.map_or(false, |limit| state.round >= limit) {
                break TerminationReason::RoundLimitReached;
            }

            if !self.options.round_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => break TerminationReason::Cancelled,
                    _ = sleep(self.options.round_delay) => {}
                }
            }
        };
        state.termination = Some(termination);

        if !self.options.dry_run {
            if let Err(e) = self.source.flush().await {
                let line = format!("flush {} failed: {}", platform, e);
                error!(platform = %platform, run_id = %run_id, "{}", line);
                state.result.record_failure(line);
            }
        }

        let summary = RunSummary {
            run_id,
            platform,
            dry_run: self.options.dry_run,
            rounds: state.round,
            termination,
            started_at,
            finished_at: (self.clock)(),
            result: state.result,
        };

        info!(
            platform = %summary.platform,
            run_id = %summary.run_id,
            rounds = summary.rounds,
            termination = %summary.termination,
            totals = %summary.result.summary(),
            "Prune run finished"
        );

        for observer in &self.observers {
            observer.on_run_complete(&summary);
        }
        summary
    }

    /// Execute one round and update `state`
    ///
    /// Returns the termination reason when the run must stop; otherwise the
    /// cursor has been advanced for the next round.
    pub async fn run_round(&self, state: &mut ContinuationState) -> Option<TerminationReason> {
        let platform = self.platform();
        state.round += 1;
        let mut round = RoundResult::new(state.round, state.cursor.clone());
        let now = (self.clock)();

        debug!(platform = %platform, round = state.round, cursor = %state.cursor, "Fetching page");

        let page = match self
            .source
            .fetch_page(&self.user, self.options.page_size, &state.cursor)
            .await
        {
            Ok(page) => page,
            Err(e) => {
                let line = format!("fetch {} at cursor {} failed: {}", platform, state.cursor, e);
                error!(platform = %platform, round = state.round, "{}", line);
                round.result.record_failure(line);
                return self.close_round(state, round, Some(TerminationReason::FetchError));
            }
        };

        round.fetched = page.posts.len();
        round.next_cursor = page.next_cursor.clone();

        if page.is_empty() {
            info!(platform = %platform, round = state.round, "Empty page, history exhausted");
            return self.close_round(state, round, Some(TerminationReason::Exhausted));
        }

        let split = partition(&page.posts, &self.options, now);
        round.in_scope = split.in_scope.len();

        for post in &split.in_scope {
            if !is_considered(post, &self.options) {
                round.skipped += 1;
                continue;
            }

            if let Some(reason) = preserve::evaluate(post, &self.options) {
                debug!(post = %post.label(), reason = %reason, "Preserving post");
                round.result.record_preserved(post.clone());
                continue;
            }

            let action = classify(post.kind);
            let outcome = self
                .executor
                .execute(self.source.as_ref(), action, post, &mut round.result)
                .await;
            round.actions.push((action, outcome));
        }

        debug!(
            platform = %platform,
            round = state.round,
            fetched = round.fetched,
            in_scope = round.in_scope,
            skipped = round.skipped,
            "Round processed"
        );

        let termination = if split.is_mixed() && !self.options.drain_history {
            info!(
                platform = %platform,
                round = state.round,
                "Page crosses the age threshold, no older pages needed"
            );
            Some(TerminationReason::AgeThresholdReached)
        } else if page.next_cursor.is_empty() {
            info!(platform = %platform, round = state.round, "Reached end of history");
            Some(TerminationReason::CursorStalled)
        } else if page.next_cursor == state.cursor {
            warn!(
                platform = %platform,
                round = state.round,
                cursor = %state.cursor,
                "Platform returned the same cursor again, stopping"
            );
            Some(TerminationReason::CursorStalled)
        } else {
            state.cursor = page.next_cursor;
            None
        };

        self.close_round(state, round, termination)
    }

    fn close_round(
        &self,
        state: &mut ContinuationState,
        round: RoundResult,
        termination: Option<TerminationReason>,
    ) -> Option<TerminationReason> {
        let platform = self.platform();
        for observer in &self.observers {
            observer.on_round(platform, &round);
        }
        state.result.merge(round);
        state.termination = termination;
        termination
    }
}

//! Pruning policy

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::types::Post;

/// Default number of posts requested per round
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Default pause between two mutating calls
pub const DEFAULT_ACTION_DELAY: Duration = Duration::from_secs(1);

/// Default pause between two rounds
pub const DEFAULT_ROUND_DELAY: Duration = Duration::from_secs(1);

/// Read-only policy for one pruning invocation
///
/// Build it with [`PruneOptions::builder`], which validates the thresholds.
/// A policy with neither a maximum age nor a cutoff date selects nothing and
/// is rejected before any remote call.
#[derive(Debug, Clone, PartialEq)]
pub struct PruneOptions {
    /// Posts older than this are in scope
    pub max_age: Option<TimeDelta>,
    /// Posts created before this instant are in scope
    pub before: Option<DateTime<Utc>>,
    pub preserve_pinned: bool,
    pub preserve_self_liked: bool,
    /// Consider the viewer's like records
    pub unlike: bool,
    /// Consider the viewer's repost records
    pub unshare: bool,
    /// Classify and report without issuing any mutating call
    pub dry_run: bool,
    /// Pause before every mutating call
    pub action_delay: Duration,
    /// Pause between rounds of a continuous run
    pub round_delay: Duration,
    pub page_size: usize,
    /// Keep paging past the first page that straddles the threshold
    pub drain_history: bool,
    /// Upper bound on rounds for continuous runs
    pub max_rounds: Option<u32>,
}

impl Default for PruneOptions {
    fn default() -> Self {
        Self {
            max_age: None,
            before: None,
            preserve_pinned: false,
            preserve_self_liked: false,
            unlike: false,
            unshare: false,
            dry_run: false,
            action_delay: DEFAULT_ACTION_DELAY,
            round_delay: DEFAULT_ROUND_DELAY,
            page_size: DEFAULT_PAGE_SIZE,
            drain_history: false,
            max_rounds: None,
        }
    }
}

impl PruneOptions {
    pub fn builder() -> PruneOptionsBuilder {
        PruneOptionsBuilder::default()
    }

    /// Check that the policy can select anything and that its limits are sane
    pub fn validate(&self) -> Result<()> {
        if self.max_age.is_none() && self.before.is_none() {
            return Err(ConfigError::NoThreshold.into());
        }
        if let Some(max_age) = self.max_age {
            if max_age <= TimeDelta::zero() {
                return Err(ConfigError::InvalidValue {
                    field: "max_age".to_string(),
                    reason: "must be greater than zero".to_string(),
                }
                .into());
            }
        }
        if self.page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "page_size".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        if self.max_rounds == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "max_rounds".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Whether `post` is old enough to be acted on, judged at `now`
    pub fn is_in_scope(&self, post: &Post, now: DateTime<Utc>) -> bool {
        let too_old = self
            .max_age
            .map_or(false, |max_age| post.age(now) > max_age);
        let before_cutoff = self.before.map_or(false, |cutoff| post.created_at < cutoff);
        too_old || before_cutoff
    }
}

/// Builder for [`PruneOptions`]
#[derive(Debug, Default)]
pub struct PruneOptionsBuilder {
    max_age: Option<Duration>,
    options: PruneOptions,
}

impl PruneOptionsBuilder {
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.options.before = Some(cutoff);
        self
    }

    pub fn preserve_pinned(mut self, enabled: bool) -> Self {
        self.options.preserve_pinned = enabled;
        self
    }

    pub fn preserve_self_liked(mut self, enabled: bool) -> Self {
        self.options.preserve_self_liked = enabled;
        self
    }

    pub fn unlike(mut self, enabled: bool) -> Self {
        self.options.unlike = enabled;
        self
    }

    pub fn unshare(mut self, enabled: bool) -> Self {
        self.options.unshare = enabled;
        self
    }

    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.options.dry_run = enabled;
        self
    }

    pub fn action_delay(mut self, delay: Duration) -> Self {
        self.options.action_delay = delay;
        self
    }

    pub fn round_delay(mut self, delay: Duration) -> Self {
        self.options.round_delay = delay;
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.options.page_size = page_size;
        self
    }

    pub fn drain_history(mut self, enabled: bool) -> Self {
        self.options.drain_history = enabled;
        self
    }

    pub fn max_rounds(mut self, rounds: u32) -> Self {
        self.options.max_rounds = Some(rounds);
        self
    }

    /// Finish the policy
    ///
    /// # Errors
    ///
    /// Fails when no threshold is set, when the maximum age does not fit a
    /// calendar duration, or when a limit is zero.
    pub fn build(self) -> Result<PruneOptions> {
        let mut options = self.options;
        if let Some(max_age) = self.max_age {
            let delta = TimeDelta::from_std(max_age).map_err(|e| ConfigError::InvalidDuration {
                value: humantime::format_duration(max_age).to_string(),
                reason: e.to_string(),
            })?;
            options.max_age = Some(delta);
        }
        options.validate()?;
        Ok(options)
    }
}

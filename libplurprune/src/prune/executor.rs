//! Issuing the mutating call for one classified post

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::platforms::PostSource;
use crate::prune::options::PruneOptions;
use crate::prune::result::{ActionOutcome, PruneResult};
use crate::rate_limiter::RateLimiter;
use crate::types::{ActionKind, Post};

/// Performs (or, in dry-run mode, only records) one action per post
///
/// Failures are recorded and never retried; a re-run picks them up.
#[derive(Debug)]
pub struct ActionExecutor {
    dry_run: bool,
    limiter: RateLimiter,
}

impl ActionExecutor {
    pub fn new(dry_run: bool, delay: Duration) -> Self {
        Self {
            dry_run,
            limiter: RateLimiter::new(delay),
        }
    }

    pub fn from_options(options: &PruneOptions) -> Self {
        Self::new(options.dry_run, options.action_delay)
    }

    /// Live calls issued so far
    pub fn calls_issued(&self) -> u64 {
        self.limiter.throttled()
    }

    /// Record `post` under `action` and, unless dry-running, perform it
    pub async fn execute(
        &self,
        source: &dyn PostSource,
        action: ActionKind,
        post: &Post,
        result: &mut PruneResult,
    ) -> ActionOutcome {
        result.record_planned(action, post.clone());

        if self.dry_run {
            debug!(action = %action, post = %post.label(), "Dry run, skipping call");
            return ActionOutcome::Planned;
        }

        self.limiter.throttle().await;

        match source.execute_action(action, post).await {
            Ok(()) => {
                result.record_success(action);
                info!(action = %action, post = %post.label(), "Action succeeded");
                ActionOutcome::Succeeded
            }
            Err(e) => {
                let line = format!("{} {} failed: {}", action, post.label(), e);
                warn!("{}", line);
                result.record_failure(line);
                ActionOutcome::Failed
            }
        }
    }
}

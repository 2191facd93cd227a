//! Plurprune - prune old posts from decentralized social platforms
//!
//! This library holds the pruning pipeline (filtering, preservation,
//! classification, rate-limited execution, and round-based continuation over
//! a platform's history) together with the scheduler and status surface used
//! to run it unattended.

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod platforms;
pub mod prune;
pub mod rate_limiter;
pub mod server;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{PruneError, Result};
pub use platforms::{Page, PostSource};
pub use prune::{ContinuationDriver, PruneOptions, PruneResult, RunSummary, TerminationReason};
pub use types::{ActionKind, Cursor, Post, PostKind};

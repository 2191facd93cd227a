//! The pruning pipeline
//!
//! Leaf to root: [`filter`] decides which posts are old enough,
//! [`preserve`] exempts protected ones, [`classify`] picks the undo call,
//! [`executor`] issues it, [`result`] accumulates outcomes, and [`driver`]
//! pages through the history round by round.

pub mod classify;
pub mod driver;
pub mod executor;
pub mod filter;
pub mod options;
pub mod preserve;
pub mod result;

pub use driver::{ContinuationDriver, ContinuationState, RoundObserver, RunSummary, TerminationReason};
pub use options::PruneOptions;
pub use result::{ActionOutcome, PruneResult, PruneSummary, RoundResult};

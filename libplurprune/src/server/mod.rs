//! Unattended server mode
//!
//! [`scheduler`] runs each configured platform on its own timer, [`status`]
//! keeps the shared table the runs report into, and [`http`] serves that
//! table alongside the Prometheus metrics.

pub mod http;
pub mod scheduler;
pub mod status;

pub use http::{router, serve, AppState};
pub use scheduler::{PlatformJob, PlatformScheduler, SchedulerHandle, TickOutcome};
pub use status::{PlatformStatus, RunOutcome, StatusStore};

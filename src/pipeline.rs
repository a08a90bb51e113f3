//! The authenticated request pipeline: bearer attachment, single-flight refresh, and replay.
//!
//! [`RequestDispatcher`] issues one call with the current access credential and hands any
//! `401` to the [`RefreshCoordinator`]. The coordinator lets exactly one caller (the driver)
//! perform the refresh call while every other caller that fails authorization in the same cycle
//! waits in arrival order. When the cycle settles, all of them observe the same outcome: either
//! the same new access credential (and each replays its own request once), or the same shared
//! [`RefreshError`](crate::error::RefreshError) after the store has been cleared and the session
//! invalidated.

mod coordinator;
mod dispatcher;
mod metrics;

pub use coordinator::*;
pub use dispatcher::*;
pub use metrics::RefreshMetrics;

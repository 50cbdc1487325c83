//! Upstream request throttling.
//!
//! Two independent checks guard every upstream call: a local cooldown
//! window between attempts, and the request budget the upstream reports.
//! Both must pass. The gate never waits; a blocked caller defers to its
//! next scheduled run.

mod gate;
mod repository;

pub use gate::{RateLimitConfig, RateLimitGate, RateState, UpstreamBudget};
pub use repository::RateStateRepository;

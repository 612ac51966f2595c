//! Tier capabilities and the quota gate in front of every metered action.

mod gate;
pub mod handlers;
mod tier;

pub use gate::{authorize, period_start, ActionUsage, QuotaGate, ResetReport, UsageSummary};
pub use tier::{evaluate, Action, Capabilities, Decision, Quota, Tier, UsageCounter, UsageCounters};

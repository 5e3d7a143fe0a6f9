//! Analytics: the fire-and-forget event beacon and the dashboard aggregator

mod beacon;
mod stats;

pub use beacon::{AnalyticsBeacon, TrackRequest};
pub use stats::{ProfileStats, StatsReader};

/// Collection holding raw analytics event rows
pub(crate) const EVENTS_TABLE: &str = "analytics";

/// Collection holding the externally-written daily rollups
pub(crate) const DAILY_STATS_TABLE: &str = "daily_stats";

//! Viewer analytics aggregation
//!
//! Turns one event's flat list of viewer records into ranked per-dimension
//! breakdowns (city, resolution, OS, browser) and event-level scalars, and
//! decides whether the event is worth a notification.
//!
//! Everything in this module is synchronous and free of I/O.

pub mod aggregator;
pub mod gate;
pub mod grouping;
pub mod models;
pub mod normalizer;
pub mod ranker;
pub mod scalars;
pub mod user_agent;

pub use aggregator::{EventAggregator, EventOutcome};
pub use gate::{should_notify, Endpoint, NotifyDecision, NotifyGate, DEFAULT_UNIQUE_VIEWER_FLOOR};
pub use grouping::{group, summarize, GroupedBucket};
pub use models::{
    Chart, ChartAxis, ChartType, DimensionKeys, EventSummary, Metric, RankedSeries, ReportPayload,
    ScalarBlock, ViewerRecord, WatchTime, UNKNOWN_FAMILY,
};
pub use normalizer::{derive_keys, normalize_viewer, KpiStats, WatchTimeUnit};
pub use ranker::rank;
pub use scalars::format_duration;
pub use user_agent::{AgentFamilies, RuleTableClassifier, UserAgentClassifier};

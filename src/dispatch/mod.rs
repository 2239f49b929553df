//! Dispatch: the per-campaign controller, its run budget, the watch loop
//! and process-wide counters.

pub mod budget;
pub mod controller;
pub mod metrics;
pub mod runner;

pub use budget::RunBudget;
pub use controller::{DispatchConfig, DispatchController};
pub use metrics::{ChannelCounters, DispatchMetrics, MetricsSnapshot};
pub use runner::{CampaignRunner, RunnerConfig, spawn_runner};

//! Observability support for the retry engine

pub mod metrics;

pub use metrics::{MetricsResult, SchedulerMetrics, SchedulerMetricsSnapshot};

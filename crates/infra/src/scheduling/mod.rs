//! Scheduling infrastructure for automated retry execution
//!
//! The retry scheduler follows the project runtime rules:
//! - Explicit lifecycle management (start/stop, both idempotent)
//! - Join handles for spawned tasks
//! - Cancellation token support
//! - Timeout wrapping on the stop path
//! - Structured tracing with SchedulerMetrics integration

pub mod error;
pub mod retry_scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use retry_scheduler::{RetryScheduler, RetrySchedulerConfig};

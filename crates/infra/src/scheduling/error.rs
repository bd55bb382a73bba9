//! Scheduler error types

use std::time::Duration;

use redrive_domain::RedriveError;
use thiserror::Error;
use tokio::time::error::Elapsed;

/// Scheduler-specific errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Scheduler is not running
    #[error("Scheduler not running")]
    NotRunning,

    /// Rejected configuration at construction time
    #[error("Invalid scheduler configuration: {0}")]
    InvalidConfig(String),

    /// Operation timed out
    #[error("Operation timed out after {duration:?}")]
    Timeout {
        duration: Duration,
        #[source]
        source: Elapsed,
    },

    /// Task join failed
    #[error("Task join failed: {0}")]
    TaskJoinFailed(String),
}

impl From<SchedulerError> for RedriveError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::NotRunning => RedriveError::InvalidInput(err.to_string()),
            SchedulerError::InvalidConfig(_) => RedriveError::Config(err.to_string()),
            SchedulerError::Timeout { .. } | SchedulerError::TaskJoinFailed(_) => {
                RedriveError::Internal(err.to_string())
            }
        }
    }
}

/// Convenience type alias for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

//! Scheduler metrics
//!
//! Simple atomic counters tracking tick and attempt activity.
//!
//! ## Design
//! - **SeqCst ordering** for atomics used in derived metrics (average tick
//!   duration)
//! - **No locking needed** - simple atomic counters
//! - **MetricsResult returns** for future extensibility (currently always Ok)

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use redrive_domain::RedriveError;
use serde::{Deserialize, Serialize};

/// Result alias for metric recording
///
/// All record methods return `MetricsResult<()>` for future extensibility
/// (quotas, export back-pressure), but currently always succeed.
pub type MetricsResult<T> = std::result::Result<T, RedriveError>;

/// Metrics for the retry scheduler
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    /// Number of completed ticks
    pub ticks: AtomicUsize,
    /// Number of timer fires skipped because a tick was still running
    pub ticks_skipped: AtomicUsize,
    /// Total tick duration in microseconds
    pub total_tick_time_micros: AtomicU64,
    /// Attempts dispatched to the executor
    pub attempts_dispatched: AtomicUsize,
    /// Attempts that completed successfully
    pub attempts_succeeded: AtomicUsize,
    /// Attempts that failed
    pub attempts_failed: AtomicUsize,
    /// Due campaigns held back by a precondition this tick
    pub attempts_blocked: AtomicUsize,
    /// Campaigns that permanently left the due set
    pub campaigns_exhausted: AtomicUsize,
}

/// Point-in-time copy of the scheduler counters
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchedulerMetricsSnapshot {
    pub ticks: usize,
    pub ticks_skipped: usize,
    pub attempts_dispatched: usize,
    pub attempts_succeeded: usize,
    pub attempts_failed: usize,
    pub attempts_blocked: usize,
    pub campaigns_exhausted: usize,
}

impl SchedulerMetrics {
    /// Create a zeroed metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed tick and its duration
    pub fn record_tick(&self, duration: Duration) -> MetricsResult<()> {
        // SeqCst for consistency with avg_tick_time_ms
        self.ticks.fetch_add(1, Ordering::SeqCst);
        self.total_tick_time_micros.fetch_add(duration.as_micros() as u64, Ordering::SeqCst);
        Ok(())
    }

    /// Record a timer fire skipped due to tick overlap
    pub fn record_skipped_tick(&self) -> MetricsResult<()> {
        // Relaxed OK: independent counter
        self.ticks_skipped.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Record attempts handed to the executor
    pub fn record_dispatched(&self, count: usize) -> MetricsResult<()> {
        self.attempts_dispatched.fetch_add(count, Ordering::Relaxed);
        Ok(())
    }

    /// Record a successful attempt
    pub fn record_succeeded(&self) -> MetricsResult<()> {
        self.attempts_succeeded.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Record a failed attempt
    pub fn record_failed(&self) -> MetricsResult<()> {
        self.attempts_failed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Record a campaign held back by its precondition
    pub fn record_blocked(&self) -> MetricsResult<()> {
        self.attempts_blocked.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Record a campaign permanently leaving the due set
    pub fn record_exhausted(&self) -> MetricsResult<()> {
        self.campaigns_exhausted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Average tick duration in milliseconds
    ///
    /// Returns 0.0 before the first completed tick.
    pub fn avg_tick_time_ms(&self) -> f64 {
        // SeqCst for a consistent snapshot of total time and count
        let total = self.total_tick_time_micros.load(Ordering::SeqCst);
        let ticks = self.ticks.load(Ordering::SeqCst);
        if ticks == 0 {
            return 0.0;
        }
        (total as f64 / ticks as f64) / 1_000.0
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> SchedulerMetricsSnapshot {
        SchedulerMetricsSnapshot {
            ticks: self.ticks.load(Ordering::SeqCst),
            ticks_skipped: self.ticks_skipped.load(Ordering::Relaxed),
            attempts_dispatched: self.attempts_dispatched.load(Ordering::Relaxed),
            attempts_succeeded: self.attempts_succeeded.load(Ordering::Relaxed),
            attempts_failed: self.attempts_failed.load(Ordering::Relaxed),
            attempts_blocked: self.attempts_blocked.load(Ordering::Relaxed),
            campaigns_exhausted: self.campaigns_exhausted.load(Ordering::Relaxed),
        }
    }
}

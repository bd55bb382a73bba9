//! Retry model types
//!
//! These types model the retry lifecycle of a failed campaign delivery: the
//! backoff policy keyed by failure code, the time-bounded retry window, the
//! append-only attempt log, and the per-campaign state owned by the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Backoff policy for a recognized failure error code
///
/// Immutable; `intervals[n]` is the wait in hours before attempt `n + 1`,
/// counted from the previous attempt (or the original failure).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    pub error_code: String,
    pub description: String,
    /// Ordered retry intervals in hours
    pub intervals: Vec<i64>,
    /// Whether attempts are gated on an external precondition check
    pub requires_precondition: bool,
}

impl RetryPolicy {
    /// Maximum number of attempts this policy allows
    pub fn max_attempts(&self) -> usize {
        self.intervals.len()
    }
}

/// Retry window (TTL) configured for a campaign
///
/// The single `deadline` field is shared by two collaborators: the retry
/// scheduler stops scheduling past it, and the outbound delivery time limit
/// reads it through [`RetryWindow::delivery_cutoff`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryWindow {
    pub enabled: bool,
    pub deadline: Option<DateTime<Utc>>,
    pub window_start: Option<DateTime<Utc>>,
    pub stop_on_conversion: bool,
    pub stop_on_manual_pause: bool,
    pub stop_on_template_change: bool,
}

impl RetryWindow {
    /// Create an enabled window with all stop conditions on
    pub fn new(window_start: DateTime<Utc>, deadline: DateTime<Utc>) -> Self {
        Self {
            enabled: true,
            deadline: Some(deadline),
            window_start: Some(window_start),
            stop_on_conversion: true,
            stop_on_manual_pause: true,
            stop_on_template_change: true,
        }
    }

    /// Deadline as consumed by the outbound delivery time limit
    pub fn delivery_cutoff(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    /// A window with no deadline is treated as expired
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.deadline {
            Some(deadline) => now > deadline,
            None => true,
        }
    }
}

impl Default for RetryWindow {
    fn default() -> Self {
        Self {
            enabled: false,
            deadline: None,
            window_start: None,
            stop_on_conversion: true,
            stop_on_manual_pause: true,
            stop_on_template_change: true,
        }
    }
}

/// Status of a single retry attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Pending,
    Completed,
    Failed,
    Skipped,
}

crate::impl_domain_status_conversions!(AttemptStatus {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
    Skipped => "skipped"
});

/// One retry attempt; immutable once recorded, appended only
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryAttempt {
    /// 1-based attempt number
    pub attempt_number: u32,
    pub scheduled_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub status: AttemptStatus,
    pub error_code: Option<String>,
}

/// Per-campaign retry state
///
/// Owned exclusively by the retry state store; all mutation goes through
/// copy-and-replace inside the store, never in place on a shared reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CampaignRetryState {
    pub campaign_id: String,
    pub retry_window: RetryWindow,
    pub attempts: Vec<RetryAttempt>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Failure code that produced the current schedule
    pub last_error_code: Option<String>,
    pub is_expired: bool,
}

impl CampaignRetryState {
    /// Create fresh state for a newly configured retry window
    pub fn new(campaign_id: impl Into<String>, window: RetryWindow, now: DateTime<Utc>) -> Self {
        let is_expired = window.is_expired_at(now);
        Self {
            campaign_id: campaign_id.into(),
            retry_window: window,
            attempts: Vec::new(),
            last_attempt_at: None,
            next_attempt_at: None,
            last_error_code: None,
            is_expired,
        }
    }

    /// Eligibility for processing in a scheduler tick:
    /// `enabled && !is_expired && next_attempt_at <= now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.retry_window.enabled
            && !self.is_expired
            && self.next_attempt_at.is_some_and(|at| at <= now)
    }

    /// Number of attempts recorded so far
    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }
}

/// Outcome reported by the campaign executor for a single attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttemptOutcome {
    pub success: bool,
    pub error_code: Option<String>,
    pub message: String,
}

impl AttemptOutcome {
    /// Successful delivery
    pub fn delivered(message: impl Into<String>) -> Self {
        Self { success: true, error_code: None, message: message.into() }
    }

    /// Failed delivery with the reported failure code
    pub fn failed(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { success: false, error_code: Some(error_code.into()), message: message.into() }
    }
}

/// External lifecycle signal that can end retrying early
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopSignal {
    Converted,
    ManuallyPaused,
    TemplateChanged,
}

crate::impl_domain_status_conversions!(StopSignal {
    Converted => "converted",
    ManuallyPaused => "manually_paused",
    TemplateChanged => "template_changed"
});

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn window_expiry_is_strict() {
        let now = t0();
        let window = RetryWindow::new(now - Duration::hours(1), now);

        assert!(!window.is_expired_at(now));
        assert!(!window.is_expired_at(now - Duration::seconds(1)));
        assert!(window.is_expired_at(now + Duration::seconds(1)));
    }

    #[test]
    fn window_without_deadline_is_expired() {
        let window = RetryWindow::default();
        assert!(window.is_expired_at(t0()));
    }

    #[test]
    fn delivery_cutoff_mirrors_deadline() {
        let window = RetryWindow::new(t0(), t0() + Duration::hours(48));
        assert_eq!(window.delivery_cutoff(), window.deadline);
    }

    #[test]
    fn state_is_due_requires_all_conditions() {
        let now = t0();
        let window = RetryWindow::new(now - Duration::hours(24), now + Duration::hours(48));
        let mut state = CampaignRetryState::new("c-1", window, now);

        // No next attempt scheduled yet
        assert!(!state.is_due(now));

        state.next_attempt_at = Some(now - Duration::minutes(5));
        assert!(state.is_due(now));

        // Future schedule is not due
        state.next_attempt_at = Some(now + Duration::minutes(5));
        assert!(!state.is_due(now));

        // Disabled window is never due
        state.next_attempt_at = Some(now - Duration::minutes(5));
        state.retry_window.enabled = false;
        assert!(!state.is_due(now));

        // Expired state is never due
        state.retry_window.enabled = true;
        state.is_expired = true;
        assert!(!state.is_due(now));
    }

    #[test]
    fn attempt_outcome_constructors() {
        let ok = AttemptOutcome::delivered("sent");
        assert!(ok.success);
        assert!(ok.error_code.is_none());

        let failed = AttemptOutcome::failed("freqcap", "frequency cap hit");
        assert!(!failed.success);
        assert_eq!(failed.error_code.as_deref(), Some("freqcap"));
    }

    #[test]
    fn status_string_conversions() {
        use std::str::FromStr;

        assert_eq!(AttemptStatus::Completed.to_string(), "completed");
        assert_eq!(AttemptStatus::from_str("SKIPPED").unwrap(), AttemptStatus::Skipped);
        assert_eq!(StopSignal::ManuallyPaused.to_string(), "manually_paused");
        assert_eq!(StopSignal::from_str("converted").unwrap(), StopSignal::Converted);
    }
}

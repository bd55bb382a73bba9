//! Retry decision engine
//!
//! Pure evaluation of whether and when a failed campaign delivery should be
//! retried: window validation, expiry checks, and next-attempt computation
//! against the policy table. The single side effect is the precondition read
//! through the oracle; nothing here ever returns an error to the scheduling
//! loop.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use redrive_domain::constants::{MAX_WINDOW_DAYS, MIN_WINDOW_HOURS};
use redrive_domain::CampaignRetryState;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::policy::PolicyTable;
use crate::ports::PreconditionOracle;

/// Structured result of retry-window validation
///
/// Always returned, never thrown; `errors` carries human-readable messages
/// for configuration surfaces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WindowValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl WindowValidation {
    fn from_errors(errors: Vec<String>) -> Self {
        Self { valid: errors.is_empty(), errors }
    }
}

/// Why a retry decision came out the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    Scheduled,
    Disabled,
    Expired,
    NoPolicy,
    Blocked,
    Exhausted,
    PastDeadline,
}

redrive_domain::impl_domain_status_conversions!(DecisionReason {
    Scheduled => "scheduled",
    Disabled => "disabled",
    Expired => "expired",
    NoPolicy => "no_policy",
    Blocked => "blocked",
    Exhausted => "exhausted",
    PastDeadline => "past_deadline"
});

impl DecisionReason {
    /// Human-readable reason for operator-facing records
    pub fn describe(self) -> &'static str {
        match self {
            Self::Scheduled => "next attempt scheduled",
            Self::Disabled => "retry window disabled",
            Self::Expired => "retry window expired",
            Self::NoPolicy => "no retry policy for error code",
            Self::Blocked => "blocked by precondition",
            Self::Exhausted => "retry intervals exhausted",
            Self::PastDeadline => "next attempt would fall past the deadline",
        }
    }

    /// Whether the campaign permanently leaves the due set
    ///
    /// `Blocked` is not terminal: it is re-evaluated every tick until the
    /// deadline passes.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Scheduled | Self::Blocked)
    }
}

/// Outcome of a retry decision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub should_retry: bool,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub reason: DecisionReason,
}

impl Decision {
    fn no(reason: DecisionReason) -> Self {
        Self { should_retry: false, next_attempt_at: None, reason }
    }

    fn scheduled(at: DateTime<Utc>) -> Self {
        Self { should_retry: true, next_attempt_at: Some(at), reason: DecisionReason::Scheduled }
    }

    /// Blocked decisions carry the candidate time (when the attempt would
    /// run) so configuration surfaces can still seed the schedule.
    fn blocked(candidate: Option<DateTime<Utc>>) -> Self {
        Self { should_retry: false, next_attempt_at: candidate, reason: DecisionReason::Blocked }
    }
}

/// Retry decision engine
pub struct DecisionEngine {
    table: PolicyTable,
    oracle: Arc<dyn PreconditionOracle>,
}

impl DecisionEngine {
    /// Create an engine over the given policy table and precondition oracle
    pub fn new(table: PolicyTable, oracle: Arc<dyn PreconditionOracle>) -> Self {
        Self { table, oracle }
    }

    /// Access to the policy table (read-only)
    pub fn policies(&self) -> &PolicyTable {
        &self.table
    }

    /// Validate a retry window supplied as RFC 3339 strings
    ///
    /// Rejects unparsable timestamps, windows shorter than the minimum bound
    /// or longer than the maximum bound, and deadlines that are not in the
    /// future.
    pub fn validate_window(deadline: &str, window_start: &str, now: DateTime<Utc>) -> WindowValidation {
        let mut errors = Vec::new();

        let deadline_ts = parse_rfc3339(deadline);
        if deadline_ts.is_none() {
            errors.push(format!("deadline is not a valid RFC 3339 timestamp: {deadline}"));
        }
        let start_ts = parse_rfc3339(window_start);
        if start_ts.is_none() {
            errors.push(format!("window start is not a valid RFC 3339 timestamp: {window_start}"));
        }

        if let (Some(deadline_ts), Some(start_ts)) = (deadline_ts, start_ts) {
            errors.extend(Self::check_window_bounds(deadline_ts, start_ts, now));
        }

        WindowValidation::from_errors(errors)
    }

    /// Bound checks on already-parsed window timestamps
    pub fn check_window_bounds(
        deadline: DateTime<Utc>,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let mut errors = Vec::new();

        if deadline - window_start < Duration::hours(MIN_WINDOW_HOURS) {
            errors.push(format!(
                "deadline must be at least {MIN_WINDOW_HOURS} hours after the window start"
            ));
        }
        if deadline - window_start > Duration::days(MAX_WINDOW_DAYS) {
            errors.push(format!(
                "deadline must be within {MAX_WINDOW_DAYS} days of the window start"
            ));
        }
        if deadline <= now {
            errors.push("deadline must be in the future".to_string());
        }

        errors
    }

    /// A deadline is expired once `now` is strictly past it
    pub fn is_expired(deadline: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now > deadline
    }

    /// Compute the next attempt time, if any
    ///
    /// Returns `None` when the window has expired, the error code has no
    /// policy, the intervals are exhausted, or the candidate would not land
    /// strictly before the deadline.
    pub fn compute_next_attempt(
        &self,
        error_code: &str,
        attempt_index: usize,
        last_attempt_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if Self::is_expired(deadline, now) {
            return None;
        }
        let policy = self.table.lookup(error_code)?;
        let interval = policy.intervals.get(attempt_index)?;

        let candidate = last_attempt_at + Duration::hours(*interval);
        (candidate < deadline).then_some(candidate)
    }

    /// Decide whether the campaign should be retried and when
    ///
    /// Pure aside from the single precondition read; never returns an error.
    /// The anchor for interval arithmetic is the last recorded attempt,
    /// falling back to the window start (the original delivery failure).
    pub async fn decide(
        &self,
        error_code: &str,
        state: &CampaignRetryState,
        now: DateTime<Utc>,
    ) -> Decision {
        if !state.retry_window.enabled {
            return Decision::no(DecisionReason::Disabled);
        }
        let Some(deadline) = state.retry_window.deadline else {
            return Decision::no(DecisionReason::Expired);
        };
        if Self::is_expired(deadline, now) {
            return Decision::no(DecisionReason::Expired);
        }
        let Some(policy) = self.table.lookup(error_code) else {
            return Decision::no(DecisionReason::NoPolicy);
        };

        let attempt_index = state.attempt_count();
        let anchor = state.last_attempt_at.or(state.retry_window.window_start).unwrap_or(now);
        let candidate =
            self.compute_next_attempt(error_code, attempt_index, anchor, deadline, now);

        if policy.requires_precondition && !self.precondition_active(&state.campaign_id).await {
            return Decision::blocked(candidate);
        }

        match candidate {
            Some(at) => Decision::scheduled(at),
            None if attempt_index >= policy.max_attempts() => {
                Decision::no(DecisionReason::Exhausted)
            }
            None => Decision::no(DecisionReason::PastDeadline),
        }
    }

    /// Pre-dispatch gate: is the campaign currently held back by its
    /// policy's precondition?
    ///
    /// Returns false for codes without a policy or without a precondition.
    /// Oracle failures count as blocked and are re-checked on the next tick.
    pub async fn is_blocked(&self, error_code: &str, subject_id: &str) -> bool {
        let Some(policy) = self.table.lookup(error_code) else {
            return false;
        };
        if !policy.requires_precondition {
            return false;
        }
        !self.precondition_active(subject_id).await
    }

    async fn precondition_active(&self, subject_id: &str) -> bool {
        match self.oracle.is_active(subject_id).await {
            Ok(active) => active,
            Err(err) => {
                warn!(
                    subject_id = %subject_id,
                    error = %err,
                    "Precondition check failed; treating as blocked"
                );
                false
            }
        }
    }
}

fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value).ok().map(|ts| ts.with_timezone(&Utc))
}

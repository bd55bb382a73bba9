//! Observability records emitted by the scheduler and the state store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AttemptStatus;

/// Per-campaign result collected during a scheduler tick
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CampaignOutcome {
    pub campaign_id: String,
    pub status: AttemptStatus,
    pub error_code: Option<String>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Human-readable reason when the campaign exits the due set
    pub reason: Option<String>,
}

/// Summary of one scheduler tick
///
/// `due` counts every eligible campaign found by the scan; `processed` is the
/// truncated batch actually dispatched. The gap between the two is the
/// documented over-subscription limitation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TickReport {
    pub due: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub blocked: usize,
    pub exhausted: usize,
    pub outcomes: Vec<CampaignOutcome>,
}

/// Aggregate store counters for monitoring readers
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreStats {
    pub total: usize,
    pub active: usize,
    pub expired: usize,
    pub due: usize,
}

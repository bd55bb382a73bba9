//! In-memory retry state store
//!
//! The scheduler's working set: a concurrency-safe mapping from campaign id
//! to its retry state. Single logical writer (the owning scheduler, plus the
//! configuration manager at configuration time); concurrent reads for
//! statistics and monitoring observe a consistent snapshot per entry. All
//! state mutation is copy-and-replace under the write lock, never in place
//! on a reference handed out to a reader.
//!
//! This store is a cache of the durable configuration store, not
//! authoritative storage; entries are disabled, never silently deleted, so
//! the attempt history stays available for audit.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use redrive_domain::{
    CampaignRetryState, RetryAttempt, RetryWindow, StopSignal, StoreStats,
};
use tracing::{debug, info, warn};

/// Concurrency-safe key→state mapping for campaign retry state
#[derive(Debug, Default)]
pub struct RetryStateStore {
    entries: RwLock<HashMap<String, CampaignRetryState>>,
}

impl RetryStateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }

    /// Create new state or replace the window on an existing one
    ///
    /// Recomputes `is_expired` against `now`. Attempt history on an existing
    /// entry is preserved.
    pub fn upsert(&self, campaign_id: &str, window: RetryWindow, now: DateTime<Utc>) {
        let mut entries = self.entries.write();
        match entries.get(campaign_id) {
            Some(existing) => {
                let mut next = existing.clone();
                next.retry_window = window;
                next.is_expired = next.retry_window.is_expired_at(now);
                entries.insert(campaign_id.to_string(), next);
                debug!(campaign_id = %campaign_id, "Replaced retry window");
            }
            None => {
                entries.insert(
                    campaign_id.to_string(),
                    CampaignRetryState::new(campaign_id, window, now),
                );
                debug!(campaign_id = %campaign_id, "Created retry state");
            }
        }
    }

    /// Append an attempt and update `last_attempt_at`
    ///
    /// Atomic with respect to concurrent readers: the entry is replaced in
    /// one step, so no partial append is ever visible. Returns false for an
    /// unknown campaign.
    pub fn record_attempt(
        &self,
        campaign_id: &str,
        attempt: RetryAttempt,
        now: DateTime<Utc>,
    ) -> bool {
        let mut entries = self.entries.write();
        let Some(existing) = entries.get(campaign_id) else {
            warn!(campaign_id = %campaign_id, "record_attempt for unknown campaign");
            return false;
        };

        let mut next = existing.clone();
        next.last_attempt_at = attempt.executed_at.or(Some(attempt.scheduled_at));
        if let Some(code) = &attempt.error_code {
            next.last_error_code = Some(code.clone());
        }
        next.attempts.push(attempt);
        next.is_expired = next.retry_window.is_expired_at(now);
        entries.insert(campaign_id.to_string(), next);
        true
    }

    /// Scan for campaigns eligible for processing in this tick
    ///
    /// As a side effect, flips `is_expired` in place for any entry whose
    /// deadline has newly passed; callers must tolerate this
    /// mutation-during-scan. Yields only entries satisfying
    /// `enabled && !is_expired && next_attempt_at <= now`, earliest first.
    pub fn due_for_retry(&self, now: DateTime<Utc>) -> Vec<(String, CampaignRetryState)> {
        let mut entries = self.entries.write();
        let mut due = Vec::new();

        for (campaign_id, state) in entries.iter_mut() {
            if !state.is_expired && state.retry_window.is_expired_at(now) {
                state.is_expired = true;
                info!(
                    campaign_id = %campaign_id,
                    event = "window_expired",
                    "Retry window expired; campaign exits the due set"
                );
                continue;
            }
            if state.is_due(now) {
                due.push((campaign_id.clone(), state.clone()));
            }
        }

        due.sort_by(|(id_a, a), (id_b, b)| {
            a.next_attempt_at.cmp(&b.next_attempt_at).then_with(|| id_a.cmp(id_b))
        });
        due
    }

    /// Advance or clear a campaign's schedule (scheduler-only mutator)
    ///
    /// Returns false for an unknown campaign.
    pub fn set_next_attempt(&self, campaign_id: &str, at: Option<DateTime<Utc>>) -> bool {
        let mut entries = self.entries.write();
        let Some(existing) = entries.get(campaign_id) else {
            warn!(campaign_id = %campaign_id, "set_next_attempt for unknown campaign");
            return false;
        };

        let mut next = existing.clone();
        next.next_attempt_at = at;
        entries.insert(campaign_id.to_string(), next);
        true
    }

    /// Note the failure code that produced the upcoming schedule
    pub fn set_last_error_code(&self, campaign_id: &str, error_code: &str) -> bool {
        let mut entries = self.entries.write();
        let Some(existing) = entries.get(campaign_id) else {
            return false;
        };

        let mut next = existing.clone();
        next.last_error_code = Some(error_code.to_string());
        entries.insert(campaign_id.to_string(), next);
        true
    }

    /// Disable future scheduling without deleting attempt history
    ///
    /// Returns the number of campaigns disabled.
    pub fn clear(&self, campaign_ids: &[String]) -> usize {
        let mut entries = self.entries.write();
        let mut cleared = 0;

        for campaign_id in campaign_ids {
            if let Some(existing) = entries.get(campaign_id) {
                let mut next = existing.clone();
                next.retry_window.enabled = false;
                next.next_attempt_at = None;
                entries.insert(campaign_id.clone(), next);
                cleared += 1;
                info!(campaign_id = %campaign_id, event = "retry_cleared", "Retry disabled");
            }
        }

        cleared
    }

    /// Honor an external lifecycle signal against the window's stop flags
    ///
    /// Disables the campaign like [`RetryStateStore::clear`] when the
    /// matching `stop_on_*` flag is set; otherwise leaves it untouched.
    /// Returns whether the signal disabled the campaign.
    pub fn apply_stop_signal(
        &self,
        campaign_id: &str,
        signal: StopSignal,
        _now: DateTime<Utc>,
    ) -> bool {
        let mut entries = self.entries.write();
        let Some(existing) = entries.get(campaign_id) else {
            return false;
        };

        let stops = match signal {
            StopSignal::Converted => existing.retry_window.stop_on_conversion,
            StopSignal::ManuallyPaused => existing.retry_window.stop_on_manual_pause,
            StopSignal::TemplateChanged => existing.retry_window.stop_on_template_change,
        };
        if !stops || !existing.retry_window.enabled {
            return false;
        }

        let mut next = existing.clone();
        next.retry_window.enabled = false;
        next.next_attempt_at = None;
        entries.insert(campaign_id.to_string(), next);
        info!(
            campaign_id = %campaign_id,
            event = "stop_signal",
            signal = %signal,
            "Retry stopped by lifecycle signal"
        );
        true
    }

    /// Snapshot of a single campaign's state (monitoring read)
    pub fn get(&self, campaign_id: &str) -> Option<CampaignRetryState> {
        self.entries.read().get(campaign_id).cloned()
    }

    /// Aggregate counters for monitoring readers
    ///
    /// Read-only: expiry is evaluated against `now` without flipping flags,
    /// so this is safe to call concurrently with the scheduler at any time.
    pub fn stats(&self, now: DateTime<Utc>) -> StoreStats {
        let entries = self.entries.read();
        let mut stats = StoreStats { total: entries.len(), ..Default::default() };

        for state in entries.values() {
            let expired = state.is_expired || state.retry_window.is_expired_at(now);
            if expired {
                stats.expired += 1;
            } else if state.retry_window.enabled {
                stats.active += 1;
            }
            if !expired && state.is_due(now) {
                stats.due += 1;
            }
        }

        stats
    }

    /// Number of tracked campaigns
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

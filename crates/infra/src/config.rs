//! Retry-window configuration
//!
//! Synchronizes the durable configuration store (the system of record) with
//! the in-memory retry state store, and seeds the first retry attempt when a
//! delivery failure initiates retrying. This is also where the validation
//! entry point is consumed before any window change is accepted.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use redrive_core::{Decision, DecisionEngine, RetryConfigRepository, WindowValidation};
use redrive_domain::{
    RedriveError, Result as DomainResult, RetryWindow, StopSignal,
};
use tracing::{info, warn};

use crate::store::RetryStateStore;

/// Manager for per-campaign retry windows
pub struct RetryWindowManager {
    repo: Arc<dyn RetryConfigRepository>,
    store: Arc<RetryStateStore>,
    engine: Arc<DecisionEngine>,
}

impl RetryWindowManager {
    /// Create a manager over the config repository, state store, and engine
    pub fn new(
        repo: Arc<dyn RetryConfigRepository>,
        store: Arc<RetryStateStore>,
        engine: Arc<DecisionEngine>,
    ) -> Self {
        Self { repo, store, engine }
    }

    /// Validation entry point for configuration surfaces (RFC 3339 input)
    ///
    /// Returns a structured result with human-readable messages; never
    /// errors.
    pub fn validate(deadline: &str, window_start: &str, now: DateTime<Utc>) -> WindowValidation {
        DecisionEngine::validate_window(deadline, window_start, now)
    }

    /// Validate and apply a retry window for a campaign
    ///
    /// Writes the system of record first, then the in-memory store. When
    /// `failure_code` names the delivery failure that initiated retrying,
    /// the decision engine seeds the first attempt; a `Blocked` decision
    /// still seeds the candidate time (the scheduler's pre-dispatch gate
    /// holds it once due). Returns the seeding decision, if one was made.
    pub async fn configure(
        &self,
        campaign_id: &str,
        window: RetryWindow,
        failure_code: Option<&str>,
        now: DateTime<Utc>,
    ) -> DomainResult<Option<Decision>> {
        let Some(deadline) = window.deadline else {
            return Err(RedriveError::Validation("retry window requires a deadline".into()));
        };
        let Some(window_start) = window.window_start else {
            return Err(RedriveError::Validation("retry window requires a start".into()));
        };
        let errors = DecisionEngine::check_window_bounds(deadline, window_start, now);
        if !errors.is_empty() {
            return Err(RedriveError::Validation(errors.join("; ")));
        }

        self.repo.upsert(campaign_id, &window).await?;
        self.store.upsert(campaign_id, window, now);
        info!(campaign_id = %campaign_id, deadline = %deadline, "Retry window configured");

        let Some(code) = failure_code else {
            return Ok(None);
        };
        let Some(state) = self.store.get(campaign_id) else {
            return Ok(None);
        };

        let decision = self.engine.decide(code, &state, now).await;
        if let Some(at) = decision.next_attempt_at {
            self.store.set_next_attempt(campaign_id, Some(at));
            self.store.set_last_error_code(campaign_id, code);
            info!(
                campaign_id = %campaign_id,
                error_code = %code,
                next_attempt_at = %at,
                reason = %decision.reason,
                "First retry seeded"
            );
        } else {
            warn!(
                campaign_id = %campaign_id,
                error_code = %code,
                reason = %decision.reason,
                detail = decision.reason.describe(),
                "Failure is not retryable"
            );
        }

        Ok(Some(decision))
    }

    /// Disable retrying for the given campaigns; attempt history is retained
    ///
    /// Clears the system of record first, then the in-memory store. Returns
    /// the number of campaigns disabled in the store.
    pub async fn clear(&self, campaign_ids: &[String]) -> DomainResult<usize> {
        self.repo.clear_many(campaign_ids).await?;
        Ok(self.store.clear(campaign_ids))
    }

    /// Route an external lifecycle signal to the store
    ///
    /// When the campaign's window opts into the signal, retrying is disabled
    /// and the system of record is cleared as well.
    pub async fn apply_stop_signal(
        &self,
        campaign_id: &str,
        signal: StopSignal,
        now: DateTime<Utc>,
    ) -> DomainResult<bool> {
        let stopped = self.store.apply_stop_signal(campaign_id, signal, now);
        if stopped {
            self.repo.clear_many(&[campaign_id.to_string()]).await?;
        }
        Ok(stopped)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Duration;
    use redrive_core::{DecisionReason, PolicyTable, PreconditionOracle, RetryConfigRepository};
    use redrive_domain::constants::{ERROR_QUOTA, ERROR_TEMPLATE_INACTIVE};
    use tokio::sync::Mutex as TestMutex;

    use super::*;

    struct RecordingRepo {
        upserts: TestMutex<Vec<String>>,
        cleared: TestMutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingRepo {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                upserts: TestMutex::new(Vec::new()),
                cleared: TestMutex::new(Vec::new()),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                upserts: TestMutex::new(Vec::new()),
                cleared: TestMutex::new(Vec::new()),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl RetryConfigRepository for RecordingRepo {
        async fn upsert(&self, campaign_id: &str, _window: &RetryWindow) -> DomainResult<()> {
            if self.fail {
                return Err(RedriveError::Persistence("config store unavailable".into()));
            }
            self.upserts.lock().await.push(campaign_id.to_string());
            Ok(())
        }

        async fn clear_many(&self, campaign_ids: &[String]) -> DomainResult<()> {
            if self.fail {
                return Err(RedriveError::Persistence("config store unavailable".into()));
            }
            self.cleared.lock().await.extend(campaign_ids.iter().cloned());
            Ok(())
        }
    }

    struct AlwaysActiveOracle;

    #[async_trait]
    impl PreconditionOracle for AlwaysActiveOracle {
        async fn is_active(&self, _subject_id: &str) -> DomainResult<bool> {
            Ok(true)
        }
    }

    struct InactiveOracle;

    #[async_trait]
    impl PreconditionOracle for InactiveOracle {
        async fn is_active(&self, _subject_id: &str) -> DomainResult<bool> {
            Ok(false)
        }
    }

    fn ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).unwrap().with_timezone(&Utc)
    }

    fn manager_with(
        repo: Arc<RecordingRepo>,
        oracle: Arc<dyn PreconditionOracle>,
    ) -> (RetryWindowManager, Arc<RetryStateStore>) {
        let store = Arc::new(RetryStateStore::new());
        let engine = Arc::new(DecisionEngine::new(PolicyTable::builtin(), oracle));
        (RetryWindowManager::new(repo, Arc::clone(&store), engine), store)
    }

    #[tokio::test]
    async fn configure_seeds_the_first_retry() {
        let repo = RecordingRepo::new();
        let (manager, store) = manager_with(Arc::clone(&repo), Arc::new(AlwaysActiveOracle));
        let t0 = ts("2025-01-01T00:00:00Z");
        let window = RetryWindow::new(t0, t0 + Duration::hours(72));

        let decision = manager
            .configure("c-1", window, Some(ERROR_QUOTA), t0)
            .await
            .expect("configure succeeds")
            .expect("seeding decision");

        assert!(decision.should_retry);
        assert_eq!(decision.next_attempt_at, Some(t0 + Duration::hours(24)));

        let state = store.get("c-1").expect("state created");
        assert_eq!(state.next_attempt_at, Some(t0 + Duration::hours(24)));
        assert_eq!(state.last_error_code.as_deref(), Some(ERROR_QUOTA));
        assert_eq!(repo.upserts.lock().await.as_slice(), ["c-1".to_string()]);
    }

    #[tokio::test]
    async fn configure_rejects_invalid_windows_before_persisting() {
        let repo = RecordingRepo::new();
        let (manager, store) = manager_with(Arc::clone(&repo), Arc::new(AlwaysActiveOracle));
        let t0 = ts("2025-01-01T00:00:00Z");

        // Too short (under the 24h minimum).
        let window = RetryWindow::new(t0, t0 + Duration::hours(6));
        let err = manager
            .configure("c-1", window, Some(ERROR_QUOTA), t0)
            .await
            .expect_err("short window rejected");
        assert!(matches!(err, RedriveError::Validation(_)));

        // Nothing was written anywhere.
        assert!(repo.upserts.lock().await.is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn configure_without_failure_code_does_not_schedule() {
        let repo = RecordingRepo::new();
        let (manager, store) = manager_with(repo, Arc::new(AlwaysActiveOracle));
        let t0 = ts("2025-01-01T00:00:00Z");
        let window = RetryWindow::new(t0, t0 + Duration::hours(72));

        let decision =
            manager.configure("c-1", window, None, t0).await.expect("configure succeeds");
        assert!(decision.is_none());
        assert!(store.get("c-1").expect("state created").next_attempt_at.is_none());
    }

    #[tokio::test]
    async fn blocked_seed_still_schedules_the_candidate() {
        let repo = RecordingRepo::new();
        let (manager, store) = manager_with(repo, Arc::new(InactiveOracle));
        let t0 = ts("2025-01-01T00:00:00Z");
        let window = RetryWindow::new(t0, t0 + Duration::hours(72));

        let decision = manager
            .configure("c-1", window, Some(ERROR_TEMPLATE_INACTIVE), t0)
            .await
            .expect("configure succeeds")
            .expect("seeding decision");

        assert!(!decision.should_retry);
        assert_eq!(decision.reason, DecisionReason::Blocked);

        // Candidate is seeded; the scheduler's gate holds it once due.
        let state = store.get("c-1").expect("state created");
        assert_eq!(state.next_attempt_at, Some(t0 + Duration::hours(24)));
    }

    #[tokio::test]
    async fn persistence_failure_surfaces_and_skips_the_cache() {
        let repo = RecordingRepo::failing();
        let (manager, store) = manager_with(repo, Arc::new(AlwaysActiveOracle));
        let t0 = ts("2025-01-01T00:00:00Z");
        let window = RetryWindow::new(t0, t0 + Duration::hours(72));

        let err = manager
            .configure("c-1", window, Some(ERROR_QUOTA), t0)
            .await
            .expect_err("persistence error surfaces");
        assert!(matches!(err, RedriveError::Persistence(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn clear_disables_in_both_stores() {
        let repo = RecordingRepo::new();
        let (manager, store) = manager_with(Arc::clone(&repo), Arc::new(AlwaysActiveOracle));
        let t0 = ts("2025-01-01T00:00:00Z");
        let window = RetryWindow::new(t0, t0 + Duration::hours(72));
        manager.configure("c-1", window, Some(ERROR_QUOTA), t0).await.expect("configured");

        let cleared = manager.clear(&["c-1".to_string()]).await.expect("clear succeeds");
        assert_eq!(cleared, 1);
        assert_eq!(repo.cleared.lock().await.as_slice(), ["c-1".to_string()]);

        let state = store.get("c-1").expect("history retained");
        assert!(!state.retry_window.enabled);
    }

    #[tokio::test]
    async fn stop_signal_clears_the_system_of_record_when_honored() {
        let repo = RecordingRepo::new();
        let (manager, store) = manager_with(Arc::clone(&repo), Arc::new(AlwaysActiveOracle));
        let t0 = ts("2025-01-01T00:00:00Z");

        let mut window = RetryWindow::new(t0, t0 + Duration::hours(72));
        window.stop_on_conversion = false;
        manager.configure("c-1", window, Some(ERROR_QUOTA), t0).await.expect("configured");

        // Signal the window does not opt into: nothing happens.
        let stopped = manager
            .apply_stop_signal("c-1", StopSignal::Converted, t0)
            .await
            .expect("signal handled");
        assert!(!stopped);
        assert!(repo.cleared.lock().await.is_empty());

        // Honored signal disables and clears the system of record.
        let stopped = manager
            .apply_stop_signal("c-1", StopSignal::ManuallyPaused, t0)
            .await
            .expect("signal handled");
        assert!(stopped);
        assert_eq!(repo.cleared.lock().await.as_slice(), ["c-1".to_string()]);
        assert!(!store.get("c-1").expect("state kept").retry_window.enabled);
    }
}

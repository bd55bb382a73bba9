//! Port interfaces for external collaborators

use async_trait::async_trait;
use redrive_domain::{AttemptOutcome, Result, RetryWindow};

/// Trait for executing one delivery attempt for a campaign
///
/// Implementations are untrusted: they must resolve or fail within a bounded
/// time of their own choosing, and the scheduler isolates their failures per
/// campaign.
#[async_trait]
pub trait CampaignExecutor: Send + Sync {
    /// Attempt delivery for the campaign
    async fn attempt(&self, campaign_id: &str) -> Result<AttemptOutcome>;
}

/// Trait for the durable retry-window configuration store
///
/// The system of record for per-campaign retry windows; the in-memory state
/// store is a cache synchronized on configuration change.
#[async_trait]
pub trait RetryConfigRepository: Send + Sync {
    /// Create or replace the retry window for a campaign
    async fn upsert(&self, campaign_id: &str, window: &RetryWindow) -> Result<()>;

    /// Clear retry configuration for the given campaigns
    async fn clear_many(&self, campaign_ids: &[String]) -> Result<()>;
}

/// Trait for the external precondition check gating conditional policies
///
/// Consulted only for policies with `requires_precondition = true`. The
/// subject id is the campaign id; the oracle owns the mapping to whatever it
/// actually checks (e.g. template activity).
#[async_trait]
pub trait PreconditionOracle: Send + Sync {
    /// Whether the subject is currently active
    async fn is_active(&self, subject_id: &str) -> Result<bool>;
}

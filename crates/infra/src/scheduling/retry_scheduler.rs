//! Retry scheduler for periodic due-campaign processing.
//!
//! Polls the in-memory retry state store for campaigns whose next attempt is
//! due, dispatches bounded-concurrency delivery attempts through the
//! external executor, records each outcome, and advances or terminates each
//! campaign's schedule via the decision engine. Join handles are tracked,
//! cancellation is explicit, and the stop path is wrapped in a timeout.
//!
//! One cooperative timer loop per scheduler instance; the store is the sole
//! shared mutable resource (single writer, concurrent readers). Running two
//! scheduler instances against one store is unsafe without external locking.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use redrive_infra::observability::SchedulerMetrics;
//! use redrive_infra::scheduling::{RetryScheduler, RetrySchedulerConfig};
//! use redrive_infra::store::RetryStateStore;
//!
//! # async fn example() -> redrive_infra::scheduling::SchedulerResult<()> {
//! let store = Arc::new(RetryStateStore::new());
//! let metrics = Arc::new(SchedulerMetrics::new());
//! // ... create executor and decision engine ...
//! # let executor = todo!(); // Arc<dyn CampaignExecutor>
//! # let engine = todo!(); // Arc<DecisionEngine>
//! let mut scheduler = RetryScheduler::with_config(
//!     RetrySchedulerConfig {
//!         tick_interval: Duration::from_secs(60),
//!         max_concurrent_retries: 5,
//!         ..Default::default()
//!     },
//!     store,
//!     executor,
//!     engine,
//!     metrics,
//! )?;
//!
//! scheduler.start().await?;
//! // ... application runs ...
//! scheduler.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use redrive_core::{CampaignExecutor, Clock, DecisionEngine, DecisionReason, SystemClock};
use redrive_domain::constants::{
    DEFAULT_JOIN_TIMEOUT_SECS, DEFAULT_MAX_CONCURRENT_RETRIES, DEFAULT_TICK_INTERVAL_SECS,
};
use redrive_domain::{
    AttemptOutcome, AttemptStatus, CampaignOutcome, CampaignRetryState, RetryAttempt, TickReport,
};
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::observability::{MetricsResult, SchedulerMetrics};
use crate::scheduling::error::{SchedulerError, SchedulerResult};
use crate::store::RetryStateStore;

/// Configuration for the retry scheduler.
#[derive(Debug, Clone)]
pub struct RetrySchedulerConfig {
    /// Interval between due-campaign scans
    pub tick_interval: Duration,
    /// Maximum number of campaigns attempted per tick; campaigns beyond the
    /// limit simply wait for the next tick (no cross-tick fairness)
    pub max_concurrent_retries: usize,
    /// Join timeout when stopping
    pub join_timeout: Duration,
}

impl Default for RetrySchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(DEFAULT_TICK_INTERVAL_SECS),
            max_concurrent_retries: DEFAULT_MAX_CONCURRENT_RETRIES,
            join_timeout: Duration::from_secs(DEFAULT_JOIN_TIMEOUT_SECS),
        }
    }
}

/// Collaborators cloned into the tick loop to avoid too many arguments
struct TickContext {
    store: Arc<RetryStateStore>,
    executor: Arc<dyn CampaignExecutor>,
    engine: Arc<DecisionEngine>,
    clock: Arc<dyn Clock>,
    metrics: Arc<SchedulerMetrics>,
    max_concurrent: usize,
}

/// Retry scheduler with explicit lifecycle management.
pub struct RetryScheduler {
    store: Arc<RetryStateStore>,
    executor: Arc<dyn CampaignExecutor>,
    engine: Arc<DecisionEngine>,
    clock: Arc<dyn Clock>,
    config: RetrySchedulerConfig,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
    tick_gate: Arc<TokioMutex<()>>,
    metrics: Arc<SchedulerMetrics>,
}

impl RetryScheduler {
    /// Create a scheduler with the default configuration.
    pub fn new(
        store: Arc<RetryStateStore>,
        executor: Arc<dyn CampaignExecutor>,
        engine: Arc<DecisionEngine>,
        metrics: Arc<SchedulerMetrics>,
    ) -> SchedulerResult<Self> {
        Self::with_config(RetrySchedulerConfig::default(), store, executor, engine, metrics)
    }

    /// Create a scheduler with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidConfig` for a zero tick interval or a
    /// zero concurrency limit - the only fail-fast point in the subsystem.
    pub fn with_config(
        config: RetrySchedulerConfig,
        store: Arc<RetryStateStore>,
        executor: Arc<dyn CampaignExecutor>,
        engine: Arc<DecisionEngine>,
        metrics: Arc<SchedulerMetrics>,
    ) -> SchedulerResult<Self> {
        if config.tick_interval.is_zero() {
            return Err(SchedulerError::InvalidConfig("tick_interval must be non-zero".into()));
        }
        if config.max_concurrent_retries == 0 {
            return Err(SchedulerError::InvalidConfig(
                "max_concurrent_retries must be at least 1".into(),
            ));
        }

        Ok(Self {
            store,
            executor,
            engine,
            clock: Arc::new(SystemClock),
            config,
            cancellation: CancellationToken::new(),
            task_handle: None,
            tick_gate: Arc::new(TokioMutex::new(())),
            metrics,
        })
    }

    /// Replace the wall clock (deterministic tests).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Start the scheduler, spawning the background tick loop.
    ///
    /// Idempotent: starting a running scheduler logs and no-ops.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            warn!(
                scheduler = "retry",
                event = "start_ignored",
                "Scheduler already running; start is a no-op"
            );
            return Ok(());
        }

        info!("Starting retry scheduler");

        // Create fresh cancellation token (supports restart after stop)
        self.cancellation = CancellationToken::new();

        let context = self.build_context();
        let interval = self.config.tick_interval;
        let gate = Arc::clone(&self.tick_gate);
        let cancel = self.cancellation.clone();

        let handle = tokio::spawn(async move {
            Self::process_loop(context, interval, gate, cancel).await;
        });

        self.task_handle = Some(handle);
        info!("Retry scheduler started");

        Ok(())
    }

    /// Stop the scheduler and wait for the tick loop to finish.
    ///
    /// Idempotent: stopping a stopped scheduler logs and no-ops. An in-flight
    /// tick is allowed to finish rather than being interrupted, to avoid
    /// partially-applied state updates.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            warn!(
                scheduler = "retry",
                event = "stop_ignored",
                "Scheduler not running; stop is a no-op"
            );
            return Ok(());
        }

        info!("Stopping retry scheduler");

        // Cancel background task
        self.cancellation.cancel();

        // Await join handle with timeout
        if let Some(handle) = self.task_handle.take() {
            let join_timeout = self.config.join_timeout;
            match tokio::time::timeout(join_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("Scheduler task panicked: {}", e);
                    return Err(SchedulerError::TaskJoinFailed(e.to_string()));
                }
                Err(source) => {
                    warn!("Scheduler task did not complete within timeout");
                    return Err(SchedulerError::Timeout { duration: join_timeout, source });
                }
            }
        }

        info!("Retry scheduler stopped");
        self.cancellation = CancellationToken::new();

        Ok(())
    }

    /// Returns true when a scheduler loop is active.
    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    /// Run one tick synchronously on demand.
    ///
    /// Waits for an in-flight timer tick rather than interleaving with it.
    ///
    /// # Errors
    ///
    /// Fails immediately with `SchedulerError::NotRunning` when the
    /// scheduler is stopped.
    pub async fn process_now(&self) -> SchedulerResult<TickReport> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        let _guard = self.tick_gate.lock().await;
        let context = self.build_context();
        Ok(Self::process_tick(&context).await)
    }

    fn build_context(&self) -> TickContext {
        TickContext {
            store: Arc::clone(&self.store),
            executor: Arc::clone(&self.executor),
            engine: Arc::clone(&self.engine),
            clock: Arc::clone(&self.clock),
            metrics: Arc::clone(&self.metrics),
            max_concurrent: self.config.max_concurrent_retries,
        }
    }

    /// Background tick loop.
    ///
    /// The tick as a whole completes before the loop accepts the next timer
    /// fire; a fire that lands while the gate is held (a manual trigger in
    /// flight) is skipped with a warning, never queued.
    async fn process_loop(
        context: TickContext,
        interval: Duration,
        gate: Arc<TokioMutex<()>>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Retry scheduler loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    let Ok(_guard) = gate.try_lock() else {
                        warn!(
                            scheduler = "retry",
                            event = "tick_skipped",
                            "Previous tick still executing; skipping this fire"
                        );
                        log_metric(context.metrics.record_skipped_tick(), "scheduler.retry.tick.skipped");
                        continue;
                    };

                    let started = Instant::now();
                    let report = Self::process_tick(&context).await;
                    log_metric(
                        context.metrics.record_tick(started.elapsed()),
                        "scheduler.retry.tick.duration",
                    );

                    if report.due > 0 {
                        info!(
                            scheduler = "retry",
                            event = "tick_complete",
                            due = report.due,
                            processed = report.processed,
                            succeeded = report.succeeded,
                            failed = report.failed,
                            blocked = report.blocked,
                            exhausted = report.exhausted,
                            "Tick completed"
                        );
                    }
                }
            }
        }
    }

    /// Process one tick: scan, truncate, dispatch, record, reschedule.
    ///
    /// Per-campaign failures are converted to outcome records and never
    /// abort sibling work; the report is returned, never raised.
    async fn process_tick(context: &TickContext) -> TickReport {
        let now = context.clock.now();
        let due = context.store.due_for_retry(now);
        let mut report = TickReport { due: due.len(), ..Default::default() };

        if due.is_empty() {
            debug!("No campaigns due for retry");
            return report;
        }

        let batch: Vec<_> = due.into_iter().take(context.max_concurrent).collect();
        info!(
            scheduler = "retry",
            event = "tick_started",
            due = report.due,
            batch = batch.len(),
            "Processing due campaigns"
        );

        // Pre-dispatch precondition gate: a blocked campaign keeps its
        // schedule untouched, so it stays due and is re-checked every tick
        // until the oracle flips or the window expires.
        let mut dispatch = Vec::new();
        for (campaign_id, state) in batch {
            if let Some(code) = state.last_error_code.clone() {
                if context.engine.is_blocked(&code, &campaign_id).await {
                    debug!(
                        campaign_id = %campaign_id,
                        error_code = %code,
                        "Campaign blocked by precondition; re-checking next tick"
                    );
                    log_metric(context.metrics.record_blocked(), "scheduler.retry.blocked");
                    report.blocked += 1;
                    report.outcomes.push(CampaignOutcome {
                        campaign_id,
                        status: AttemptStatus::Skipped,
                        error_code: Some(code),
                        next_attempt_at: state.next_attempt_at,
                        reason: Some(DecisionReason::Blocked.describe().to_string()),
                    });
                    continue;
                }
            }
            dispatch.push((campaign_id, state));
        }

        // Concurrent dispatch on separate tasks; one campaign's executor
        // failure or panic must not affect any other campaign in the batch.
        let handles: Vec<_> = dispatch
            .iter()
            .map(|(campaign_id, _)| {
                let executor = Arc::clone(&context.executor);
                let campaign_id = campaign_id.clone();
                tokio::spawn(async move {
                    match executor.attempt(&campaign_id).await {
                        Ok(outcome) => outcome,
                        Err(err) => {
                            warn!(
                                campaign_id = %campaign_id,
                                error = %err,
                                "Executor failed for campaign"
                            );
                            AttemptOutcome {
                                success: false,
                                error_code: None,
                                message: err.to_string(),
                            }
                        }
                    }
                })
            })
            .collect();
        let joined = join_all(handles).await;
        report.processed = joined.len();
        log_metric(
            context.metrics.record_dispatched(joined.len()),
            "scheduler.retry.dispatched",
        );

        for ((campaign_id, state), joined_outcome) in dispatch.into_iter().zip(joined) {
            let outcome = match joined_outcome {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(
                        campaign_id = %campaign_id,
                        error = %err,
                        "Executor task aborted"
                    );
                    AttemptOutcome { success: false, error_code: None, message: err.to_string() }
                }
            };
            let (record, reason) =
                Self::apply_outcome(context, campaign_id, &state, outcome, now).await;

            match record.status {
                AttemptStatus::Completed => report.succeeded += 1,
                _ => report.failed += 1,
            }
            if reason.is_some_and(DecisionReason::is_terminal) {
                report.exhausted += 1;
            }
            report.outcomes.push(record);
        }

        report
    }

    /// Record one executor outcome and advance or terminate the schedule.
    async fn apply_outcome(
        context: &TickContext,
        campaign_id: String,
        state: &CampaignRetryState,
        outcome: AttemptOutcome,
        now: DateTime<Utc>,
    ) -> (CampaignOutcome, Option<DecisionReason>) {
        let attempt_number = state.attempt_count() as u32 + 1;
        let status =
            if outcome.success { AttemptStatus::Completed } else { AttemptStatus::Failed };
        let attempt = RetryAttempt {
            attempt_number,
            scheduled_at: state.next_attempt_at.unwrap_or(now),
            executed_at: Some(now),
            status,
            error_code: outcome.error_code.clone(),
        };
        context.store.record_attempt(&campaign_id, attempt, now);

        if outcome.success {
            // Successful delivery: no further scheduling, the campaign falls
            // out of the due set.
            context.store.set_next_attempt(&campaign_id, None);
            log_metric(context.metrics.record_succeeded(), "scheduler.retry.succeeded");
            info!(
                campaign_id = %campaign_id,
                event = "attempt_succeeded",
                attempt = attempt_number,
                "Campaign delivered"
            );
            let record = CampaignOutcome {
                campaign_id,
                status,
                error_code: None,
                next_attempt_at: None,
                reason: None,
            };
            return (record, None);
        }

        log_metric(context.metrics.record_failed(), "scheduler.retry.failed");
        let error_code = outcome.error_code.clone().unwrap_or_default();

        // Re-read so the decision sees the attempt just recorded.
        let Some(updated) = context.store.get(&campaign_id) else {
            warn!(campaign_id = %campaign_id, "State disappeared mid-tick");
            let record = CampaignOutcome {
                campaign_id,
                status,
                error_code: outcome.error_code,
                next_attempt_at: None,
                reason: Some("state missing".to_string()),
            };
            return (record, None);
        };

        let decision = context.engine.decide(&error_code, &updated, now).await;
        match decision.reason {
            DecisionReason::Scheduled => {
                context.store.set_next_attempt(&campaign_id, decision.next_attempt_at);
                info!(
                    campaign_id = %campaign_id,
                    event = "retry_scheduled",
                    attempt = attempt_number,
                    error_code = %error_code,
                    next_attempt_at = ?decision.next_attempt_at,
                    "Next retry scheduled"
                );
                let record = CampaignOutcome {
                    campaign_id,
                    status,
                    error_code: outcome.error_code,
                    next_attempt_at: decision.next_attempt_at,
                    reason: None,
                };
                (record, Some(DecisionReason::Scheduled))
            }
            DecisionReason::Blocked => {
                // Not terminal: the schedule stays in place so the campaign
                // is re-evaluated next tick until the deadline passes.
                info!(
                    campaign_id = %campaign_id,
                    event = "retry_blocked",
                    attempt = attempt_number,
                    error_code = %error_code,
                    "Retry blocked by precondition"
                );
                let record = CampaignOutcome {
                    campaign_id,
                    status,
                    error_code: outcome.error_code,
                    next_attempt_at: updated.next_attempt_at,
                    reason: Some(DecisionReason::Blocked.describe().to_string()),
                };
                (record, Some(DecisionReason::Blocked))
            }
            reason => {
                context.store.set_next_attempt(&campaign_id, None);
                log_metric(context.metrics.record_exhausted(), "scheduler.retry.exhausted");
                info!(
                    campaign_id = %campaign_id,
                    event = "retry_exhausted",
                    attempt = attempt_number,
                    error_code = %error_code,
                    reason = %reason,
                    "Campaign exits the retry due set"
                );
                let record = CampaignOutcome {
                    campaign_id,
                    status,
                    error_code: outcome.error_code,
                    next_attempt_at: None,
                    reason: Some(reason.describe().to_string()),
                };
                (record, Some(reason))
            }
        }
    }
}

fn log_metric(result: MetricsResult<()>, metric: &'static str) {
    if let Err(err) = result {
        warn!(metric = metric, error = ?err, "Failed to record scheduler metric");
    }
}

impl Drop for RetryScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("RetryScheduler dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}

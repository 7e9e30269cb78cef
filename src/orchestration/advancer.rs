//! # Item Advancer
//!
//! Implements the `Advance` contract: load the item, resolve its stage
//! handler, execute it through the retry executor, and route the outcome
//! through the state machine. Callers must hold the item's lease; the
//! advancer itself never dispatches two executions for one item because the
//! worker pool claims before advancing.

use super::stage_handler::{HandlerContext, StageHandlerRegistry};
use crate::error::{PipelineError, Result};
use crate::models::{ContentItem, ItemRepository};
use crate::resilience::CancellationFlag;
use crate::state_machine::{ItemEvent, ItemStateMachine, Stage};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What happened to an item during one advance call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Stage handler succeeded; the item moved to the new stage
    Advanced(Stage),
    /// Item waits on human approval; re-polled on the slow cadence
    AwaitingApproval,
    /// Item's publish time has not arrived yet
    NotDue,
    /// Dependency circuit is open; requeued without consuming retry budget
    Requeued,
    /// Item transitioned to `Failed`
    Failed,
    /// Item transitioned to `Cancelled`
    Cancelled,
    /// Item already terminal; nothing to do
    Terminal,
}

/// Aggregate pipeline counters for dashboards
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    pub started: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub cancelled: AtomicU64,
    completion_ms_total: AtomicU64,
}

/// Read-only snapshot of [`PipelineMetrics`]
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub avg_completion_seconds: f64,
}

impl PipelineMetrics {
    pub fn record_completion(&self, elapsed_ms: u64) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.completion_ms_total.fetch_add(elapsed_ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let completed = self.completed.load(Ordering::Relaxed);
        let total_ms = self.completion_ms_total.load(Ordering::Relaxed);
        MetricsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            completed,
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            avg_completion_seconds: if completed > 0 {
                (total_ms as f64 / completed as f64) / 1000.0
            } else {
                0.0
            },
        }
    }
}

/// Drives single items through their next stage transition
pub struct ItemAdvancer {
    repository: Arc<dyn ItemRepository>,
    state_machine: Arc<ItemStateMachine>,
    registry: Arc<StageHandlerRegistry>,
    context: Arc<HandlerContext>,
    metrics: Arc<PipelineMetrics>,
    approval_poll_interval: chrono::Duration,
    cancel_flags: DashMap<Uuid, CancellationFlag>,
}

impl ItemAdvancer {
    pub fn new(
        repository: Arc<dyn ItemRepository>,
        state_machine: Arc<ItemStateMachine>,
        registry: Arc<StageHandlerRegistry>,
        context: Arc<HandlerContext>,
        metrics: Arc<PipelineMetrics>,
        approval_poll_interval: std::time::Duration,
    ) -> Self {
        Self {
            repository,
            state_machine,
            registry,
            context,
            metrics,
            approval_poll_interval: chrono::Duration::from_std(approval_poll_interval)
                .unwrap_or_else(|_| chrono::Duration::seconds(300)),
            cancel_flags: DashMap::new(),
        }
    }

    /// Cancellation flag for one item; created on first use
    pub fn cancel_flag(&self, item_id: Uuid) -> CancellationFlag {
        self.cancel_flags
            .entry(item_id)
            .or_insert_with(|| CancellationFlag::for_item(item_id))
            .clone()
    }

    /// Advance one item through its next stage. The caller holds the lease.
    pub async fn advance(&self, item_id: Uuid) -> Result<AdvanceOutcome> {
        let mut item = self.repository.load(item_id).await?;

        if item.is_terminal() {
            return Ok(AdvanceOutcome::Terminal);
        }

        let cancel = self.cancel_flag(item_id);
        if cancel.is_cancelled() {
            return self.apply_cancel(&mut item).await;
        }

        // The approval gate is neither success nor failure; the item idles
        // on the slow poll cadence until an operator acts
        if item.stage.requires_approval() {
            self.repository
                .park(
                    item_id,
                    Utc::now() + self.approval_poll_interval,
                    item.attempt,
                )
                .await?;
            return Ok(AdvanceOutcome::AwaitingApproval);
        }

        // Scheduled items wait for their publish time
        if item.stage == Stage::Scheduled {
            if let Some(scheduled_at) = item.outputs.scheduled_at {
                if scheduled_at > Utc::now() {
                    self.repository
                        .park(item_id, scheduled_at, item.attempt)
                        .await?;
                    return Ok(AdvanceOutcome::NotDue);
                }
            }
        }

        let Some(handler) = self.registry.for_stage(item.stage) else {
            return Err(PipelineError::InvalidTransition {
                from: item.stage.to_string(),
                event: "no handler registered".to_string(),
            });
        };

        debug!(
            item_id = %item_id,
            stage = %item.stage,
            "executing stage handler"
        );

        match handler.execute(&mut item, &self.context, &cancel).await {
            Ok(()) => self.apply_success(&mut item).await,
            Err(err) if matches!(err, PipelineError::DependencyUnavailable { .. }) => {
                // Circuit open: requeue on the probe cadence, budget intact
                self.repository
                    .park(
                        item_id,
                        Utc::now() + chrono::Duration::seconds(30),
                        item.attempt,
                    )
                    .await?;
                debug!(item_id = %item_id, error = %err, "requeued on open circuit");
                Ok(AdvanceOutcome::Requeued)
            }
            Err(PipelineError::Cancelled { .. }) => self.apply_cancel(&mut item).await,
            Err(err) if err.is_permanent() => self.apply_failure(&mut item, err).await,
            Err(err) if err.is_transient() => {
                // The executor exhausts transient budgets internally; one
                // escaping here is rescheduled without losing the item
                let attempt = item.attempt + 1;
                self.repository
                    .park(
                        item_id,
                        Utc::now() + chrono::Duration::seconds(5),
                        attempt,
                    )
                    .await?;
                warn!(item_id = %item_id, error = %err, "transient failure, rescheduled");
                Ok(AdvanceOutcome::Requeued)
            }
            Err(err) => Err(err),
        }
    }

    async fn apply_success(&self, item: &mut ContentItem) -> Result<AdvanceOutcome> {
        match self
            .apply_with_conflict_retry(item, ItemEvent::HandlerSucceeded)
            .await
        {
            Ok(new_stage) => {
                if new_stage == Stage::Analyzed {
                    let elapsed_ms = (item.updated_at - item.created_at)
                        .num_milliseconds()
                        .max(0) as u64;
                    self.metrics.record_completion(elapsed_ms);
                    self.cancel_flags.remove(&item.item_id);
                    info!(item_id = %item.item_id, "✅ pipeline completed");
                }
                Ok(AdvanceOutcome::Advanced(new_stage))
            }
            Err(err) => Err(err),
        }
    }

    async fn apply_failure(
        &self,
        item: &mut ContentItem,
        err: PipelineError,
    ) -> Result<AdvanceOutcome> {
        let attempts = match &err {
            PipelineError::RetryExhausted { attempts, .. } => *attempts,
            _ => 1,
        };
        item.record_failure(err.class(), attempts, err.to_string());

        self.apply_with_conflict_retry(item, ItemEvent::fail_with_error(err.to_string()))
            .await?;
        self.metrics.failed.fetch_add(1, Ordering::Relaxed);
        self.cancel_flags.remove(&item.item_id);
        Ok(AdvanceOutcome::Failed)
    }

    async fn apply_cancel(&self, item: &mut ContentItem) -> Result<AdvanceOutcome> {
        item.record_audit("cancel", item.stage, Stage::Cancelled);
        self.apply_with_conflict_retry(item, ItemEvent::Cancel)
            .await?;
        self.metrics.cancelled.fetch_add(1, Ordering::Relaxed);
        self.cancel_flags.remove(&item.item_id);
        info!(item_id = %item.item_id, "item cancelled");
        Ok(AdvanceOutcome::Cancelled)
    }

    /// Apply a transition; on a version conflict, reload and recompute once.
    /// A second conflict is treated as transient and surfaces to the caller.
    pub async fn apply_with_conflict_retry(
        &self,
        item: &mut ContentItem,
        event: ItemEvent,
    ) -> Result<Stage> {
        match self.state_machine.apply(item, event.clone()).await {
            Ok(stage) => Ok(stage),
            Err(PipelineError::ConcurrencyConflict { .. }) => {
                warn!(
                    item_id = %item.item_id,
                    "version conflict, reloading and recomputing transition"
                );
                let fresh = self.repository.load(item.item_id).await?;
                let outputs = item.outputs.clone();
                let failures = item.failures.clone();
                let audit_log = item.audit_log.clone();
                *item = fresh;
                item.outputs = outputs;
                item.failures = failures;
                item.audit_log = audit_log;

                self.state_machine.apply(item, event).await.map_err(|err| {
                    match err {
                        PipelineError::ConcurrencyConflict { item_id, .. } => {
                            PipelineError::transient(
                                "repository",
                                format!("repeated version conflict on item {item_id}"),
                            )
                        }
                        other => other,
                    }
                })
            }
            Err(err) => Err(err),
        }
    }
}

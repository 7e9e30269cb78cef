use super::{
    events::ItemEvent,
    guards::{ForwardOrderGuard, NotTerminalGuard, RetryTargetGuard, StateGuard},
    states::Stage,
};
use crate::constants::topics;
use crate::error::{PipelineError, Result};
use crate::events::{EventBus, PipelineEvent};
use crate::models::{ContentItem, ItemRepository};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// State machine applying lifecycle transitions to content items.
///
/// This is the sole writer of `ContentItem.stage` and `version`. Callers
/// mutate outputs and failure records on their working copy, then route the
/// transition through [`apply`](Self::apply), which persists with optimistic
/// concurrency and publishes exactly one event per transition.
pub struct ItemStateMachine {
    repository: Arc<dyn ItemRepository>,
    bus: Arc<EventBus>,
    guards: Vec<Box<dyn StateGuard>>,
}

impl ItemStateMachine {
    pub fn new(repository: Arc<dyn ItemRepository>, bus: Arc<EventBus>) -> Self {
        Self {
            repository,
            bus,
            guards: vec![
                Box::new(NotTerminalGuard),
                Box::new(ForwardOrderGuard),
                Box::new(RetryTargetGuard),
            ],
        }
    }

    /// Determine the target stage for an event applied to the current stage
    pub fn determine_target_state(&self, current: Stage, event: &ItemEvent) -> Result<Stage> {
        let target = match (current, event) {
            // Initial transition, applied once to a freshly inserted item
            (Stage::Discovered, ItemEvent::Enqueue) => Stage::Discovered,

            // Automated handler completions
            (Stage::Discovered, ItemEvent::HandlerSucceeded) => Stage::BlueprintGenerated,
            (Stage::Approved, ItemEvent::HandlerSucceeded) => Stage::Scheduled,
            (Stage::Scheduled, ItemEvent::HandlerSucceeded) => Stage::Published,
            (Stage::Published, ItemEvent::HandlerSucceeded) => Stage::Analyzed,

            // Human approval gate
            (Stage::BlueprintGenerated, ItemEvent::Approve) => Stage::Approved,

            // Terminal side-exits from any non-terminal stage
            (from, ItemEvent::Fail(_)) if !from.is_terminal() => Stage::Failed,
            (from, ItemEvent::Cancel) if !from.is_terminal() => Stage::Cancelled,

            // Audited operator override
            (_, ItemEvent::RetryFrom(stage)) => *stage,

            (from, event) => {
                return Err(PipelineError::InvalidTransition {
                    from: from.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }

    /// Apply a transition: guard checks, persist, publish one event.
    ///
    /// On success the item's stage and version reflect the new state. A
    /// `ConcurrencyConflict` from the repository is returned to the caller,
    /// which reloads and recomputes once before treating it as transient.
    pub async fn apply(&self, item: &mut ContentItem, event: ItemEvent) -> Result<Stage> {
        let from_stage = if matches!(event, ItemEvent::Enqueue) {
            None
        } else {
            Some(item.stage)
        };
        let target = self.determine_target_state(item.stage, &event)?;

        for guard in &self.guards {
            if let Err(err) = guard.check(item, target, &event) {
                warn!(
                    item_id = %item.item_id,
                    guard = guard.description(),
                    from = %item.stage,
                    event = event.event_type(),
                    "transition rejected by guard"
                );
                return Err(err);
            }
        }

        let expected_version = item.version;
        item.stage = target;
        item.version += 1;
        item.attempt = 0;
        item.updated_at = Utc::now();
        if !target.is_terminal() {
            item.next_attempt_at = item.updated_at;
        }

        self.repository.save(item.clone(), expected_version).await?;

        let payload = serde_json::json!({
            "event": event.event_type(),
            "topic": item.topic,
            "version": item.version,
            "error": event.error_message(),
        });
        self.bus
            .publish(PipelineEvent::transition(
                topics::ITEM_TRANSITIONED,
                item.item_id,
                from_stage,
                target,
                payload,
            ))
            .await;

        match &event {
            ItemEvent::Fail(message) => info!(
                item_id = %item.item_id,
                from = ?from_stage,
                error = %message,
                "🔴 item failed"
            ),
            _ => debug!(
                item_id = %item.item_id,
                from = ?from_stage,
                to = %target,
                version = item.version,
                "item transitioned"
            ),
        }

        Ok(target)
    }
}

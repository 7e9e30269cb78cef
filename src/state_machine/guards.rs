use super::events::ItemEvent;
use super::states::Stage;
use crate::error::{PipelineError, Result};
use crate::models::ContentItem;

/// Trait for implementing state transition guards
pub trait StateGuard: Send + Sync {
    /// Check if a transition is allowed
    fn check(&self, item: &ContentItem, target: Stage, event: &ItemEvent) -> Result<()>;

    /// Description of this guard for logging
    fn description(&self) -> &'static str;
}

/// Guard rejecting transitions out of terminal states
pub struct NotTerminalGuard;

impl StateGuard for NotTerminalGuard {
    fn check(&self, item: &ContentItem, _target: Stage, event: &ItemEvent) -> Result<()> {
        if item.stage.is_terminal() && !matches!(event, ItemEvent::RetryFrom(_)) {
            return Err(PipelineError::InvalidTransition {
                from: item.stage.to_string(),
                event: event.event_type().to_string(),
            });
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "item must not be in a terminal state"
    }
}

/// Guard enforcing forward-only stage progression.
///
/// The stage order only ever advances, except for the audited `RetryFrom`
/// operator override and the terminal side-exits to `Failed`/`Cancelled`.
pub struct ForwardOrderGuard;

impl StateGuard for ForwardOrderGuard {
    fn check(&self, item: &ContentItem, target: Stage, event: &ItemEvent) -> Result<()> {
        match event {
            // Initial enqueue lands on the first stage rather than advancing
            ItemEvent::Enqueue => Ok(()),
            ItemEvent::RetryFrom(_) => Ok(()),
            _ if target == Stage::Failed || target == Stage::Cancelled => Ok(()),
            _ => {
                if item.stage.precedes(target) {
                    Ok(())
                } else {
                    Err(PipelineError::InvalidTransition {
                        from: item.stage.to_string(),
                        event: event.event_type().to_string(),
                    })
                }
            }
        }
    }

    fn description(&self) -> &'static str {
        "stage must advance forward in pipeline order"
    }
}

/// Guard validating the target of an operator retry override
pub struct RetryTargetGuard;

impl StateGuard for RetryTargetGuard {
    fn check(&self, _item: &ContentItem, target: Stage, event: &ItemEvent) -> Result<()> {
        if let ItemEvent::RetryFrom(stage) = event {
            if stage.is_terminal() || *stage != target {
                return Err(PipelineError::InvalidTransition {
                    from: stage.to_string(),
                    event: event.event_type().to_string(),
                });
            }
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "retry override must target a non-terminal pipeline stage"
    }
}

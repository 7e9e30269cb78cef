use super::states::Stage;
use serde::{Deserialize, Serialize};

/// Events that can trigger content item stage transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ItemEvent {
    /// Enqueue a freshly discovered topic (no prior stage)
    Enqueue,
    /// The current stage's handler completed; advance to the next stage
    HandlerSucceeded,
    /// Operator approved the generated blueprint
    Approve,
    /// Permanent failure or retry exhaustion with error message
    Fail(String),
    /// Operator cancelled the item
    Cancel,
    /// Audited operator override: rewind to the named stage
    RetryFrom(Stage),
}

impl ItemEvent {
    /// String representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Enqueue => "enqueue",
            Self::HandlerSucceeded => "handler_succeeded",
            Self::Approve => "approve",
            Self::Fail(_) => "fail",
            Self::Cancel => "cancel",
            Self::RetryFrom(_) => "retry_from",
        }
    }

    /// Extract the error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }

    /// Whether this event moves the item into a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Fail(_) | Self::Cancel)
    }

    /// Create a failure event with the given error message
    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_types() {
        assert_eq!(ItemEvent::Enqueue.event_type(), "enqueue");
        assert_eq!(
            ItemEvent::RetryFrom(Stage::Scheduled).event_type(),
            "retry_from"
        );
        assert_eq!(ItemEvent::fail_with_error("boom").event_type(), "fail");
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            ItemEvent::fail_with_error("rate limited").error_message(),
            Some("rate limited")
        );
        assert_eq!(ItemEvent::Approve.error_message(), None);
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle stages of a content item, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Initial state when a discovered topic is enqueued
    Discovered,
    /// Content blueprint generated, awaiting human approval
    BlueprintGenerated,
    /// Operator approved the blueprint
    Approved,
    /// Media rendered, caption attached, publish time chosen
    Scheduled,
    /// Posted to the configured platforms
    Published,
    /// Performance snapshot collected
    Analyzed,
    /// Retry exhaustion or permanent error
    Failed,
    /// Operator cancelled the item
    Cancelled,
}

impl Stage {
    /// Pipeline order of the forward stages; terminals have no position
    pub fn order_index(&self) -> Option<usize> {
        match self {
            Self::Discovered => Some(0),
            Self::BlueprintGenerated => Some(1),
            Self::Approved => Some(2),
            Self::Scheduled => Some(3),
            Self::Published => Some(4),
            Self::Analyzed => Some(5),
            Self::Failed | Self::Cancelled => None,
        }
    }

    /// The next stage in pipeline order, if any
    pub fn next(&self) -> Option<Stage> {
        match self {
            Self::Discovered => Some(Self::BlueprintGenerated),
            Self::BlueprintGenerated => Some(Self::Approved),
            Self::Approved => Some(Self::Scheduled),
            Self::Scheduled => Some(Self::Published),
            Self::Published => Some(Self::Analyzed),
            Self::Analyzed | Self::Failed | Self::Cancelled => None,
        }
    }

    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Analyzed | Self::Failed | Self::Cancelled)
    }

    /// Check if this stage waits on human confirmation rather than a handler
    pub fn requires_approval(&self) -> bool {
        matches!(self, Self::BlueprintGenerated)
    }

    /// Whether moving to `target` respects the forward pipeline order
    pub fn precedes(&self, target: Stage) -> bool {
        match (self.order_index(), target.order_index()) {
            (Some(from), Some(to)) => to > from,
            _ => false,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovered => write!(f, "discovered"),
            Self::BlueprintGenerated => write!(f, "blueprint_generated"),
            Self::Approved => write!(f, "approved"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::Published => write!(f, "published"),
            Self::Analyzed => write!(f, "analyzed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discovered" => Ok(Self::Discovered),
            "blueprint_generated" => Ok(Self::BlueprintGenerated),
            "approved" => Ok(Self::Approved),
            "scheduled" => Ok(Self::Scheduled),
            "published" => Ok(Self::Published),
            "analyzed" => Ok(Self::Analyzed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid stage: {s}")),
        }
    }
}

/// Initial stage for newly enqueued items
impl Default for Stage {
    fn default() -> Self {
        Self::Discovered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_check() {
        assert!(Stage::Analyzed.is_terminal());
        assert!(Stage::Failed.is_terminal());
        assert!(Stage::Cancelled.is_terminal());
        assert!(!Stage::Discovered.is_terminal());
        assert!(!Stage::Scheduled.is_terminal());
    }

    #[test]
    fn test_stage_order() {
        assert_eq!(Stage::Discovered.next(), Some(Stage::BlueprintGenerated));
        assert_eq!(Stage::Published.next(), Some(Stage::Analyzed));
        assert_eq!(Stage::Analyzed.next(), None);
        assert_eq!(Stage::Failed.next(), None);

        assert!(Stage::Discovered.precedes(Stage::Published));
        assert!(!Stage::Published.precedes(Stage::Discovered));
        assert!(!Stage::Failed.precedes(Stage::Analyzed));
    }

    #[test]
    fn test_stage_string_conversion() {
        assert_eq!(Stage::BlueprintGenerated.to_string(), "blueprint_generated");
        assert_eq!("scheduled".parse::<Stage>().unwrap(), Stage::Scheduled);
        assert!("bogus".parse::<Stage>().is_err());
    }

    #[test]
    fn test_stage_serde() {
        let json = serde_json::to_string(&Stage::Published).unwrap();
        assert_eq!(json, "\"published\"");
        let parsed: Stage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, Stage::Published);
    }

    #[test]
    fn test_approval_gate() {
        assert!(Stage::BlueprintGenerated.requires_approval());
        assert!(!Stage::Approved.requires_approval());
    }
}

//! # Content Item Model
//!
//! The unit of work driven through the pipeline. The item is owned by the
//! state machine: stage and version change only through its transition
//! function; stage handlers contribute outputs which the owning worker
//! merges in before the transition is persisted.

use crate::state_machine::states::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A content item moving through the publishing lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    /// Unique identifier
    pub item_id: Uuid,
    /// Source topic/trend reference
    pub topic: String,
    /// Stable hash over generation-determining inputs; cache and idempotency key
    pub fingerprint: String,
    /// Current lifecycle stage
    pub stage: Stage,
    /// Monotonically increasing version for optimistic concurrency
    pub version: u64,
    /// Attempt counter for the current stage
    pub attempt: u32,
    /// Accumulated stage outputs
    pub outputs: StageOutputs,
    /// Failure history for diagnostics
    pub failures: Vec<FailureRecord>,
    /// Operator override audit trail
    pub audit_log: Vec<AuditEntry>,
    /// Earliest instant the item should next be picked up by a worker
    pub next_attempt_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outputs accumulated as stages complete
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageOutputs {
    /// Generated content blueprint text
    pub blueprint: Option<String>,
    /// Generated caption
    pub caption: Option<String>,
    /// Generated hashtags
    pub hashtags: Vec<String>,
    /// Reference to rendered media
    pub media_ref: Option<String>,
    /// Chosen publish time
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Platform name to platform post identifier
    pub platform_post_ids: std::collections::HashMap<String, String>,
    /// Collected performance snapshot
    pub performance: Option<PerformanceSnapshot>,
}

/// Post-publication performance numbers pulled from the platforms
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
    pub collected_at: Option<DateTime<Utc>>,
}

/// Summary of a failed stage execution, persisted for diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Stage the failure occurred in
    pub stage: Stage,
    /// Error classification label (transient, rate_limited, permanent, ...)
    pub error_class: String,
    /// Attempts consumed before giving up
    pub attempts: u32,
    /// Last error message observed
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Audited record of an operator override
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Operator action name (approve, cancel, retry_from)
    pub action: String,
    pub from_stage: Stage,
    pub to_stage: Stage,
    pub recorded_at: DateTime<Utc>,
}

impl ContentItem {
    /// Create a new item for a discovered topic.
    ///
    /// The fingerprint is a SHA-256 over the generation-determining inputs
    /// (topic and discovery seed), so re-discovered topics with identical
    /// inputs share cache entries.
    pub fn new(topic: impl Into<String>, fingerprint_seed: &str) -> Self {
        let topic = topic.into();
        let now = Utc::now();
        Self {
            item_id: Uuid::new_v4(),
            fingerprint: compute_fingerprint(&topic, fingerprint_seed),
            topic,
            stage: Stage::default(),
            version: 0,
            attempt: 0,
            outputs: StageOutputs::default(),
            failures: Vec::new(),
            audit_log: Vec::new(),
            next_attempt_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the item has reached a terminal stage
    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Whether a worker may pick this item up now
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        !self.is_terminal() && self.next_attempt_at <= now
    }

    /// Record a stage failure for diagnostics
    pub fn record_failure(&mut self, error_class: &str, attempts: u32, message: impl Into<String>) {
        self.failures.push(FailureRecord {
            stage: self.stage,
            error_class: error_class.to_string(),
            attempts,
            message: message.into(),
            occurred_at: Utc::now(),
        });
    }

    /// Record an audited operator action
    pub fn record_audit(&mut self, action: &str, from_stage: Stage, to_stage: Stage) {
        self.audit_log.push(AuditEntry {
            action: action.to_string(),
            from_stage,
            to_stage,
            recorded_at: Utc::now(),
        });
    }

    /// Completion fraction for dashboards, by stage position
    pub fn progress_percent(&self) -> u8 {
        match self.stage.order_index() {
            Some(idx) => ((idx as f64 / 5.0) * 100.0).round() as u8,
            None => 100,
        }
    }
}

/// Stable hash over the inputs that determine generated content
pub fn compute_fingerprint(topic: &str, seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(topic.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(seed.as_bytes());
    hex::encode(hasher.finalize())
}

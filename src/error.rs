//! # Pipeline Error Taxonomy
//!
//! Structured error types for the orchestration core. Every failure that can
//! reach the state machine is classified as transient (retryable), permanent
//! (fails the stage), or one of the distinguished control-flow outcomes
//! (circuit open, version conflict, operator cancellation).

use std::time::Duration;
use uuid::Uuid;

/// Errors produced by pipeline components and external collaborators
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    /// Retryable failure from an external collaborator (network error, 5xx)
    #[error("transient failure from {dependency}: {message}")]
    Transient { dependency: String, message: String },

    /// Stage handler exceeded its invocation deadline; retried as transient
    #[error("operation {operation} timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    /// Rate-limit response (429-equivalent); retried as transient
    #[error("rate limited by {dependency}")]
    RateLimited { dependency: String },

    /// Non-retryable failure (validation, malformed input, 4xx)
    #[error("permanent failure: {message}")]
    Permanent { message: String },

    /// Content rejected by platform policy; never retried
    #[error("content policy rejection from {dependency}: {message}")]
    ContentPolicy { dependency: String, message: String },

    /// Circuit open: the dependency is known unavailable, no attempt was made
    #[error("dependency {dependency} is unavailable (circuit open)")]
    DependencyUnavailable { dependency: String },

    /// Retry budget exhausted; treated as a stage-level permanent failure
    #[error("retry budget exhausted for {dependency} after {attempts} attempts: {last_error}")]
    RetryExhausted {
        dependency: String,
        attempts: u32,
        last_error: String,
    },

    /// Optimistic concurrency: the stored version did not match expectations
    #[error("version conflict on item {item_id}: expected {expected}, found {actual}")]
    ConcurrencyConflict {
        item_id: Uuid,
        expected: u64,
        actual: u64,
    },

    /// Operator cancelled the item; terminal outcome, not a fault
    #[error("item {item_id} was cancelled")]
    Cancelled { item_id: Uuid },

    /// Attempted state transition is not in the transition table
    #[error("invalid transition from {from} via {event}")]
    InvalidTransition { from: String, event: String },

    /// Item is not present in the repository
    #[error("content item {item_id} not found")]
    ItemNotFound { item_id: Uuid },

    /// Another worker holds the lease for this item
    #[error("item {item_id} is leased by {holder}")]
    ItemLeased { item_id: Uuid, holder: String },

    /// Configuration loading or validation failure
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Event bus failure
    #[error("event error: {0}")]
    Event(String),
}

impl PipelineError {
    /// Whether the retry executor should retry this error.
    ///
    /// A repeated `ConcurrencyConflict` is reclassified as transient by the
    /// caller after one reload-and-recompute cycle; it is not retryable at
    /// the executor level.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transient { .. } | Self::Timeout { .. } | Self::RateLimited { .. }
        )
    }

    /// Whether this error permanently fails the current stage
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::Permanent { .. } | Self::ContentPolicy { .. } | Self::RetryExhausted { .. }
        )
    }

    /// Short classification label used in failure records and log fields
    pub fn class(&self) -> &'static str {
        match self {
            Self::Transient { .. } => "transient",
            Self::Timeout { .. } => "timeout",
            Self::RateLimited { .. } => "rate_limited",
            Self::Permanent { .. } => "permanent",
            Self::ContentPolicy { .. } => "content_policy",
            Self::DependencyUnavailable { .. } => "dependency_unavailable",
            Self::RetryExhausted { .. } => "retry_exhausted",
            Self::ConcurrencyConflict { .. } => "concurrency_conflict",
            Self::Cancelled { .. } => "cancelled",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::ItemNotFound { .. } => "item_not_found",
            Self::ItemLeased { .. } => "item_leased",
            Self::Configuration(_) => "configuration",
            Self::Event(_) => "event",
        }
    }

    /// Convenience constructor for transient collaborator failures
    pub fn transient(dependency: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            dependency: dependency.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for permanent failures
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

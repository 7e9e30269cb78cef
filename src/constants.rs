//! # System Constants
//!
//! Event topics, dependency names, and operational defaults shared across
//! the orchestration core.

/// Event topics published on the bus
pub mod topics {
    /// Every stage transition of a content item, exactly one per transition;
    /// the payload carries the triggering event (fail, cancel, retry_from, ...)
    pub const ITEM_TRANSITIONED: &str = "item.transitioned";

    /// Any dependency status change (healthy/degraded/unavailable)
    pub const DEPENDENCY_STATUS_CHANGED: &str = "dependency.status_changed";
    /// Dependency became unavailable; stage dispatch pauses
    pub const DEPENDENCY_DOWN: &str = "dependency.down";
    /// Dependency left the unavailable state; stage dispatch resumes
    pub const DEPENDENCY_RECOVERED: &str = "dependency.recovered";

    /// Wildcard subscription receiving every published event
    pub const ALL: &str = "*";
}

/// Names of the external dependencies probed by the health monitor
pub mod dependencies {
    /// Generative-content provider (blueprints, captions)
    pub const CONTENT_PROVIDER: &str = "content_provider";
    /// Voice/rendering service
    pub const RENDERER: &str = "renderer";
    /// Prefix for per-platform publisher dependencies
    pub const PLATFORM_PREFIX: &str = "platform.";

    /// Dependency name for a named platform publisher
    pub fn platform(name: &str) -> String {
        format!("{PLATFORM_PREFIX}{name}")
    }
}

/// Operational defaults; overridable through configuration
pub mod defaults {
    /// Cache TTL, kept shorter than a typical trend lifetime
    pub const CACHE_TTL_SECONDS: u64 = 1800;
    /// Cache sweep cadence
    pub const CACHE_SWEEP_INTERVAL_SECONDS: u64 = 60;
    /// Health probe cadence
    pub const PROBE_INTERVAL_SECONDS: u64 = 30;
    /// Slow cadence for items parked on human approval
    pub const APPROVAL_POLL_INTERVAL_SECONDS: u64 = 300;
    /// Lease duration; an expired lease frees a stranded item
    pub const LEASE_TTL_SECONDS: u64 = 120;
    /// Worker pool size
    pub const WORKER_COUNT: usize = 4;
    /// Per-subscriber event channel capacity
    pub const EVENT_CHANNEL_CAPACITY: usize = 1024;
    /// Per-observer fan-out ring capacity (drop-oldest on overflow)
    pub const OBSERVER_QUEUE_CAPACITY: usize = 64;
}

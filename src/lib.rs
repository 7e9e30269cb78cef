//! # Pipeline Core
//!
//! Rust core of the autonomous content-publishing pipeline: drives each
//! content item through its lifecycle state machine, decouples stages
//! through an event bus, retries transient failures with backoff, caches
//! expensive idempotent computations, and monitors dependent services to
//! pause and resume work.
//!
//! ## Architecture
//!
//! The surrounding product (upload forms, analytics dashboards, HTTP
//! routes) consumes this crate through the [`orchestration::PipelineCore`]
//! facade and the collaborator traits in [`services`]. Everything stateful
//! lives behind narrow concurrency-safe APIs.
//!
//! ## Module Organization
//!
//! - [`models`] - the content item unit of work and the repository seam
//! - [`state_machine`] - lifecycle stages, guards, and the transition function
//! - [`orchestration`] - worker pool, leases, stage handlers, core facade
//! - [`resilience`] - retry executor, backoff policy, cancellation
//! - [`health`] - dependency probing and circuit-breaking status
//! - [`cache`] - TTL cache keyed by content fingerprint and stage
//! - [`events`] - pub/sub bus and the dashboard notification fan-out
//! - [`config`] - YAML configuration with environment overlays
//! - [`error`] - the error taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pipeline_core::config::PipelineConfig;
//! use pipeline_core::orchestration::PipelineCore;
//! use pipeline_core::services::Collaborators;
//!
//! # async fn example(collaborators: Collaborators) -> Result<(), Box<dyn std::error::Error>> {
//! let core = PipelineCore::builder(PipelineConfig::default())
//!     .collaborators(collaborators)
//!     .build()?;
//! core.start().await;
//!
//! let item_id = core.enqueue("malayalam cooking trend", "yt:abc123").await?;
//! let status = core.pipeline_status(item_id).await?;
//! println!("item {} is at stage {}", status.item_id, status.stage);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod health;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod resilience;
pub mod services;
pub mod state_machine;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use events::{EventBus, PipelineEvent};
pub use health::{DependencyHealth, DependencyStatus, HealthMonitor};
pub use models::{ContentItem, FailureRecord};
pub use orchestration::{AdvanceOutcome, PipelineCore};
pub use resilience::{RetryExecutor, RetryPolicy};
pub use state_machine::{ItemEvent, Stage};

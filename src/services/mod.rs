//! # External Collaborator Interfaces
//!
//! Narrow async traits for the unreliable third-party services the pipeline
//! chains together. Implementations live outside the core (HTTP clients,
//! SDK wrappers); the orchestrator only ever sees these contracts, always
//! called through the retry executor.

use crate::error::Result;
use crate::models::PerformanceSnapshot;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Caption with platform hashtags from the generative-content provider
#[derive(Debug, Clone)]
pub struct Caption {
    pub text: String,
    pub hashtags: Vec<String>,
}

/// A topic surfaced by the discovery collaborator
#[derive(Debug, Clone)]
pub struct DiscoveredTopic {
    pub topic: String,
    /// Seed mixed into the content fingerprint
    pub fingerprint_seed: String,
}

/// Everything a platform needs to publish one piece of content
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub blueprint: String,
    pub caption: Option<String>,
    pub hashtags: Vec<String>,
    pub media_ref: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Generative-content provider: blueprints and captions
#[async_trait]
pub trait ContentProvider: Send + Sync {
    async fn generate_blueprint(&self, topic: &str) -> Result<String>;

    async fn generate_caption(&self, content_summary: &str) -> Result<Caption>;
}

/// One social-platform publishing API
#[async_trait]
pub trait PlatformPublisher: Send + Sync {
    /// Platform name, also used as the health-monitor dependency suffix
    fn name(&self) -> &str;

    /// Publish and return the platform's post identifier
    async fn publish(&self, request: &PublishRequest) -> Result<String>;

    /// Pull the current performance numbers for a published post
    async fn fetch_metrics(&self, post_id: &str) -> Result<PerformanceSnapshot>;
}

/// Voice/rendering service turning a script into a media asset
#[async_trait]
pub trait MediaRenderer: Send + Sync {
    async fn render(&self, script: &str) -> Result<String>;
}

/// Source of new topics; polled by the discovery loop
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    async fn poll(&self) -> Result<Vec<DiscoveredTopic>>;
}

/// The collaborator set stage handlers execute against
#[derive(Clone)]
pub struct Collaborators {
    pub content_provider: Arc<dyn ContentProvider>,
    pub renderer: Arc<dyn MediaRenderer>,
    pub publishers: Vec<Arc<dyn PlatformPublisher>>,
}

//! Shared fixtures: scripted collaborator mocks and a core builder with
//! test-friendly timings.
#![allow(dead_code)]

use async_trait::async_trait;
use pipeline_core::config::PipelineConfig;
use pipeline_core::error::{PipelineError, Result};
use pipeline_core::health::DependencyProbe;
use pipeline_core::models::PerformanceSnapshot;
use pipeline_core::orchestration::PipelineCore;
use pipeline_core::services::{
    Caption, Collaborators, ContentProvider, MediaRenderer, PlatformPublisher, PublishRequest,
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Content provider returning deterministic output and counting calls
#[derive(Default)]
pub struct MockContentProvider {
    pub blueprint_calls: AtomicU32,
    pub caption_calls: AtomicU32,
    /// Transient failures to serve before blueprint generation succeeds
    pub blueprint_failures: AtomicU32,
}

#[async_trait]
impl ContentProvider for MockContentProvider {
    async fn generate_blueprint(&self, topic: &str) -> Result<String> {
        self.blueprint_calls.fetch_add(1, Ordering::SeqCst);
        if self.blueprint_failures.load(Ordering::SeqCst) > 0 {
            self.blueprint_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(PipelineError::transient("content_provider", "503"));
        }
        Ok(format!("blueprint for {topic}"))
    }

    async fn generate_caption(&self, content_summary: &str) -> Result<Caption> {
        self.caption_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Caption {
            text: format!("caption: {content_summary}"),
            hashtags: vec!["#trending".to_string(), "#viral".to_string()],
        })
    }
}

/// Renderer returning a synthetic media reference
#[derive(Default)]
pub struct MockRenderer {
    pub render_calls: AtomicU32,
}

#[async_trait]
impl MediaRenderer for MockRenderer {
    async fn render(&self, script: &str) -> Result<String> {
        self.render_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("media://{}", script.len()))
    }
}

/// Platform publisher with a scriptable rate-limit budget
pub struct MockPublisher {
    name: String,
    pub post_id: String,
    pub publish_calls: AtomicU32,
    pub metrics_calls: AtomicU32,
    /// Remaining 429 responses to serve before publishing succeeds;
    /// `u32::MAX` rate-limits forever
    pub rate_limits_remaining: AtomicU32,
}

impl MockPublisher {
    pub fn new(name: &str, post_id: &str) -> Self {
        Self {
            name: name.to_string(),
            post_id: post_id.to_string(),
            publish_calls: AtomicU32::new(0),
            metrics_calls: AtomicU32::new(0),
            rate_limits_remaining: AtomicU32::new(0),
        }
    }

    pub fn always_rate_limited(name: &str) -> Self {
        let publisher = Self::new(name, "unused");
        publisher
            .rate_limits_remaining
            .store(u32::MAX, Ordering::SeqCst);
        publisher
    }
}

#[async_trait]
impl PlatformPublisher for MockPublisher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, _request: &PublishRequest) -> Result<String> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.rate_limits_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != u32::MAX {
                self.rate_limits_remaining.fetch_sub(1, Ordering::SeqCst);
            }
            return Err(PipelineError::RateLimited {
                dependency: format!("platform.{}", self.name),
            });
        }
        Ok(self.post_id.clone())
    }

    async fn fetch_metrics(&self, _post_id: &str) -> Result<PerformanceSnapshot> {
        self.metrics_calls.fetch_add(1, Ordering::SeqCst);
        Ok(PerformanceSnapshot {
            views: 1000,
            likes: 50,
            comments: 10,
            collected_at: None,
        })
    }
}

/// Discovery source serving a fixed batch once, then nothing
pub struct MockDiscoverySource {
    batch: parking_lot::Mutex<Vec<pipeline_core::services::DiscoveredTopic>>,
}

impl MockDiscoverySource {
    pub fn with_topics(topics: Vec<(&str, &str)>) -> Self {
        Self {
            batch: parking_lot::Mutex::new(
                topics
                    .into_iter()
                    .map(|(topic, seed)| pipeline_core::services::DiscoveredTopic {
                        topic: topic.to_string(),
                        fingerprint_seed: seed.to_string(),
                    })
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl pipeline_core::services::DiscoverySource for MockDiscoverySource {
    async fn poll(&self) -> Result<Vec<pipeline_core::services::DiscoveredTopic>> {
        Ok(self.batch.lock().drain(..).collect())
    }
}

/// Probe whose outcome follows a shared switch
pub struct SwitchProbe {
    pub up: Arc<AtomicBool>,
}

#[async_trait]
impl DependencyProbe for SwitchProbe {
    async fn probe(&self) -> Result<()> {
        if self.up.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PipelineError::transient("probe", "connection refused"))
        }
    }
}

/// Mock collaborator bundle retained by tests for call assertions
pub struct TestHarness {
    pub core: Arc<PipelineCore>,
    pub content_provider: Arc<MockContentProvider>,
    pub renderer: Arc<MockRenderer>,
    pub publisher: Arc<MockPublisher>,
}

/// Configuration with millisecond backoffs and immediate publishing
pub fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.retry.max_attempts = 4;
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 10;
    config.retry.jitter_fraction = 0.0;
    config.retry.stage_deadline_seconds = 5;
    config.workers.count = 2;
    config.workers.poll_interval_ms = 20;
    config.workers.approval_poll_interval_seconds = 3600;
    config.scheduling.publish_offset_seconds = 0;
    config
}

/// Build a core around mock collaborators and a single platform publisher
pub fn build_harness(config: PipelineConfig, publisher: MockPublisher) -> TestHarness {
    build_harness_with_probes(config, publisher, Vec::new())
}

/// Same as [`build_harness`] with health probes registered
pub fn build_harness_with_probes(
    config: PipelineConfig,
    publisher: MockPublisher,
    probes: Vec<(String, Arc<dyn DependencyProbe>)>,
) -> TestHarness {
    let content_provider = Arc::new(MockContentProvider::default());
    let renderer = Arc::new(MockRenderer::default());
    let publisher = Arc::new(publisher);

    let collaborators = Collaborators {
        content_provider: content_provider.clone(),
        renderer: renderer.clone(),
        publishers: vec![publisher.clone()],
    };

    let mut builder = PipelineCore::builder(config).collaborators(collaborators);
    for (name, probe) in probes {
        builder = builder.probe(&name, probe);
    }

    let core = Arc::new(builder.build().expect("core builds"));

    TestHarness {
        core,
        content_provider,
        renderer,
        publisher,
    }
}

//! # Pipeline Core
//!
//! Wires the components together and exposes the narrow surface the
//! surrounding product consumes: enqueue, operator controls, event
//! subscriptions, the health snapshot, and pipeline status/metrics queries.

use super::advancer::{ItemAdvancer, MetricsSnapshot, PipelineMetrics};
use super::item_claimer::ItemClaimer;
use super::stage_handler::{HandlerContext, StageHandlerRegistry};
use super::worker_pool::WorkerPool;
use crate::cache::StageCache;
use crate::config::PipelineConfig;
use crate::constants::dependencies;
use crate::error::{PipelineError, Result};
use crate::events::{EventBus, NotificationFanout, PipelineEvent};
use crate::health::{DependencyHealthView, DependencyProbe, DependencyStatus, HealthMonitor};
use crate::models::{ContentItem, InMemoryItemRepository, ItemRepository};
use crate::resilience::{CancellationFlag, RetryExecutor};
use crate::services::{Collaborators, DiscoverySource};
use crate::state_machine::{ItemEvent, ItemStateMachine, Stage};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

/// Dashboard-facing status for one item
#[derive(Debug, Clone, Serialize)]
pub struct ItemStatus {
    pub item_id: Uuid,
    pub topic: String,
    pub stage: Stage,
    pub version: u64,
    pub attempt: u32,
    pub progress_percent: u8,
    pub failure_count: usize,
    pub updated_at: DateTime<Utc>,
}

/// Builder assembling a [`PipelineCore`] from collaborators and config
pub struct PipelineCoreBuilder {
    config: PipelineConfig,
    collaborators: Option<Collaborators>,
    repository: Option<Arc<dyn ItemRepository>>,
    probes: Vec<(String, Arc<dyn DependencyProbe>)>,
}

impl PipelineCoreBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            collaborators: None,
            repository: None,
            probes: Vec::new(),
        }
    }

    pub fn collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = Some(collaborators);
        self
    }

    /// Override the bundled in-memory repository with a durable store
    pub fn repository(mut self, repository: Arc<dyn ItemRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Register a health probe for a dependency
    pub fn probe(mut self, name: &str, probe: Arc<dyn DependencyProbe>) -> Self {
        self.probes.push((name.to_string(), probe));
        self
    }

    pub fn build(self) -> Result<PipelineCore> {
        self.config.validate()?;
        let collaborators = self.collaborators.ok_or_else(|| {
            PipelineError::Configuration("collaborators are required".to_string())
        })?;
        let repository = self
            .repository
            .unwrap_or_else(|| Arc::new(InMemoryItemRepository::new()));

        let bus = Arc::new(EventBus::new(self.config.events.channel_capacity));
        let cache = Arc::new(StageCache::new(self.config.cache.ttl()));
        let health = Arc::new(HealthMonitor::new(
            bus.clone(),
            self.config.health.monitor_config(),
        ));
        for (name, probe) in self.probes {
            health.register(&name, probe);
        }

        let executor = Arc::new(RetryExecutor::new(
            health.clone() as Arc<dyn DependencyHealthView>
        ));
        let registry = Arc::new(StageHandlerRegistry::standard(&collaborators));
        let context = Arc::new(HandlerContext {
            cache: cache.clone(),
            executor,
            policy: self.config.retry.policy(),
            deadline: self.config.retry.stage_deadline(),
            collaborators,
            scheduling: self.config.scheduling.clone(),
        });

        let state_machine = Arc::new(ItemStateMachine::new(repository.clone(), bus.clone()));
        let metrics = Arc::new(PipelineMetrics::default());
        let advancer = Arc::new(ItemAdvancer::new(
            repository.clone(),
            state_machine.clone(),
            registry.clone(),
            context,
            metrics.clone(),
            self.config.workers.approval_poll_interval(),
        ));
        let claimer = Arc::new(ItemClaimer::new(self.config.workers.lease_ttl()));
        let worker_pool = Arc::new(WorkerPool::new(
            repository.clone(),
            advancer.clone(),
            claimer.clone(),
            registry,
            bus.clone(),
            self.config.workers.clone(),
        ));
        let fanout = Arc::new(NotificationFanout::with_capacity(
            self.config.events.observer_queue_capacity,
        ));

        Ok(PipelineCore {
            config: self.config,
            repository,
            bus,
            cache,
            health,
            state_machine,
            advancer,
            claimer,
            worker_pool,
            fanout,
            metrics,
            shutdown: CancellationFlag::new(),
            handles: Mutex::new(Vec::new()),
        })
    }
}

/// The autonomous pipeline orchestrator
pub struct PipelineCore {
    config: PipelineConfig,
    repository: Arc<dyn ItemRepository>,
    bus: Arc<EventBus>,
    cache: Arc<StageCache>,
    health: Arc<HealthMonitor>,
    state_machine: Arc<ItemStateMachine>,
    advancer: Arc<ItemAdvancer>,
    claimer: Arc<ItemClaimer>,
    worker_pool: Arc<WorkerPool>,
    fanout: Arc<NotificationFanout>,
    metrics: Arc<PipelineMetrics>,
    shutdown: CancellationFlag,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl PipelineCore {
    pub fn builder(config: PipelineConfig) -> PipelineCoreBuilder {
        PipelineCoreBuilder::new(config)
    }

    /// Start the background loops: health probing, cache sweeping, the
    /// worker pool, and the notification fan-out
    pub async fn start(&self) {
        let mut spawned = Vec::new();
        spawned.push(self.health.start(self.shutdown.clone()));
        spawned.push(
            self.cache
                .start_sweeper(self.config.cache.sweep_interval()),
        );
        spawned.push(self.fanout.clone().run(self.bus.clone()).await);
        spawned.extend(self.worker_pool.start(self.shutdown.clone()).await);
        self.handles.lock().extend(spawned);
        info!("🚦 pipeline core started");
    }

    /// Stop background loops; in-flight stage executions finish their
    /// current attempt first
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles: Vec<JoinHandle<()>> = self.handles.lock().drain(..).collect();
        for handle in handles {
            handle.abort();
        }
        info!("pipeline core stopped");
    }

    /// Enqueue a discovered topic; returns the new item's id
    pub async fn enqueue(&self, topic: &str, fingerprint_seed: &str) -> Result<Uuid> {
        let mut item = ContentItem::new(topic, fingerprint_seed);
        let item_id = item.item_id;

        // Parked until the enqueue transition publishes; keeps workers from
        // racing the initial save
        item.next_attempt_at = DateTime::<Utc>::MAX_UTC;
        self.repository.insert(item.clone()).await?;
        self.state_machine.apply(&mut item, ItemEvent::Enqueue).await?;
        self.metrics.started.fetch_add(1, Ordering::Relaxed);

        info!(item_id = %item_id, topic = topic, "📥 item enqueued");
        Ok(item_id)
    }

    /// Operator approval of a generated blueprint
    pub async fn approve(&self, item_id: Uuid) -> Result<()> {
        let mut item = self.repository.load(item_id).await?;
        item.record_audit("approve", item.stage, Stage::Approved);
        self.advancer
            .apply_with_conflict_retry(&mut item, ItemEvent::Approve)
            .await?;
        info!(item_id = %item_id, "👍 item approved");
        Ok(())
    }

    /// Operator cancellation. In-flight retry loops observe the flag at
    /// their next backoff checkpoint; idle items transition immediately.
    pub async fn cancel(&self, item_id: Uuid) -> Result<()> {
        let item = self.repository.load(item_id).await?;
        if item.is_terminal() {
            return Err(PipelineError::InvalidTransition {
                from: item.stage.to_string(),
                event: "cancel".to_string(),
            });
        }

        self.advancer.cancel_flag(item_id).cancel();

        // If no worker holds the item, finish the cancellation here
        match self.claimer.claim(item_id, "operator") {
            Ok(_) => {
                let outcome = self.advancer.advance(item_id).await;
                self.claimer.release(item_id, "operator");
                outcome?;
            }
            Err(_) => {
                warn!(item_id = %item_id, "cancel requested for in-flight item");
            }
        }
        Ok(())
    }

    /// Audited operator override: rewind an item to an earlier stage and
    /// re-run it. Cached outputs for the re-run stages are invalidated so
    /// the work is actually redone.
    pub async fn retry_from_stage(&self, item_id: Uuid, stage: Stage) -> Result<()> {
        let mut item = self.repository.load(item_id).await?;
        item.record_audit("retry_from", item.stage, stage);

        let mut cursor = Some(stage);
        while let Some(current) = cursor {
            self.cache
                .invalidate(&crate::cache::CacheKey::new(&item.fingerprint, current));
            cursor = current.next();
        }

        self.advancer
            .apply_with_conflict_retry(&mut item, ItemEvent::RetryFrom(stage))
            .await?;
        info!(item_id = %item_id, stage = %stage, "🔁 operator retry from stage");
        Ok(())
    }

    /// Dashboard status for one item
    pub async fn pipeline_status(&self, item_id: Uuid) -> Result<ItemStatus> {
        let item = self.repository.load(item_id).await?;
        Ok(ItemStatus {
            item_id: item.item_id,
            topic: item.topic.clone(),
            stage: item.stage,
            version: item.version,
            attempt: item.attempt,
            progress_percent: item.progress_percent(),
            failure_count: item.failures.len(),
            updated_at: item.updated_at,
        })
    }

    /// Aggregate pipeline counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Read-only dependency health snapshot for dashboards
    pub fn dependency_health(&self) -> HashMap<String, DependencyStatus> {
        self.health.snapshot()
    }

    /// Subscribe to an event topic
    pub async fn subscribe(&self, topic: &str) -> tokio::sync::mpsc::Receiver<PipelineEvent> {
        self.bus.subscribe(topic).await
    }

    /// Attach a dashboard observer to the notification fan-out
    pub fn attach_observer(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.fanout.attach()
    }

    /// Cache hit/miss counters
    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.cache.stats()
    }

    /// Poll a discovery source on an interval and enqueue what it surfaces
    pub fn start_discovery(
        self: &Arc<Self>,
        source: Arc<dyn DiscoverySource>,
        interval: Duration,
    ) -> JoinHandle<()> {
        let core = Arc::clone(self);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match source.poll().await {
                            Ok(topics) => {
                                for discovered in topics {
                                    if let Err(err) = core
                                        .enqueue(&discovered.topic, &discovered.fingerprint_seed)
                                        .await
                                    {
                                        warn!(error = %err, "discovery enqueue failed");
                                    }
                                }
                            }
                            Err(err) => warn!(error = %err, "discovery poll failed"),
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        })
    }

    /// Default dependency names for the standard stage handlers
    pub fn standard_dependency_names(collaborators: &Collaborators) -> Vec<String> {
        let mut names = vec![
            dependencies::CONTENT_PROVIDER.to_string(),
            dependencies::RENDERER.to_string(),
        ];
        names.extend(
            collaborators
                .publishers
                .iter()
                .map(|publisher| dependencies::platform(publisher.name())),
        );
        names
    }
}

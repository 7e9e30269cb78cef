//! # Worker Pool
//!
//! Bounded pool of workers pulling ready items from the repository and
//! advancing them under per-item leases. A supervisor task subscribes to
//! `dependency.down` / `dependency.recovered` and pauses dispatch of stages
//! whose dependencies are unavailable, resuming when they recover.

use super::advancer::ItemAdvancer;
use super::item_claimer::ItemClaimer;
use super::stage_handler::StageHandlerRegistry;
use crate::config::WorkerConfig;
use crate::constants::topics;
use crate::events::EventBus;
use crate::models::{ItemRepository, ReadyFilter};
use crate::resilience::CancellationFlag;
use chrono::Utc;
use dashmap::DashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Worker pool driving the pipeline forward
pub struct WorkerPool {
    repository: Arc<dyn ItemRepository>,
    advancer: Arc<ItemAdvancer>,
    claimer: Arc<ItemClaimer>,
    registry: Arc<StageHandlerRegistry>,
    bus: Arc<EventBus>,
    config: WorkerConfig,
    paused_dependencies: Arc<DashSet<String>>,
}

impl WorkerPool {
    pub fn new(
        repository: Arc<dyn ItemRepository>,
        advancer: Arc<ItemAdvancer>,
        claimer: Arc<ItemClaimer>,
        registry: Arc<StageHandlerRegistry>,
        bus: Arc<EventBus>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            repository,
            advancer,
            claimer,
            registry,
            bus,
            config,
            paused_dependencies: Arc::new(DashSet::new()),
        }
    }

    /// Dependencies currently pausing dispatch
    pub fn paused_dependencies(&self) -> Vec<String> {
        self.paused_dependencies
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Start the supervisor and `workers.count` worker loops
    pub async fn start(self: &Arc<Self>, shutdown: CancellationFlag) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(self.config.count + 1);
        handles.push(self.start_supervisor(shutdown.clone()).await);

        for index in 0..self.config.count {
            handles.push(self.start_worker(index, shutdown.clone()));
        }

        info!(workers = self.config.count, "⚙️ worker pool started");
        handles
    }

    /// Supervisor: pause dispatch for down dependencies, resume on recovery
    async fn start_supervisor(self: &Arc<Self>, shutdown: CancellationFlag) -> JoinHandle<()> {
        let mut down_rx = self.bus.subscribe(topics::DEPENDENCY_DOWN).await;
        let mut recovered_rx = self.bus.subscribe(topics::DEPENDENCY_RECOVERED).await;
        let paused = Arc::clone(&self.paused_dependencies);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(event) = down_rx.recv() => {
                        if let Some(name) = event.payload["dependency"].as_str() {
                            warn!(dependency = name, "⏸️ pausing dispatch for down dependency");
                            paused.insert(name.to_string());
                        }
                    }
                    Some(event) = recovered_rx.recv() => {
                        if let Some(name) = event.payload["dependency"].as_str() {
                            info!(dependency = name, "▶️ resuming dispatch, dependency recovered");
                            paused.remove(name);
                        }
                    }
                    _ = shutdown.cancelled() => break,
                    else => break,
                }
            }
            debug!("worker pool supervisor stopped");
        })
    }

    fn start_worker(self: &Arc<Self>, index: usize, shutdown: CancellationFlag) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        let worker_id = format!("worker-{index}");

        tokio::spawn(async move {
            debug!(worker_id = %worker_id, "worker started");
            loop {
                if shutdown.is_cancelled() {
                    break;
                }

                let processed = pool.process_batch(&worker_id).await;

                // Idle poll when nothing was ready; completed work loops
                // straight back for more
                if processed == 0 {
                    tokio::select! {
                        _ = tokio::time::sleep(pool.config.poll_interval()) => {}
                        _ = shutdown.cancelled() => break,
                    }
                }
            }
            debug!(worker_id = %worker_id, "worker stopped");
        })
    }

    /// Pick up and advance ready items; returns how many were processed
    async fn process_batch(&self, worker_id: &str) -> usize {
        let ready = match self
            .repository
            .list_ready(ReadyFilter::at(Utc::now()))
            .await
        {
            Ok(items) => items,
            Err(err) => {
                error!(worker_id = %worker_id, error = %err, "readiness listing failed");
                return 0;
            }
        };

        let mut processed = 0;
        for item in ready {
            if self.is_stage_paused(&item) {
                continue;
            }

            // Lease mutual exclusion: losing the claim means another worker
            // has the item
            if self.claimer.claim(item.item_id, worker_id).is_err() {
                continue;
            }

            match self.advancer.advance(item.item_id).await {
                Ok(outcome) => {
                    debug!(
                        worker_id = %worker_id,
                        item_id = %item.item_id,
                        outcome = ?outcome,
                        "item processed"
                    );
                }
                Err(err) => {
                    error!(
                        worker_id = %worker_id,
                        item_id = %item.item_id,
                        error = %err,
                        "advance failed"
                    );
                }
            }

            self.claimer.release(item.item_id, worker_id);
            processed += 1;
        }
        processed
    }

    /// Whether the item's next stage handler depends on a paused dependency
    fn is_stage_paused(&self, item: &crate::models::ContentItem) -> bool {
        if self.paused_dependencies.is_empty() {
            return false;
        }
        self.registry
            .for_stage(item.stage)
            .map(|handler| {
                handler
                    .dependencies()
                    .iter()
                    .any(|dependency| self.paused_dependencies.contains(dependency))
            })
            .unwrap_or(false)
    }
}

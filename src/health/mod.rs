//! # Health Monitor
//!
//! Background probing of the external dependencies the pipeline calls. Each
//! registered dependency is probed on a fixed interval; consecutive failures
//! walk its status from healthy through degraded to unavailable, and a
//! single successful probe walks it back one step (degraded requires one
//! success to return to healthy, which prevents flapping). The read-only
//! snapshot feeds circuit-breaking in the retry executor and the dashboard
//! health widget; `dependency.down` / `dependency.recovered` events drive
//! the worker pool's pause-and-resume self-healing.

use crate::constants::topics;
use crate::error::Result;
use crate::events::{EventBus, PipelineEvent};
use crate::resilience::CancellationFlag;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Dependency availability levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyStatus {
    Healthy,
    Degraded,
    Unavailable,
}

impl fmt::Display for DependencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Live health record for one dependency; mutated only by the monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyHealth {
    pub name: String,
    pub status: DependencyStatus,
    pub consecutive_failures: u32,
    pub last_checked: Option<DateTime<Utc>>,
    pub next_probe_due: DateTime<Utc>,
    /// Last probe round-trip; slow probes degrade the dependency
    pub response_time_ms: Option<u64>,
}

/// Lightweight availability check for one dependency
#[async_trait]
pub trait DependencyProbe: Send + Sync {
    async fn probe(&self) -> Result<()>;
}

/// Read-only view of dependency status, consumed by the retry executor
pub trait DependencyHealthView: Send + Sync {
    /// Status of a dependency; unregistered dependencies are assumed healthy
    fn status_of(&self, dependency: &str) -> DependencyStatus;
}

/// Fixed health view for embedding contexts without a running monitor
pub struct StaticHealthView {
    status: DependencyStatus,
}

impl StaticHealthView {
    pub fn new(status: DependencyStatus) -> Self {
        Self { status }
    }
}

impl DependencyHealthView for StaticHealthView {
    fn status_of(&self, _dependency: &str) -> DependencyStatus {
        self.status
    }
}

/// Thresholds and cadence for the probe loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthMonitorConfig {
    /// Interval between probe rounds
    pub probe_interval: Duration,
    /// Consecutive failures before healthy becomes degraded
    pub degraded_threshold: u32,
    /// Further consecutive failures before degraded becomes unavailable
    pub unavailable_threshold: u32,
    /// A successful probe slower than this keeps the dependency degraded
    pub slow_probe: Duration,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(crate::constants::defaults::PROBE_INTERVAL_SECONDS),
            degraded_threshold: 2,
            unavailable_threshold: 3,
            slow_probe: Duration::from_secs(5),
        }
    }
}

/// Monitors registered dependencies and publishes status-change events
pub struct HealthMonitor {
    table: DashMap<String, DependencyHealth>,
    probes: DashMap<String, Arc<dyn DependencyProbe>>,
    bus: Arc<EventBus>,
    config: HealthMonitorConfig,
}

impl HealthMonitor {
    pub fn new(bus: Arc<EventBus>, config: HealthMonitorConfig) -> Self {
        Self {
            table: DashMap::new(),
            probes: DashMap::new(),
            bus,
            config,
        }
    }

    /// Register a dependency for monitoring; starts healthy
    pub fn register(&self, name: &str, probe: Arc<dyn DependencyProbe>) {
        self.table.insert(
            name.to_string(),
            DependencyHealth {
                name: name.to_string(),
                status: DependencyStatus::Healthy,
                consecutive_failures: 0,
                last_checked: None,
                next_probe_due: Utc::now(),
                response_time_ms: None,
            },
        );
        self.probes.insert(name.to_string(), probe);
        info!(dependency = name, "dependency registered for monitoring");
    }

    /// Read-only status snapshot for dashboards
    pub fn snapshot(&self) -> HashMap<String, DependencyStatus> {
        self.table
            .iter()
            .map(|entry| (entry.key().clone(), entry.status))
            .collect()
    }

    /// Full health record for one dependency
    pub fn health_of(&self, name: &str) -> Option<DependencyHealth> {
        self.table.get(name).map(|entry| entry.clone())
    }

    /// Probe a single dependency now and apply the transition rules
    pub async fn probe_one(&self, name: &str) {
        let Some(probe) = self.probes.get(name).map(|p| Arc::clone(p.value())) else {
            return;
        };

        let started = Instant::now();
        let result = probe.probe().await;
        let elapsed = started.elapsed();

        let (old_status, new_status) = {
            let Some(mut entry) = self.table.get_mut(name) else {
                return;
            };
            let old_status = entry.status;
            let new_status = match &result {
                Ok(()) => self.status_after_success(old_status, elapsed),
                Err(_) => {
                    entry.consecutive_failures += 1;
                    self.status_after_failures(entry.consecutive_failures)
                }
            };
            if result.is_ok() {
                entry.consecutive_failures = 0;
            }
            entry.status = new_status;
            entry.last_checked = Some(Utc::now());
            entry.next_probe_due = Utc::now()
                + chrono::Duration::from_std(self.config.probe_interval)
                    .unwrap_or_else(|_| chrono::Duration::seconds(30));
            entry.response_time_ms = Some(elapsed.as_millis() as u64);
            (old_status, new_status)
        };

        if let Err(err) = result {
            debug!(dependency = name, error = %err, "probe failed");
        }

        if old_status != new_status {
            self.announce_status_change(name, old_status, new_status)
                .await;
        }
    }

    /// Probe every registered dependency once, concurrently
    pub async fn probe_all(&self) {
        let names: Vec<String> = self.probes.iter().map(|p| p.key().clone()).collect();
        futures::future::join_all(names.iter().map(|name| self.probe_one(name))).await;
    }

    /// Spawn the probe loop; ends when `shutdown` is cancelled
    pub fn start(self: &Arc<Self>, shutdown: CancellationFlag) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        info!(
            interval_s = monitor.config.probe_interval.as_secs(),
            "💓 health monitor started"
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor.config.probe_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => monitor.probe_all().await,
                    _ = shutdown.cancelled() => break,
                }
            }
            debug!("health monitor stopped");
        })
    }

    fn status_after_failures(&self, consecutive_failures: u32) -> DependencyStatus {
        if consecutive_failures >= self.config.degraded_threshold + self.config.unavailable_threshold
        {
            DependencyStatus::Unavailable
        } else if consecutive_failures >= self.config.degraded_threshold {
            DependencyStatus::Degraded
        } else {
            DependencyStatus::Healthy
        }
    }

    /// One success steps back toward healthy; a slow response stays degraded
    fn status_after_success(&self, current: DependencyStatus, elapsed: Duration) -> DependencyStatus {
        let recovered = match current {
            DependencyStatus::Unavailable => DependencyStatus::Degraded,
            DependencyStatus::Degraded | DependencyStatus::Healthy => DependencyStatus::Healthy,
        };
        if recovered == DependencyStatus::Healthy && elapsed > self.config.slow_probe {
            DependencyStatus::Degraded
        } else {
            recovered
        }
    }

    async fn announce_status_change(
        &self,
        name: &str,
        old_status: DependencyStatus,
        new_status: DependencyStatus,
    ) {
        match new_status {
            DependencyStatus::Unavailable => error!(
                dependency = name,
                from = %old_status,
                "🔴 dependency unavailable"
            ),
            DependencyStatus::Degraded => warn!(
                dependency = name,
                from = %old_status,
                "🟡 dependency degraded"
            ),
            DependencyStatus::Healthy => info!(
                dependency = name,
                from = %old_status,
                "🟢 dependency healthy"
            ),
        }

        self.bus
            .publish(PipelineEvent::dependency(
                topics::DEPENDENCY_STATUS_CHANGED,
                name,
                &new_status.to_string(),
            ))
            .await;

        if new_status == DependencyStatus::Unavailable {
            self.bus
                .publish(PipelineEvent::dependency(
                    topics::DEPENDENCY_DOWN,
                    name,
                    &new_status.to_string(),
                ))
                .await;
        } else if old_status == DependencyStatus::Unavailable {
            self.bus
                .publish(PipelineEvent::dependency(
                    topics::DEPENDENCY_RECOVERED,
                    name,
                    &new_status.to_string(),
                ))
                .await;
        }
    }
}

impl DependencyHealthView for HealthMonitor {
    fn status_of(&self, dependency: &str) -> DependencyStatus {
        self.table
            .get(dependency)
            .map(|entry| entry.status)
            .unwrap_or(DependencyStatus::Healthy)
    }
}

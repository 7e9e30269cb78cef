//! # Pipeline Configuration System
//!
//! YAML-based configuration with environment-specific overrides. A base
//! `pipeline.yaml` is merged with an optional `pipeline.{environment}.yaml`
//! overlay; every component reads its settings from the validated result.
//! All fields carry defaults so embedded and test usage can start from
//! `PipelineConfig::default()` without any files on disk.

pub mod loader;

use crate::health::HealthMonitorConfig;
use crate::resilience::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use loader::ConfigManager;

/// Root configuration structure mirroring pipeline.yaml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Retry and backoff settings for collaborator calls
    pub retry: RetryConfig,
    /// Stage output cache settings
    pub cache: CacheConfig,
    /// Health probing thresholds and cadence
    pub health: HealthConfig,
    /// Worker pool and lease settings
    pub workers: WorkerConfig,
    /// Event bus and fan-out settings
    pub events: EventsConfig,
    /// Publish scheduling settings
    pub scheduling: SchedulingConfig,
}

/// Publish scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Delay between approval and the chosen publish time
    pub publish_offset_seconds: u64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            publish_offset_seconds: 300,
        }
    }
}

impl SchedulingConfig {
    pub fn publish_offset(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.publish_offset_seconds as i64)
    }
}

/// Backoff and retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter_fraction: f64,
    /// Per-invocation deadline for a stage handler's external call
    pub stage_deadline_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            jitter_fraction: 0.1,
            stage_deadline_seconds: 60,
        }
    }
}

impl RetryConfig {
    /// Materialize the retry policy used by the executor
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            multiplier: self.multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter_fraction: self.jitter_fraction,
        }
    }

    pub fn stage_deadline(&self) -> Duration {
        Duration::from_secs(self.stage_deadline_seconds)
    }
}

/// Cache TTL and sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Default entry TTL; kept below typical trend lifetime
    pub ttl_seconds: u64,
    pub sweep_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: crate::constants::defaults::CACHE_TTL_SECONDS,
            sweep_interval_seconds: crate::constants::defaults::CACHE_SWEEP_INTERVAL_SECONDS,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

/// Health monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub probe_interval_seconds: u64,
    pub degraded_threshold: u32,
    pub unavailable_threshold: u32,
    pub slow_probe_seconds: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_interval_seconds: crate::constants::defaults::PROBE_INTERVAL_SECONDS,
            degraded_threshold: 2,
            unavailable_threshold: 3,
            slow_probe_seconds: 5,
        }
    }
}

impl HealthConfig {
    pub fn monitor_config(&self) -> HealthMonitorConfig {
        HealthMonitorConfig {
            probe_interval: Duration::from_secs(self.probe_interval_seconds),
            degraded_threshold: self.degraded_threshold,
            unavailable_threshold: self.unavailable_threshold,
            slow_probe: Duration::from_secs(self.slow_probe_seconds),
        }
    }
}

/// Worker pool and lease configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Concurrent workers pulling ready items
    pub count: usize,
    /// Idle delay between readiness polls
    pub poll_interval_ms: u64,
    /// Lease duration; expired leases free stranded items
    pub lease_ttl_seconds: u64,
    /// Slow re-poll cadence for items awaiting human approval
    pub approval_poll_interval_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: crate::constants::defaults::WORKER_COUNT,
            poll_interval_ms: 200,
            lease_ttl_seconds: crate::constants::defaults::LEASE_TTL_SECONDS,
            approval_poll_interval_seconds:
                crate::constants::defaults::APPROVAL_POLL_INTERVAL_SECONDS,
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_seconds)
    }

    pub fn approval_poll_interval(&self) -> Duration {
        Duration::from_secs(self.approval_poll_interval_seconds)
    }
}

/// Event channel sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub channel_capacity: usize,
    pub observer_queue_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: crate::constants::defaults::EVENT_CHANNEL_CAPACITY,
            observer_queue_capacity: crate::constants::defaults::OBSERVER_QUEUE_CAPACITY,
        }
    }
}

impl PipelineConfig {
    /// Validate invariants that defaults and YAML cannot both guarantee
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(crate::error::PipelineError::Configuration(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.multiplier < 1.0 {
            return Err(crate::error::PipelineError::Configuration(
                "retry.multiplier must be >= 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_fraction) {
            return Err(crate::error::PipelineError::Configuration(
                "retry.jitter_fraction must be within [0.0, 1.0]".to_string(),
            ));
        }
        if self.workers.count == 0 {
            return Err(crate::error::PipelineError::Configuration(
                "workers.count must be at least 1".to_string(),
            ));
        }
        if self.health.degraded_threshold == 0 || self.health.unavailable_threshold == 0 {
            return Err(crate::error::PipelineError::Configuration(
                "health thresholds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.cache.ttl(), Duration::from_secs(1800));
    }

    #[test]
    fn test_validation_rejects_zero_attempts() {
        let mut config = PipelineConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "retry:\n  max_attempts: 7\n";
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.retry.max_attempts, 7);
        assert_eq!(config.retry.multiplier, 2.0);
        assert_eq!(config.workers.count, 4);
    }

    #[test]
    fn test_policy_materialization() {
        let config = RetryConfig {
            max_attempts: 3,
            base_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 2000,
            jitter_fraction: 0.0,
            stage_deadline_seconds: 30,
        };
        let policy = config.policy();
        assert_eq!(policy.base_delay, Duration::from_millis(100));
        assert_eq!(policy.max_delay, Duration::from_secs(2));
    }
}

//! # Backoff Policy
//!
//! Exponential backoff with jitter. Delay for attempt `n` (1-indexed) is
//! `min(max_delay, base_delay * multiplier^(n-1))`, perturbed by ± the
//! jitter fraction so simultaneous retries across items do not synchronize
//! into retry storms.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy governing attempt budget and delay growth
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts before the failure becomes permanent
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Exponential growth factor
    pub multiplier: f64,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Fraction of the delay used as symmetric jitter (0.0 disables)
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter_fraction: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay after a failed attempt (1-indexed), with jitter applied
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay
            .mul_f64(self.multiplier.powi(attempt.saturating_sub(1) as i32));
        let clamped = exponential.min(self.max_delay);

        if self.jitter_fraction > 0.0 {
            let jitter = self.jitter_fraction * (fastrand::f64() * 2.0 - 1.0);
            clamped.mul_f64(1.0 + jitter)
        } else {
            clamped
        }
    }

    /// The delay sequence without jitter; used for logging and tests
    pub fn delay_schedule(&self) -> Vec<Duration> {
        (1..=self.max_attempts)
            .map(|attempt| {
                self.base_delay
                    .mul_f64(self.multiplier.powi(attempt.saturating_sub(1) as i32))
                    .min(self.max_delay)
            })
            .collect()
    }
}

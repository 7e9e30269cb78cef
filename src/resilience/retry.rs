//! # Retry Executor
//!
//! Wraps fallible collaborator calls with the backoff-and-retry policy.
//! Before each attempt the executor consults the health monitor for the
//! target dependency: an unavailable dependency fails fast with a
//! distinguished error, consuming no attempt budget (circuit breaking).
//! Backoff sleeps are cancellation checkpoints so an operator cancel
//! interrupts the loop between attempts, never mid-call.

use super::backoff::RetryPolicy;
use super::CancellationFlag;
use crate::error::{PipelineError, Result};
use crate::health::{DependencyHealthView, DependencyStatus};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Outcome of one attempt at one stage for one item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    TransientFailure,
    PermanentFailure,
}

/// Transient record of a single stage execution attempt.
///
/// Lives only within one `execute` invocation; exhaustion summarizes the
/// attempts into the error the state machine turns into a FailureRecord.
#[derive(Debug, Clone)]
pub struct StageAttempt {
    pub attempt: u32,
    pub started_at: Instant,
    pub ended_at: Instant,
    pub outcome: AttemptOutcome,
    /// Backoff chosen before the next attempt, if one follows
    pub backoff: Option<Duration>,
}

/// Retry executor shared by all stage handlers
pub struct RetryExecutor {
    health: Arc<dyn DependencyHealthView>,
}

impl RetryExecutor {
    pub fn new(health: Arc<dyn DependencyHealthView>) -> Self {
        Self { health }
    }

    /// Execute `operation` against `dependency` under `policy`.
    ///
    /// Each attempt runs under `deadline`; exceeding it is a transient
    /// timeout. Transient failures are retried with backoff until the
    /// attempt budget is exhausted, which converts the failure into
    /// [`PipelineError::RetryExhausted`]. Permanent errors return
    /// immediately.
    pub async fn execute<T, F, Fut>(
        &self,
        dependency: &str,
        policy: &RetryPolicy,
        deadline: Duration,
        cancel: &CancellationFlag,
        operation: F,
    ) -> Result<T>
    where
        F: Fn(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts: Vec<StageAttempt> = Vec::new();

        for attempt in 1..=policy.max_attempts {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled {
                    item_id: cancel.item_id(),
                });
            }

            // Circuit check: a known-down dependency costs no budget
            if self.health.status_of(dependency) == DependencyStatus::Unavailable {
                debug!(
                    dependency = dependency,
                    attempt = attempt,
                    "circuit open, failing fast"
                );
                return Err(PipelineError::DependencyUnavailable {
                    dependency: dependency.to_string(),
                });
            }

            let started_at = Instant::now();
            let outcome = match tokio::time::timeout(deadline, operation(attempt)).await {
                Ok(result) => result,
                Err(_) => Err(PipelineError::Timeout {
                    operation: dependency.to_string(),
                    timeout: deadline,
                }),
            };
            let ended_at = Instant::now();

            match outcome {
                Ok(value) => {
                    attempts.push(StageAttempt {
                        attempt,
                        started_at,
                        ended_at,
                        outcome: AttemptOutcome::Success,
                        backoff: None,
                    });
                    if attempt > 1 {
                        debug!(
                            dependency = dependency,
                            attempt = attempt,
                            "operation succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() => {
                    let backoff = (attempt < policy.max_attempts)
                        .then(|| policy.delay_for_attempt(attempt));
                    attempts.push(StageAttempt {
                        attempt,
                        started_at,
                        ended_at,
                        outcome: AttemptOutcome::TransientFailure,
                        backoff,
                    });

                    let Some(delay) = backoff else {
                        warn!(
                            dependency = dependency,
                            attempts = attempt,
                            error = %err,
                            "🔴 retry budget exhausted"
                        );
                        return Err(PipelineError::RetryExhausted {
                            dependency: dependency.to_string(),
                            attempts: attempt,
                            last_error: err.to_string(),
                        });
                    };

                    warn!(
                        dependency = dependency,
                        attempt = attempt,
                        backoff_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, backing off"
                    );

                    // Backoff sleep doubles as the cancellation checkpoint
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => {
                            return Err(PipelineError::Cancelled {
                                item_id: cancel.item_id(),
                            });
                        }
                    }
                }
                Err(err) => {
                    attempts.push(StageAttempt {
                        attempt,
                        started_at,
                        ended_at,
                        outcome: AttemptOutcome::PermanentFailure,
                        backoff: None,
                    });
                    warn!(
                        dependency = dependency,
                        attempt = attempt,
                        class = err.class(),
                        error = %err,
                        "permanent failure, not retrying"
                    );
                    return Err(err);
                }
            }
        }

        // max_attempts >= 1 guarantees the loop returned above
        Err(PipelineError::RetryExhausted {
            dependency: dependency.to_string(),
            attempts: attempts.len() as u32,
            last_error: "no attempts executed".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::StaticHealthView;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            multiplier: 2.0,
            max_delay: Duration::from_millis(10),
            jitter_fraction: 0.0,
        }
    }

    fn executor(status: DependencyStatus) -> RetryExecutor {
        RetryExecutor::new(Arc::new(StaticHealthView::new(status)))
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let executor = executor(DependencyStatus::Healthy);
        let calls = AtomicU32::new(0);

        let result = executor
            .execute(
                "content_provider",
                &fast_policy(3),
                Duration::from_secs(1),
                &CancellationFlag::new(),
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok("blueprint") }
                },
            )
            .await;

        assert_eq!(result.unwrap(), "blueprint");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_retried_to_exhaustion() {
        let executor = executor(DependencyStatus::Healthy);
        let calls = AtomicU32::new(0);

        let result: Result<()> = executor
            .execute(
                "platform.instagram",
                &fast_policy(4),
                Duration::from_secs(1),
                &CancellationFlag::new(),
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async {
                        Err(PipelineError::RateLimited {
                            dependency: "platform.instagram".to_string(),
                        })
                    }
                },
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(matches!(
            result,
            Err(PipelineError::RetryExhausted { attempts: 4, .. })
        ));
    }

    #[tokio::test]
    async fn test_permanent_failure_stops_immediately() {
        let executor = executor(DependencyStatus::Healthy);
        let calls = AtomicU32::new(0);

        let result: Result<()> = executor
            .execute(
                "content_provider",
                &fast_policy(5),
                Duration::from_secs(1),
                &CancellationFlag::new(),
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(PipelineError::permanent("content policy rejection")) }
                },
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(PipelineError::Permanent { .. })));
    }

    #[tokio::test]
    async fn test_circuit_open_fails_fast_without_invoking() {
        let executor = executor(DependencyStatus::Unavailable);
        let calls = AtomicU32::new(0);

        let result: Result<()> = executor
            .execute(
                "renderer",
                &fast_policy(3),
                Duration::from_secs(1),
                &CancellationFlag::new(),
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok(()) }
                },
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(
            result,
            Err(PipelineError::DependencyUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_at_backoff_checkpoint() {
        let executor = executor(DependencyStatus::Healthy);
        let cancel = CancellationFlag::new();
        let calls = AtomicU32::new(0);

        let mut policy = fast_policy(5);
        policy.base_delay = Duration::from_millis(200);

        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel_clone.cancel();
        });

        let result: Result<()> = executor
            .execute(
                "renderer",
                &policy,
                Duration::from_secs(1),
                &cancel,
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(PipelineError::transient("renderer", "503")) }
                },
            )
            .await;

        // The first call ran; the backoff checkpoint observed the cancel
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(PipelineError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_deadline_is_a_transient_timeout() {
        let executor = executor(DependencyStatus::Healthy);
        let calls = AtomicU32::new(0);

        let result: Result<()> = executor
            .execute(
                "content_provider",
                &fast_policy(2),
                Duration::from_millis(10),
                &CancellationFlag::new(),
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok(())
                    }
                },
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(
            result,
            Err(PipelineError::RetryExhausted { attempts: 2, .. })
        ));
    }
}

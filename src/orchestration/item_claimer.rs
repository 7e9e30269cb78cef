//! # Item Claimer
//!
//! Per-item leases guaranteeing single-writer semantics: exactly one worker
//! advances a given content item at a time. Leases expire so a crashed
//! worker cannot permanently strand an item, and long-running stage
//! executions extend their claim as a heartbeat.

use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// A live claim on one content item
#[derive(Debug, Clone)]
pub struct Lease {
    pub item_id: Uuid,
    pub worker_id: String,
    pub claimed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Lease table keyed by item identifier
pub struct ItemClaimer {
    leases: DashMap<Uuid, Lease>,
    ttl: chrono::Duration,
}

impl ItemClaimer {
    pub fn new(ttl: Duration) -> Self {
        Self {
            leases: DashMap::new(),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(120)),
        }
    }

    /// Claim an item for a worker.
    ///
    /// Succeeds when the item is unclaimed, the existing lease has expired,
    /// or the same worker re-claims (refreshing the expiry). Fails with
    /// `ItemLeased` when another worker holds a live lease.
    pub fn claim(&self, item_id: Uuid, worker_id: &str) -> Result<Lease> {
        let now = Utc::now();

        match self.leases.entry(item_id) {
            Entry::Occupied(mut occupied) => {
                let lease = occupied.get_mut();
                if lease.worker_id != worker_id && !lease.is_expired(now) {
                    return Err(PipelineError::ItemLeased {
                        item_id,
                        holder: lease.worker_id.clone(),
                    });
                }
                if lease.is_expired(now) && lease.worker_id != worker_id {
                    warn!(
                        item_id = %item_id,
                        previous_holder = %lease.worker_id,
                        "expired lease taken over"
                    );
                }
                lease.worker_id = worker_id.to_string();
                lease.claimed_at = now;
                lease.expires_at = now + self.ttl;
                Ok(lease.clone())
            }
            Entry::Vacant(vacant) => {
                let lease = Lease {
                    item_id,
                    worker_id: worker_id.to_string(),
                    claimed_at: now,
                    expires_at: now + self.ttl,
                };
                vacant.insert(lease.clone());
                debug!(item_id = %item_id, worker_id = worker_id, "item claimed");
                Ok(lease)
            }
        }
    }

    /// Release a claim; returns false when the worker does not hold it
    pub fn release(&self, item_id: Uuid, worker_id: &str) -> bool {
        let removed = self
            .leases
            .remove_if(&item_id, |_, lease| lease.worker_id == worker_id)
            .is_some();
        if !removed {
            debug!(
                item_id = %item_id,
                worker_id = worker_id,
                "release skipped, lease not held by this worker"
            );
        }
        removed
    }

    /// Extend a held claim (heartbeat during long stage executions)
    pub fn extend(&self, item_id: Uuid, worker_id: &str) -> bool {
        match self.leases.get_mut(&item_id) {
            Some(mut lease) if lease.worker_id == worker_id => {
                lease.expires_at = Utc::now() + self.ttl;
                true
            }
            _ => false,
        }
    }

    /// Current live holder of an item's lease, if any
    pub fn holder(&self, item_id: Uuid) -> Option<String> {
        self.leases.get(&item_id).and_then(|lease| {
            if lease.is_expired(Utc::now()) {
                None
            } else {
                Some(lease.worker_id.clone())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_is_exclusive() {
        let claimer = ItemClaimer::new(Duration::from_secs(60));
        let item_id = Uuid::new_v4();

        claimer.claim(item_id, "worker-1").unwrap();
        let err = claimer.claim(item_id, "worker-2").unwrap_err();
        assert!(matches!(err, PipelineError::ItemLeased { .. }));
    }

    #[test]
    fn test_same_worker_reclaims() {
        let claimer = ItemClaimer::new(Duration::from_secs(60));
        let item_id = Uuid::new_v4();

        let first = claimer.claim(item_id, "worker-1").unwrap();
        let second = claimer.claim(item_id, "worker-1").unwrap();
        assert!(second.expires_at >= first.expires_at);
    }

    #[test]
    fn test_release_then_reclaim() {
        let claimer = ItemClaimer::new(Duration::from_secs(60));
        let item_id = Uuid::new_v4();

        claimer.claim(item_id, "worker-1").unwrap();
        assert!(claimer.release(item_id, "worker-1"));
        claimer.claim(item_id, "worker-2").unwrap();
    }

    #[test]
    fn test_release_requires_holder() {
        let claimer = ItemClaimer::new(Duration::from_secs(60));
        let item_id = Uuid::new_v4();

        claimer.claim(item_id, "worker-1").unwrap();
        assert!(!claimer.release(item_id, "worker-2"));
        assert_eq!(claimer.holder(item_id), Some("worker-1".to_string()));
    }

    #[test]
    fn test_expired_lease_can_be_taken_over() {
        let claimer = ItemClaimer::new(Duration::ZERO);
        let item_id = Uuid::new_v4();

        claimer.claim(item_id, "worker-1").unwrap();
        // TTL of zero expires immediately; a crashed worker's item is free
        let lease = claimer.claim(item_id, "worker-2").unwrap();
        assert_eq!(lease.worker_id, "worker-2");
    }

    #[test]
    fn test_extend_heartbeat() {
        let claimer = ItemClaimer::new(Duration::from_secs(60));
        let item_id = Uuid::new_v4();

        claimer.claim(item_id, "worker-1").unwrap();
        assert!(claimer.extend(item_id, "worker-1"));
        assert!(!claimer.extend(item_id, "worker-2"));
        assert!(!claimer.extend(Uuid::new_v4(), "worker-1"));
    }
}

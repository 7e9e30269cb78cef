//! # Stage Cache
//!
//! TTL key/value store memoizing expensive, idempotent stage computations.
//! Keys pair a content fingerprint with the stage that produced the value,
//! so pipeline retries and crash-replays read back prior results instead of
//! re-invoking external services. Not correctness-critical: losing entries
//! only costs redundant external calls.

use crate::state_machine::states::Stage;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Cache key: fingerprint plus the stage whose output is stored
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub fingerprint: String,
    pub stage: Stage,
}

impl CacheKey {
    pub fn new(fingerprint: impl Into<String>, stage: Stage) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            stage,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

/// Hit/miss/set counters for dashboards
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
}

/// Concurrent TTL cache for stage outputs
pub struct StageCache {
    entries: DashMap<CacheKey, CacheEntry>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    evictions: AtomicU64,
}

impl StageCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up a cached stage output. Expired entries are evicted lazily.
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(fingerprint = %key.fingerprint, stage = %key.stage, "cache hit");
                Some(entry.value.clone())
            }
            Some(_) => {
                drop(self.entries.remove(key));
                self.evictions.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a stage output with an explicit TTL, or the default
    pub fn put(&self, key: CacheKey, value: Value, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        self.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    /// Remove a single entry
    pub fn invalidate(&self, key: &CacheKey) {
        if self.entries.remove(key).is_some() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove every entry for a fingerprint; used when generation inputs
    /// change (e.g. an operator edits the blueprint)
    pub fn invalidate_fingerprint(&self, fingerprint: &str) {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.fingerprint != fingerprint);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(fingerprint = %fingerprint, removed, "fingerprint invalidated");
        }
    }

    /// Counter snapshot
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Number of live (possibly expired, not yet swept) entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop expired entries now
    pub fn sweep(&self) {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed, "cache sweep evicted expired entries");
        }
    }

    /// Spawn the background sweep loop; ends when the cache is dropped
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match cache.upgrade() {
                    Some(cache) => cache.sweep(),
                    None => break,
                }
            }
        })
    }
}

//! # Item Repository
//!
//! Persistence seam for content items. The core requires only optimistic
//! load/save and a readiness listing; any durable store satisfying the
//! contract can back it. The bundled in-memory implementation covers
//! embedding and tests.

use super::content_item::ContentItem;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

/// Filter for selecting items a worker may pick up
#[derive(Debug, Clone)]
pub struct ReadyFilter {
    /// Items whose `next_attempt_at` is at or before this instant
    pub now: DateTime<Utc>,
    /// Maximum number of items to return
    pub limit: usize,
}

impl ReadyFilter {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now, limit: 32 }
    }
}

/// Durable store for content items with optimistic concurrency
#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Insert a newly discovered item
    async fn insert(&self, item: ContentItem) -> Result<()>;

    /// Load an item by id
    async fn load(&self, item_id: Uuid) -> Result<ContentItem>;

    /// Persist an updated item.
    ///
    /// Fails with `ConcurrencyConflict` when the stored version does not
    /// match `expected_version`; the caller reloads and recomputes.
    async fn save(&self, item: ContentItem, expected_version: u64) -> Result<()>;

    /// Update scheduling hints (park time, attempt counter) without a
    /// version bump; versions track state transitions only.
    async fn park(
        &self,
        item_id: Uuid,
        next_attempt_at: DateTime<Utc>,
        attempt: u32,
    ) -> Result<()>;

    /// Items ready for pickup, ordered by `next_attempt_at`
    async fn list_ready(&self, filter: ReadyFilter) -> Result<Vec<ContentItem>>;
}

/// In-memory repository backed by a concurrent map
#[derive(Debug, Default)]
pub struct InMemoryItemRepository {
    items: DashMap<Uuid, ContentItem>,
}

impl InMemoryItemRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl ItemRepository for InMemoryItemRepository {
    async fn insert(&self, item: ContentItem) -> Result<()> {
        self.items.insert(item.item_id, item);
        Ok(())
    }

    async fn load(&self, item_id: Uuid) -> Result<ContentItem> {
        self.items
            .get(&item_id)
            .map(|entry| entry.clone())
            .ok_or(PipelineError::ItemNotFound { item_id })
    }

    async fn save(&self, item: ContentItem, expected_version: u64) -> Result<()> {
        let mut entry = self
            .items
            .get_mut(&item.item_id)
            .ok_or(PipelineError::ItemNotFound {
                item_id: item.item_id,
            })?;

        if entry.version != expected_version {
            return Err(PipelineError::ConcurrencyConflict {
                item_id: item.item_id,
                expected: expected_version,
                actual: entry.version,
            });
        }

        *entry = item;
        Ok(())
    }

    async fn park(
        &self,
        item_id: Uuid,
        next_attempt_at: DateTime<Utc>,
        attempt: u32,
    ) -> Result<()> {
        let mut entry = self
            .items
            .get_mut(&item_id)
            .ok_or(PipelineError::ItemNotFound { item_id })?;

        entry.next_attempt_at = next_attempt_at;
        entry.attempt = attempt;
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn list_ready(&self, filter: ReadyFilter) -> Result<Vec<ContentItem>> {
        let mut ready: Vec<ContentItem> = self
            .items
            .iter()
            .filter(|entry| entry.is_ready(filter.now))
            .map(|entry| entry.clone())
            .collect();

        ready.sort_by_key(|item| item.next_attempt_at);
        ready.truncate(filter.limit);
        Ok(ready)
    }
}

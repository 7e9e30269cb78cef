//! # Event Bus
//!
//! Topic-based publish/subscribe channel decoupling pipeline stages from
//! their observers. Publishing is fire-and-forget; each subscriber receives
//! events through its own bounded channel. All events for one item are
//! published by the single worker holding the item's lease, so per-item
//! delivery order matches transition order.

use crate::constants::topics;
use crate::state_machine::states::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// An event published on the bus; immutable once published
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Topic the event was published under
    pub topic: String,
    /// Bus-assigned monotonic sequence number
    pub sequence: u64,
    /// Item the event concerns, if any
    pub item_id: Option<Uuid>,
    /// Stage before the transition (`None` for initial enqueue)
    pub from_stage: Option<Stage>,
    /// Stage after the transition
    pub to_stage: Option<Stage>,
    /// Component that published the event
    pub source: String,
    /// Additional structured payload
    pub payload: Value,
    pub published_at: DateTime<Utc>,
}

impl PipelineEvent {
    /// Event for a content item stage transition
    pub fn transition(
        topic: &str,
        item_id: Uuid,
        from_stage: Option<Stage>,
        to_stage: Stage,
        payload: Value,
    ) -> Self {
        Self {
            topic: topic.to_string(),
            sequence: 0,
            item_id: Some(item_id),
            from_stage,
            to_stage: Some(to_stage),
            source: "state_machine".to_string(),
            payload,
            published_at: Utc::now(),
        }
    }

    /// Event for a dependency health change
    pub fn dependency(topic: &str, dependency: &str, status: &str) -> Self {
        Self {
            topic: topic.to_string(),
            sequence: 0,
            item_id: None,
            from_stage: None,
            to_stage: None,
            source: "health_monitor".to_string(),
            payload: serde_json::json!({ "dependency": dependency, "status": status }),
            published_at: Utc::now(),
        }
    }
}

/// Topic-based event bus with bounded per-subscriber channels
pub struct EventBus {
    subscribers: RwLock<HashMap<String, Vec<mpsc::Sender<PipelineEvent>>>>,
    capacity: usize,
    sequence: AtomicU64,
}

impl EventBus {
    /// Create a new bus with the given per-subscriber channel capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            capacity,
            sequence: AtomicU64::new(0),
        }
    }

    /// Subscribe to a topic, or to every event via [`topics::ALL`].
    ///
    /// Delivery to the returned channel preserves publish order. A dropped
    /// receiver is pruned on the next publish to its topic.
    pub async fn subscribe(&self, topic: &str) -> mpsc::Receiver<PipelineEvent> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut subscribers = self.subscribers.write().await;
        subscribers.entry(topic.to_string()).or_default().push(tx);
        debug!(topic = topic, "subscriber registered");
        rx
    }

    /// Publish an event to its topic and to wildcard subscribers.
    ///
    /// Fire-and-forget: a full subscriber channel sheds the event for that
    /// subscriber (logged) rather than blocking the publisher; no
    /// subscribers at all is acceptable.
    pub async fn publish(&self, mut event: PipelineEvent) {
        event.sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;

        let mut subscribers = self.subscribers.write().await;
        for key in [event.topic.as_str(), topics::ALL] {
            let Some(senders) = subscribers.get_mut(key) else {
                continue;
            };
            senders.retain(|tx| !tx.is_closed());
            for tx in senders.iter() {
                if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(event.clone()) {
                    warn!(
                        topic = %event.topic,
                        sequence = event.sequence,
                        "subscriber channel full, shedding event"
                    );
                }
            }
        }

        debug!(
            topic = %event.topic,
            sequence = event.sequence,
            item_id = ?event.item_id,
            "event published"
        );
    }

    /// Number of live subscribers for a topic
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        let subscribers = self.subscribers.read().await;
        subscribers
            .get(topic)
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::constants::defaults::EVENT_CHANNEL_CAPACITY)
    }
}

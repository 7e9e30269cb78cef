//! # Notification Fan-out
//!
//! Relays pipeline and health events to connected observers (dashboards).
//! A pure consumer: it subscribes to the bus and forwards matching events
//! into a bounded broadcast ring. Slow or disconnected observers miss
//! events (oldest dropped first) rather than blocking publishers.

use super::bus::{EventBus, PipelineEvent};
use crate::constants::{defaults, topics};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Fan-out relay with a bounded drop-oldest ring per observer group
pub struct NotificationFanout {
    sender: broadcast::Sender<PipelineEvent>,
    interests: Vec<String>,
}

impl NotificationFanout {
    /// Create a fan-out interested in the default dashboard topics
    pub fn new() -> Self {
        Self::with_capacity(defaults::OBSERVER_QUEUE_CAPACITY)
    }

    /// Create a fan-out with an explicit ring capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            interests: vec![
                topics::ITEM_TRANSITIONED.to_string(),
                topics::DEPENDENCY_STATUS_CHANGED.to_string(),
                topics::DEPENDENCY_DOWN.to_string(),
                topics::DEPENDENCY_RECOVERED.to_string(),
            ],
        }
    }

    /// Restrict the relayed topics
    pub fn with_topics(mut self, interests: Vec<String>) -> Self {
        self.interests = interests;
        self
    }

    /// Attach an observer. The receiver sees events from attachment onward;
    /// if it falls behind the ring capacity the oldest events are dropped
    /// and the lag is reported through `RecvError::Lagged`.
    pub fn attach(&self) -> broadcast::Receiver<PipelineEvent> {
        debug!(
            observers = self.sender.receiver_count() + 1,
            "observer attached"
        );
        self.sender.subscribe()
    }

    /// Number of currently attached observers
    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Start relaying from the bus. The task ends when the bus is dropped.
    pub async fn run(self: Arc<Self>, bus: Arc<EventBus>) -> JoinHandle<()> {
        let mut rx = bus.subscribe(topics::ALL).await;
        info!(topics = ?self.interests, "📡 notification fan-out started");

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if !self.interests.iter().any(|t| t == &event.topic) {
                    continue;
                }
                // No receivers is fine; observers come and go
                let _ = self.sender.send(event);
            }
            debug!("notification fan-out stopped");
        })
    }
}

impl Default for NotificationFanout {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::states::Stage;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_relays_interesting_topics_only() {
        let bus = Arc::new(EventBus::new(16));
        let fanout = Arc::new(NotificationFanout::with_capacity(16));
        let mut observer = fanout.attach();
        let handle = fanout.clone().run(bus.clone()).await;

        bus.publish(PipelineEvent::transition(
            topics::ITEM_TRANSITIONED,
            Uuid::new_v4(),
            None,
            Stage::Discovered,
            serde_json::Value::Null,
        ))
        .await;
        bus.publish(PipelineEvent {
            topic: "internal.debug".to_string(),
            sequence: 0,
            item_id: None,
            from_stage: None,
            to_stage: None,
            source: "test".to_string(),
            payload: serde_json::Value::Null,
            published_at: chrono::Utc::now(),
        })
        .await;

        let relayed = observer.recv().await.unwrap();
        assert_eq!(relayed.topic, topics::ITEM_TRANSITIONED);
        assert!(observer.try_recv().is_err());

        drop(bus);
        handle.abort();
    }

    #[tokio::test]
    async fn test_overflow_drops_oldest() {
        let bus = Arc::new(EventBus::new(16));
        let fanout = Arc::new(NotificationFanout::with_capacity(2));
        let mut observer = fanout.attach();
        let handle = fanout.clone().run(bus.clone()).await;

        for i in 0..5u8 {
            bus.publish(PipelineEvent::transition(
                topics::ITEM_TRANSITIONED,
                Uuid::new_v4(),
                None,
                Stage::Discovered,
                serde_json::json!({ "n": i }),
            ))
            .await;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        // First recv reports the lag; subsequent recvs see the newest events
        let mut seen = Vec::new();
        loop {
            match observer.try_recv() {
                Ok(event) => seen.push(event.payload["n"].as_u64().unwrap()),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        assert!(!seen.is_empty());
        assert!(seen.contains(&4));
        assert!(!seen.contains(&0));

        handle.abort();
    }
}

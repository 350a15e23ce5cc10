//! In-process event bus
//!
//! Subscribers are registered through the builder at startup; the set is
//! frozen once the bus starts. Delivery runs on a single dispatcher task
//! consuming a FIFO queue, so events are handed to subscribers in commit
//! order, and subscribers for one event run sequentially. A subscriber
//! failure is logged and does not block its peers. There is no durability:
//! a crash mid-delivery drops in-flight events.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opsdesk_common::types::{EventType, UserId};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};
use uuid::Uuid;

/// Who caused an event, when known
#[derive(Debug, Clone, Serialize)]
pub struct Actor {
    pub user_id: Option<UserId>,
    pub api_key_id: Option<Uuid>,
}

/// An event crossing the bus
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: EventType,
    pub entity_type: String,
    pub entity_id: String,
    pub payload: serde_json::Value,
    pub actor: Option<Actor>,
    pub occurred_at: DateTime<Utc>,
}

impl Event {
    /// Build an event occurring now
    pub fn new(
        event_type: EventType,
        entity_type: &str,
        entity_id: String,
        payload: serde_json::Value,
        actor: Option<Actor>,
    ) -> Self {
        Self {
            event_type,
            entity_type: entity_type.to_string(),
            entity_id,
            payload,
            actor,
            occurred_at: Utc::now(),
        }
    }
}

/// A registered consumer of bus events
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Name used in delivery logs
    fn name(&self) -> &'static str;

    /// Handle one event. Errors are logged by the dispatcher.
    async fn handle(&self, event: &Event) -> anyhow::Result<()>;
}

/// Collects subscribers before the bus starts
#[derive(Default)]
pub struct EventBusBuilder {
    subscribers: Vec<Arc<dyn EventSubscriber>>,
}

impl EventBusBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber
    pub fn subscribe(mut self, subscriber: Arc<dyn EventSubscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Freeze the registry and spawn the dispatcher task
    pub fn start(self) -> (EventBus, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let subscribers: Arc<[Arc<dyn EventSubscriber>]> = self.subscribers.into();

        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                for subscriber in subscribers.iter() {
                    if let Err(e) = subscriber.handle(&event).await {
                        error!(
                            subscriber = subscriber.name(),
                            event = %event.event_type,
                            entity_id = %event.entity_id,
                            "Event subscriber failed: {}",
                            e
                        );
                    }
                }
            }
            debug!("Event bus dispatcher stopped");
        });

        (EventBus { tx }, handle)
    }
}

/// Publishing handle, cheap to clone
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventBus {
    /// Enqueue an event for delivery. Called after the triggering
    /// transaction commits; never blocks the caller.
    pub fn publish(&self, event: Event) {
        debug!(event = %event.event_type, entity_id = %event.entity_id, "Publishing event");
        if self.tx.send(event).is_err() {
            error!("Event bus dispatcher is gone; event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EventSubscriber for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn handle(&self, event: &Event) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push(event.entity_id.clone());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl EventSubscriber for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn handle(&self, _event: &Event) -> anyhow::Result<()> {
            anyhow::bail!("boom")
        }
    }

    fn event(id: &str) -> Event {
        Event::new(
            EventType::TicketCreated,
            "ticket",
            id.to_string(),
            serde_json::json!({}),
            None,
        )
    }

    #[tokio::test]
    async fn test_delivery_preserves_order() {
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let (bus, handle) = EventBusBuilder::new().subscribe(recorder.clone()).start();

        bus.publish(event("a"));
        bus.publish(event("b"));
        bus.publish(event("c"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*recorder.seen.lock().unwrap(), vec!["a", "b", "c"]);
        handle.abort();
    }

    #[tokio::test]
    async fn test_failing_subscriber_does_not_block_peers() {
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let (bus, handle) = EventBusBuilder::new()
            .subscribe(Arc::new(Failing))
            .subscribe(recorder.clone())
            .start();

        bus.publish(event("x"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*recorder.seen.lock().unwrap(), vec!["x"]);
        handle.abort();
    }
}

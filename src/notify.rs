use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub topic: String,
    pub payload: Value,
}

/// In-process pub/sub. Delivery is at-most-once; events published while
/// nobody is subscribed are dropped.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Event>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        Self { tx: broadcast::channel(capacity).0 }
    }

    pub fn publish(&self, topic: impl Into<String>, payload: Value) {
        let topic = topic.into();
        match self.tx.send(Event { topic: topic.clone(), payload }) {
            Ok(receivers) => debug!(topic = %topic, receivers, "event published"),
            Err(_) => debug!(topic = %topic, "event dropped, no subscribers"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

pub fn elderly_topic(user_id: &str) -> String {
    format!("elderly-{user_id}")
}

pub fn caregiver_topic(user_id: &str) -> String {
    format!("caregiver-{user_id}")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let notifier = Notifier::new(8);
        let mut rx = notifier.subscribe();
        notifier.publish(elderly_topic("u1"), json!({"type": "PING"}));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.topic, "elderly-u1");
        assert_eq!(event.payload["type"], "PING");
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        Notifier::new(1).publish("caregiver-x", json!({}));
    }
}

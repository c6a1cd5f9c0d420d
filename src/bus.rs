//! Publish side of the process-wide event bus.
//!
//! The client never subscribes to anything. It publishes each decoded inbound
//! envelope on [`SOCKET_RECV_TOPIC`] and each payload on a topic equal to its
//! message name. The concrete bus lives outside the client; [`BroadcastBus`]
//! is the bundled implementation.

use serde_json::Value;
use tokio::sync::broadcast;

/// Topic carrying every decoded inbound envelope.
pub const SOCKET_RECV_TOPIC: &str = "socket:recv";

/// Default capacity of a [`BroadcastBus`] channel.
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// Publish capability injected into the client.
pub trait EventBus: Send + Sync {
    fn publish(&self, topic: &str, payload: &Value);
}

/// One published message.
#[derive(Debug, Clone, PartialEq)]
pub struct BusEvent {
    pub topic: String,
    pub payload: Value,
}

/// Fan-out bus on a tokio broadcast channel.
///
/// Publishing with no live subscribers drops the event. Slow subscribers see
/// `RecvError::Lagged` rather than blocking the publisher.
#[derive(Debug, Clone)]
pub struct BroadcastBus {
    tx: broadcast::Sender<BusEvent>,
}

impl BroadcastBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl EventBus for BroadcastBus {
    fn publish(&self, topic: &str, payload: &Value) {
        let _ = self.tx.send(BusEvent { topic: topic.to_owned(), payload: payload.clone() });
    }
}

#[cfg(test)]
#[path = "bus_test.rs"]
mod tests;

//! Shared fixtures for unit tests: a recording bus and a client wired to a
//! host transport the test drives by hand.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::time::timeout;

use crate::bus::EventBus;
use crate::client::SocketClient;
use crate::config::{EncodingMode, SocketConfig, TransportKind};
use crate::registry::TypeRegistry;
use crate::transport::{HostConnection, HostListener, HostTransport, WireMessage};

#[derive(Default)]
pub(crate) struct RecordingBus {
    events: Mutex<Vec<(String, Value)>>,
}

impl RecordingBus {
    pub(crate) fn events(&self) -> Vec<(String, Value)> {
        self.events.lock().expect("bus mutex should lock").clone()
    }

    pub(crate) fn on(&self, topic: &str) -> Vec<Value> {
        self.events()
            .into_iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| payload)
            .collect()
    }
}

impl EventBus for RecordingBus {
    fn publish(&self, topic: &str, payload: &Value) {
        self.events
            .lock()
            .expect("bus mutex should lock")
            .push((topic.to_owned(), payload.clone()));
    }
}

pub(crate) struct Harness {
    pub client: SocketClient,
    pub listener: HostListener,
    pub bus: Arc<RecordingBus>,
}

/// Config on the host transport with a fast poll so tests do not idle.
pub(crate) fn fast_config(encoding: EncodingMode) -> SocketConfig {
    SocketConfig::new("host://test", encoding)
        .with_transport(TransportKind::Host)
        .with_poll_interval(Duration::from_millis(5))
}

pub(crate) fn harness(config: SocketConfig, registry: Option<TypeRegistry>) -> Harness {
    let (transport, listener) = HostTransport::new();
    let bus = Arc::new(RecordingBus::default());
    let mut builder = SocketClient::builder(config).transport(transport).event_bus(bus.clone());
    if let Some(registry) = registry {
        builder = builder.registry(registry);
    }
    Harness { client: builder.build().expect("client should build"), listener, bus }
}

/// Wait for the client's next connection attempt and report it open.
pub(crate) async fn accept_open(listener: &mut HostListener) -> HostConnection {
    let conn = timeout(Duration::from_secs(2), listener.accept())
        .await
        .expect("connection attempt timed out")
        .expect("listener closed");
    conn.peer().open();
    conn
}

pub(crate) async fn next_outbound(conn: &mut HostConnection) -> WireMessage {
    timeout(Duration::from_secs(2), conn.recv())
        .await
        .expect("outbound frame timed out")
        .expect("connection released")
}

pub(crate) fn text_of(message: WireMessage) -> frames::TextFrame {
    match message {
        WireMessage::Text(text) => frames::decode_text_frame(&text).expect("valid text frame"),
        WireMessage::Binary(_) => panic!("expected a text frame"),
    }
}

pub(crate) fn text_reply(name: &str, session: u32, data: Value) -> WireMessage {
    let frame = frames::TextFrame { name: name.to_owned(), session, data };
    WireMessage::Text(frames::encode_text_frame(&frame).expect("encode text frame"))
}

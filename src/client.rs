//! Socket session client: multiplexed calls over one socket.
//!
//! ARCHITECTURE
//! ============
//! The client owns at most one transport handle. Outbound messages get a
//! fresh session id, are encoded per the configured [`EncodingMode`], and
//! are written to the handle. Correlated calls also park a one-shot sender
//! in the pending table under that session id.
//!
//! Inbound frames arrive through the transport's event callback:
//! decode → publish envelope on [`SOCKET_RECV_TOPIC`] → publish data on the
//! dispatch sink under the message name → complete the pending call, if any.
//! Publishing happens whether or not a call was waiting.
//!
//! LIFECYCLE
//! =========
//! `Closed --open()--> Connecting --adapter Open--> Open --close() / remote
//! close / error--> Closed`. Only `Open` transmits. The handle is created
//! lazily by the first `call`/`send` and discarded on close, so the next
//! call reopens. The session counter survives reopen; the pending table does
//! not. Outstanding calls fail with [`ClientError::ConnectionClosed`].
//!
//! LOCKING
//! =======
//! One `std::sync::Mutex` guards the handle, session counter and pending
//! table. It is never held across an `.await` or while publishing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use frames::{FramingError, TextFrame};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::bus::{BroadcastBus, EventBus, SOCKET_RECV_TOPIC};
use crate::config::{EncodingMode, SocketConfig, TransportKind};
use crate::error::{ClientError, ConfigError, ProtocolError};
use crate::registry::{EncodeFailure, TypeRegistry};
use crate::transport::{
    ConnectionState, EventSink, TransportAdapter, TransportEvent, TransportHandle, WebSocketTransport, WireMessage,
};

/// Logical message, independent of the wire encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub name: String,
    pub session: u32,
    pub data: Value,
}

impl Envelope {
    fn to_value(&self) -> Value {
        serde_json::json!({ "name": self.name, "session": self.session, "data": self.data })
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Assembles a [`SocketClient`] from config plus its injected collaborators.
pub struct SocketClientBuilder {
    config: SocketConfig,
    registry: Option<Arc<TypeRegistry>>,
    adapter: Option<Arc<dyn TransportAdapter>>,
    bus: Option<Arc<dyn EventBus>>,
    dispatch: Option<Arc<dyn EventBus>>,
}

impl SocketClientBuilder {
    /// Type registry for the binary encoding. Ignored in text mode.
    #[must_use]
    pub fn registry(mut self, registry: impl Into<Arc<TypeRegistry>>) -> Self {
        self.registry = Some(registry.into());
        self
    }

    /// Use this adapter instead of the one `config.transport` selects.
    #[must_use]
    pub fn transport(mut self, adapter: impl TransportAdapter + 'static) -> Self {
        self.adapter = Some(Arc::new(adapter));
        self
    }

    /// Bus receiving every inbound envelope. Also the dispatch sink unless
    /// [`SocketClientBuilder::dispatch_sink`] is set.
    #[must_use]
    pub fn event_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Sink receiving each inbound payload under its message name.
    #[must_use]
    pub fn dispatch_sink(mut self, sink: Arc<dyn EventBus>) -> Self {
        self.dispatch = Some(sink);
        self
    }

    /// # Errors
    ///
    /// Fails when binary encoding has no registry, or the host transport was
    /// selected without supplying a `HostTransport`.
    pub fn build(self) -> Result<SocketClient, ConfigError> {
        if self.config.encoding == EncodingMode::Binary && self.registry.is_none() {
            return Err(ConfigError::Invalid("binary encoding requires a type registry".into()));
        }

        let adapter: Arc<dyn TransportAdapter> = match (self.adapter, self.config.transport) {
            (Some(adapter), _) => adapter,
            (None, TransportKind::WebSocket) => Arc::new(WebSocketTransport),
            (None, TransportKind::Host) => {
                return Err(ConfigError::Invalid("host transport requires a HostTransport adapter".into()));
            }
        };
        let bus = self.bus.unwrap_or_else(|| Arc::new(BroadcastBus::default()));
        let dispatch = self.dispatch.unwrap_or_else(|| Arc::clone(&bus));

        Ok(SocketClient {
            shared: Arc::new(Shared {
                config: self.config,
                registry: self.registry,
                adapter,
                bus,
                dispatch,
                inner: Mutex::new(Inner::default()),
            }),
        })
    }
}

// =============================================================================
// CLIENT
// =============================================================================

/// Multiplexed request/response client over one socket. Clones share the
/// same connection.
#[derive(Clone)]
pub struct SocketClient {
    shared: Arc<Shared>,
}

struct Shared {
    config: SocketConfig,
    registry: Option<Arc<TypeRegistry>>,
    adapter: Arc<dyn TransportAdapter>,
    bus: Arc<dyn EventBus>,
    dispatch: Arc<dyn EventBus>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    handle: Option<Box<dyn TransportHandle>>,
    /// Bumped on every open so events from a discarded handle are ignored.
    generation: u64,
    session: u32,
    pending: HashMap<u32, oneshot::Sender<Value>>,
}

impl Inner {
    /// Next session id. Wraps at `u32::MAX`, skipping 0 and ids still
    /// awaiting a response.
    fn next_session(&mut self) -> u32 {
        loop {
            self.session = self.session.wrapping_add(1);
            if self.session != 0 && !self.pending.contains_key(&self.session) {
                return self.session;
            }
        }
    }

    fn state(&self) -> ConnectionState {
        self.handle.as_ref().map_or(ConnectionState::Closed, |h| h.state())
    }

    /// Detach the handle and fail every outstanding call.
    fn release(&mut self) -> Option<Box<dyn TransportHandle>> {
        let dropped = self.pending.len();
        self.pending.clear();
        if dropped > 0 {
            debug!(dropped, "socket: failed outstanding calls");
        }
        self.handle.take()
    }
}

impl SocketClient {
    #[must_use]
    pub fn builder(config: SocketConfig) -> SocketClientBuilder {
        SocketClientBuilder { config, registry: None, adapter: None, bus: None, dispatch: None }
    }

    #[must_use]
    pub fn config(&self) -> &SocketConfig {
        &self.shared.config
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state()
    }

    /// Last session id issued, 0 before the first call.
    #[must_use]
    pub fn current_session(&self) -> u32 {
        self.shared.lock().session
    }

    /// Session ids still awaiting a response, sorted.
    #[must_use]
    pub fn pending_sessions(&self) -> Vec<u32> {
        let inner = self.shared.lock();
        let mut ids: Vec<u32> = inner.pending.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Start connecting if no transport exists. Failures are logged and leave
    /// the client closed.
    pub fn open(&self) {
        let mut inner = self.shared.lock();
        if inner.handle.is_some() {
            return;
        }

        inner.generation += 1;
        let generation = inner.generation;
        let url = &self.shared.config.url;
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let events: EventSink = Arc::new(move |event| {
            if let Some(shared) = weak.upgrade() {
                shared.on_event(generation, event);
            }
        });

        match self.shared.adapter.open(url, events) {
            Ok(handle) => {
                info!(%url, generation, "socket: opening");
                inner.handle = Some(handle);
            }
            Err(e) => warn!(%url, error = %e, "socket: open failed"),
        }
    }

    /// Release the transport and fail outstanding calls with
    /// [`ClientError::ConnectionClosed`].
    pub fn close(&self) {
        let handle = self.shared.lock().release();
        if let Some(handle) = handle {
            handle.close();
            info!(url = %self.shared.config.url, "socket: closed");
        }
    }

    /// Correlated call.
    ///
    /// Returns `default_response` without error when the socket cannot reach
    /// `Open` within the connect timeout. Otherwise waits for the response
    /// carrying this call's session id, bounded only by the configured
    /// response timeout.
    ///
    /// # Errors
    ///
    /// Encoding failures (including unregistered binary message names),
    /// transport write failures, connection close while waiting, and response
    /// timeouts.
    pub async fn call(&self, name: &str, data: Value, default_response: Value) -> Result<Value, ClientError> {
        Ok(self.call_inner(name, data).await?.unwrap_or(default_response))
    }

    /// Typed [`SocketClient::call`]. `Ok(None)` when the socket was
    /// unavailable.
    ///
    /// # Errors
    ///
    /// As [`SocketClient::call`], plus payloads that do not (de)serialize as
    /// `T`/`R`.
    pub async fn request<T, R>(&self, name: &str, data: &T) -> Result<Option<R>, ClientError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let data = serde_json::to_value(data)?;
        match self.call_inner(name, data).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Fire-and-forget. Dropped silently unless the socket is already open;
    /// never waits for a connecting socket. Still consumes a session id.
    pub fn send(&self, name: &str, data: Value) {
        self.open();
        self.send_if_open(name, data);
    }

    /// `send` without the lazy open. The state check and the write happen
    /// under one lock, so a concurrent `close()` can never be undone here.
    /// Returns whether the frame was handed to the transport.
    pub(crate) fn send_if_open(&self, name: &str, data: Value) -> bool {
        let mut inner = self.shared.lock();
        match inner.state() {
            ConnectionState::Open => {}
            ConnectionState::Connecting => {
                debug!(%name, "socket: connecting; send dropped");
                return false;
            }
            ConnectionState::Closed => {
                debug!(%name, "socket: closed; send dropped");
                return false;
            }
        }

        let session = inner.next_session();
        let message = match self.shared.encode(name, session, data) {
            Ok(message) => message,
            Err(e) => {
                warn!(%name, session, error = %e, "socket: send aborted");
                return false;
            }
        };
        let Some(handle) = inner.handle.as_ref() else { return false };
        match handle.send(message) {
            Ok(()) => {
                debug!(%name, session, "socket: sent");
                true
            }
            Err(e) => {
                warn!(%name, session, error = %e, "socket: send failed");
                false
            }
        }
    }

    /// Open if needed and wait, bounded by the connect timeout, for the
    /// socket to leave `Connecting`.
    pub async fn connect(&self) -> ConnectionState {
        self.open();
        if self.state() != ConnectionState::Connecting {
            return self.state();
        }
        let state = self.wait_while_connecting().await;
        debug!(?state, "socket: wait finished");
        state
    }

    async fn call_inner(&self, name: &str, data: Value) -> Result<Option<Value>, ClientError> {
        self.connect().await;

        let (session, rx) = {
            let mut inner = self.shared.lock();
            if inner.state() != ConnectionState::Open {
                debug!(%name, "socket: unavailable; returning default response");
                return Ok(None);
            }

            let session = inner.next_session();
            let message = self.shared.encode(name, session, data)?;
            let (tx, rx) = oneshot::channel();
            inner.pending.insert(session, tx);

            let sent = match inner.handle.as_ref() {
                Some(handle) => handle.send(message).map_err(ClientError::from),
                None => Err(ClientError::ConnectionClosed),
            };
            if let Err(e) = sent {
                inner.pending.remove(&session);
                return Err(e);
            }
            debug!(%name, session, "socket: call sent");
            (session, rx)
        };

        let response = match self.shared.config.response_timeout {
            None => rx.await,
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(response) => response,
                Err(_) => {
                    self.shared.lock().pending.remove(&session);
                    warn!(%name, session, "socket: response timed out");
                    return Err(ClientError::ResponseTimeout { session });
                }
            },
        };
        response.map(Some).map_err(|_| ClientError::ConnectionClosed)
    }

    /// Poll until the socket leaves `Connecting` or the connect timeout
    /// elapses, yielding to other tasks between checks.
    async fn wait_while_connecting(&self) -> ConnectionState {
        let deadline = Instant::now() + self.shared.config.connect_timeout;
        loop {
            let state = self.state();
            if state != ConnectionState::Connecting || Instant::now() >= deadline {
                return state;
            }
            tokio::time::sleep(self.shared.config.poll_interval).await;
        }
    }
}

impl std::fmt::Debug for SocketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketClient")
            .field("url", &self.shared.config.url)
            .field("encoding", &self.shared.config.encoding)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// ENCODE / RECEIVE
// =============================================================================

/// Why an inbound frame was not delivered.
#[derive(Debug, thiserror::Error)]
enum InboundError {
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),
    #[error("{0} frame on a {1:?} connection")]
    WrongKind(&'static str, EncodingMode),
    #[error(transparent)]
    Payload(#[from] EncodeFailure),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl InboundError {
    /// Malformed wire data poisons the connection; an unknown or undecodable
    /// payload only loses that one message.
    fn is_fatal(&self) -> bool {
        matches!(self, Self::Framing(_) | Self::WrongKind(..))
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn encode(&self, name: &str, session: u32, data: Value) -> Result<WireMessage, ClientError> {
        match self.config.encoding {
            EncodingMode::Text => {
                let frame = TextFrame { name: name.to_owned(), session, data };
                Ok(WireMessage::Text(frames::encode_text_frame(&frame)?))
            }
            EncodingMode::Binary => {
                let registry = self.registry.as_ref().ok_or(ProtocolError::MissingRegistry)?;
                let data = if data.is_null() { Value::Object(Map::new()) } else { data };
                let (type_id, payload) = registry.encode(name, &data)?;
                Ok(WireMessage::Binary(frames::encode_binary_frame(session, type_id, &payload)?))
            }
        }
    }

    fn decode(&self, message: WireMessage) -> Result<Envelope, InboundError> {
        match (self.config.encoding, message) {
            (EncodingMode::Text, WireMessage::Text(text)) => {
                let frame = frames::decode_text_frame(&text)?;
                Ok(Envelope { name: frame.name, session: frame.session, data: frame.data })
            }
            (EncodingMode::Binary, WireMessage::Binary(bytes)) => {
                let frame = if self.config.strict_length {
                    frames::decode_binary_frame_strict(&bytes)?
                } else {
                    frames::decode_binary_frame(&bytes)?
                };
                let registry = self.registry.as_ref().ok_or(ProtocolError::MissingRegistry)?;
                let (name, data) = registry.decode(frame.type_id, &frame.payload)?;
                Ok(Envelope { name, session: frame.session, data })
            }
            (mode, other) => Err(InboundError::WrongKind(other.kind(), mode)),
        }
    }

    fn on_event(&self, generation: u64, event: TransportEvent) {
        match event {
            TransportEvent::Open => info!(url = %self.config.url, generation, "socket: open"),
            TransportEvent::Message(message) => self.on_message(generation, message),
            TransportEvent::Closed => {
                if self.discard(generation) {
                    info!(url = %self.config.url, generation, "socket: closed by transport");
                }
            }
            TransportEvent::Error(reason) => {
                warn!(url = %self.config.url, generation, error = %reason, "socket: transport error");
                self.discard(generation);
            }
        }
    }

    fn on_message(&self, generation: u64, message: WireMessage) {
        let envelope = match self.decode(message) {
            Ok(envelope) => envelope,
            Err(e) if e.is_fatal() => {
                warn!(generation, error = %e, "socket: undecodable frame; closing connection");
                if let Some(handle) = self.take_handle(generation) {
                    handle.close();
                }
                return;
            }
            Err(e) => {
                warn!(generation, error = %e, "socket: dropping inbound message");
                return;
            }
        };

        debug!(name = %envelope.name, session = envelope.session, "socket: recv");
        self.bus.publish(SOCKET_RECV_TOPIC, &envelope.to_value());
        self.dispatch.publish(&envelope.name, &envelope.data);

        let waiter = self.lock().pending.remove(&envelope.session);
        if let Some(tx) = waiter {
            let _ = tx.send(envelope.data);
        }
    }

    /// Drop the handle if it still belongs to `generation`. Returns whether
    /// anything was released.
    fn discard(&self, generation: u64) -> bool {
        self.take_handle(generation).is_some()
    }

    fn take_handle(&self, generation: u64) -> Option<Box<dyn TransportHandle>> {
        let mut inner = self.lock();
        if inner.generation != generation {
            return None;
        }
        inner.release()
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;

//! Host-bridged transport.
//!
//! For embeddings where the host runtime owns the socket (a mini-program
//! socket task, a browser bridge, a game engine's network layer). Each
//! `open` hands the host a [`HostConnection`]; the host drives it by calling
//! [`HostPeer::open`], [`HostPeer::deliver`], [`HostPeer::fail`] and
//! [`HostPeer::close`], and drains outbound frames with
//! [`HostConnection::recv`].

use tokio::sync::mpsc;
use tracing::debug;

use super::{
    ConnectionState, EventSink, SharedState, TransportAdapter, TransportEvent, TransportHandle, WireMessage,
};
use crate::error::TransportError;

/// Client-side adapter. Cheap to clone.
#[derive(Debug, Clone)]
pub struct HostTransport {
    connections: mpsc::UnboundedSender<HostConnection>,
}

/// Host side: yields one [`HostConnection`] per client `open`.
#[derive(Debug)]
pub struct HostListener {
    connections: mpsc::UnboundedReceiver<HostConnection>,
}

impl HostTransport {
    #[must_use]
    pub fn new() -> (Self, HostListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { connections: tx }, HostListener { connections: rx })
    }
}

impl TransportAdapter for HostTransport {
    fn open(&self, url: &str, events: EventSink) -> Result<Box<dyn TransportHandle>, TransportError> {
        let state = SharedState::connecting();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let connection = HostConnection {
            url: url.to_owned(),
            outbound: outbound_rx,
            peer: HostPeer { state: state.clone(), events },
        };
        self.connections
            .send(connection)
            .map_err(|_| TransportError::Open("host listener has shut down".into()))?;

        debug!(%url, "host: connection offered");
        Ok(Box::new(HostHandle { state, outbound: outbound_tx }))
    }
}

impl HostListener {
    /// Wait for the client to open a connection. `None` once every
    /// [`HostTransport`] clone is gone.
    pub async fn accept(&mut self) -> Option<HostConnection> {
        self.connections.recv().await
    }

    pub fn try_accept(&mut self) -> Option<HostConnection> {
        self.connections.try_recv().ok()
    }
}

/// Host view of one client connection.
#[derive(Debug)]
pub struct HostConnection {
    url: String,
    outbound: mpsc::UnboundedReceiver<WireMessage>,
    peer: HostPeer,
}

impl HostConnection {
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Handle for driving this connection's lifecycle from other tasks.
    #[must_use]
    pub fn peer(&self) -> HostPeer {
        self.peer.clone()
    }

    /// Next frame the client transmitted. `None` once the client has released
    /// the connection and the queue is drained.
    pub async fn recv(&mut self) -> Option<WireMessage> {
        self.outbound.recv().await
    }

    pub fn try_recv(&mut self) -> Option<WireMessage> {
        self.outbound.try_recv().ok()
    }
}

/// Lifecycle controls for one connection, usable from any thread.
#[derive(Clone)]
pub struct HostPeer {
    state: SharedState,
    events: EventSink,
}

impl std::fmt::Debug for HostPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostPeer").field("state", &self.state.get()).finish_non_exhaustive()
    }
}

impl HostPeer {
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Report the socket as connected.
    pub fn open(&self) {
        if self.state.mark_open() {
            (self.events)(TransportEvent::Open);
        }
    }

    /// Hand an inbound frame to the client. Ignored unless open.
    pub fn deliver(&self, message: WireMessage) {
        if self.state.get() == ConnectionState::Open {
            (self.events)(TransportEvent::Message(message));
        }
    }

    /// Report a socket failure. Terminal.
    pub fn fail(&self, reason: impl Into<String>) {
        if self.state.mark_closed() {
            (self.events)(TransportEvent::Error(reason.into()));
            (self.events)(TransportEvent::Closed);
        }
    }

    /// Report the socket as closed by the remote side. Terminal.
    pub fn close(&self) {
        if self.state.mark_closed() {
            (self.events)(TransportEvent::Closed);
        }
    }
}

struct HostHandle {
    state: SharedState,
    outbound: mpsc::UnboundedSender<WireMessage>,
}

impl TransportHandle for HostHandle {
    fn send(&self, message: WireMessage) -> Result<(), TransportError> {
        if self.state.get() != ConnectionState::Open {
            return Err(TransportError::NotOpen);
        }
        self.outbound.send(message).map_err(|_| TransportError::NotOpen)
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn close(&self) {
        self.state.mark_closed();
    }
}

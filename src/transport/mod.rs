//! Transport adapters: one duplex socket behind a small capability trait.
//!
//! DESIGN
//! ======
//! The client owns at most one [`TransportHandle`] at a time and never looks
//! at the socket underneath it. Adapters report progress through an
//! [`EventSink`] callback, which may run on any thread; the client's receive
//! path is driven entirely from there.
//!
//! Two adapters exist, chosen once when the client is built:
//! - [`WebSocketTransport`]: this process dials the socket itself.
//! - [`HostTransport`]: an embedding host owns the socket and exchanges
//!   frames with the client over channels.
//!
//! Adapters never retry. A failed or closed connection stays closed.

mod host;
mod websocket;

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

pub use host::{HostConnection, HostListener, HostPeer, HostTransport};
pub use websocket::WebSocketTransport;

use crate::error::TransportError;

/// Readiness of one socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
}

/// One frame as it crosses the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Text(String),
    Binary(Vec<u8>),
}

impl WireMessage {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Binary(_) => "binary",
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Socket lifecycle notifications.
///
/// `Error` is followed by `Closed`; both mean the handle is finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Message(WireMessage),
    Closed,
    Error(String),
}

/// Callback receiving the events of one connection.
pub type EventSink = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// Factory for connections.
pub trait TransportAdapter: Send + Sync {
    /// Start connecting to `url`. The returned handle begins in
    /// [`ConnectionState::Connecting`].
    ///
    /// Implementations must not invoke `events` before returning.
    ///
    /// # Errors
    ///
    /// Returns an error when no connection attempt could be started.
    fn open(&self, url: &str, events: EventSink) -> Result<Box<dyn TransportHandle>, TransportError>;
}

/// One live (or finished) connection.
pub trait TransportHandle: Send + Sync {
    /// Queue a frame for transmission.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotOpen`] unless the state is `Open`.
    fn send(&self, message: WireMessage) -> Result<(), TransportError>;

    fn state(&self) -> ConnectionState;

    /// Start closing. Idempotent; emits no events back to the caller.
    fn close(&self);
}

/// Connection state shared between a handle and its I/O side.
#[derive(Debug, Clone)]
pub(crate) struct SharedState(Arc<AtomicU8>);

impl SharedState {
    const CLOSED: u8 = 0;
    const CONNECTING: u8 = 1;
    const OPEN: u8 = 2;

    pub(crate) fn connecting() -> Self {
        Self(Arc::new(AtomicU8::new(Self::CONNECTING)))
    }

    pub(crate) fn get(&self) -> ConnectionState {
        match self.0.load(Ordering::Acquire) {
            Self::CONNECTING => ConnectionState::Connecting,
            Self::OPEN => ConnectionState::Open,
            _ => ConnectionState::Closed,
        }
    }

    /// Move Connecting → Open. Returns false if the connection already
    /// finished.
    pub(crate) fn mark_open(&self) -> bool {
        self.0
            .compare_exchange(Self::CONNECTING, Self::OPEN, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Move to Closed. Returns false if it was already closed.
    pub(crate) fn mark_closed(&self) -> bool {
        self.0.swap(Self::CLOSED, Ordering::AcqRel) != Self::CLOSED
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;

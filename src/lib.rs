//! Multiplexed request/response over a single duplex socket.
//!
//! SYSTEM CONTEXT
//! ==============
//! `client` is the session client callers talk to. It picks a `transport`
//! adapter once, encodes frames with the `frames` crate (text) or the
//! `registry` codecs (binary), and publishes everything it receives on an
//! injected `bus`. `heartbeat` is an optional keep-alive built on `send`.

pub mod bus;
pub mod client;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod registry;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use bus::{BroadcastBus, BusEvent, EventBus, SOCKET_RECV_TOPIC};
pub use client::{Envelope, SocketClient, SocketClientBuilder};
pub use config::{EncodingMode, HeartbeatConfig, SocketConfig, TransportKind, heartbeat_interval};
pub use error::{ClientError, CodecError, ConfigError, ProtocolError, RegistryError, TransportError};
pub use heartbeat::Heartbeat;
pub use registry::{MessageCodec, ProstCodec, StructCodec, TypeRegistry};
pub use transport::{ConnectionState, HostTransport, WebSocketTransport, WireMessage};

//! Error taxonomy for the socket session client.
//!
//! Connection-level failures never reach callers: they are logged and the
//! client degrades to "not open". What does reach a caller is limited to the
//! failures of that caller's own call.

use frames::FramingError;

/// Failure of a single `call` on the socket session client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The message could not be encoded because of a protocol problem.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// A frame could not be built or parsed.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),
    /// The registered codec rejected the payload.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The transport refused the outbound frame.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The connection closed before a response arrived.
    #[error("connection closed before a response arrived")]
    ConnectionClosed,
    /// No response arrived within the configured response timeout.
    #[error("timed out waiting for response to session {session}")]
    ResponseTimeout { session: u32 },
    /// A response payload did not match the requested type.
    #[error("response payload mismatch: {0}")]
    Response(#[from] serde_json::Error),
}

/// Outbound message could not be mapped onto the binary wire.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Binary encoding needs a numeric type id and none is registered.
    #[error("unregistered message type: {0}")]
    UnregisteredType(String),
    /// Binary encoding was selected but no type registry was supplied.
    #[error("binary encoding requires a type registry")]
    MissingRegistry,
    /// An inbound binary frame carried a type id with no registered codec.
    #[error("unknown message type id: {0}")]
    UnknownTypeId(u32),
}

/// A message codec failed to encode or decode a payload.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode {name}: {message}")]
    Encode { name: String, message: String },
    #[error("failed to decode {name}: {message}")]
    Decode { name: String, message: String },
}

/// Failure reported by a transport adapter.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The URL could not be used by this adapter.
    #[error("invalid socket url: {0}")]
    InvalidUrl(String),
    /// The adapter could not start a connection attempt.
    #[error("transport open failed: {0}")]
    Open(String),
    /// The socket is not open, or its writer has gone away.
    #[error("transport is not open")]
    NotOpen,
    /// The message kind does not match what this connection carries.
    #[error("transport send failed: {0}")]
    Send(String),
}

/// Configuration value could not be parsed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required config: env var {var} not set")]
    Missing { var: String },
    #[error("config parse failed: {0}")]
    Parse(String),
    /// The settings are individually valid but cannot be combined.
    #[error("invalid client setup: {0}")]
    Invalid(String),
}

/// Type registry rejected an entry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Id 0 never appears on the wire as a message type.
    #[error("type id 0 is reserved ({name})")]
    ReservedId { name: String },
    #[error("type id {id} already registered as {existing}")]
    DuplicateId { id: u32, existing: String },
    #[error("message name {0} already registered")]
    DuplicateName(String),
}

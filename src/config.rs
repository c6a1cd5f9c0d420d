//! Client configuration, fixed at construction.
//!
//! Built in code with [`SocketConfig::new`] and the `with_*` setters, or from
//! the environment with [`SocketConfig::from_env`].

use std::time::Duration;

use crate::error::ConfigError;

/// How long `call` waits for a connecting socket before giving up.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;
/// How often `call` re-checks a connecting socket.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Wire encoding used for every frame on one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodingMode {
    /// JSON text frames `{name, session, data}`.
    #[default]
    Text,
    /// 12-byte header plus a registry-encoded payload.
    Binary,
}

/// Which transport adapter backs the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// Direct websocket connection owned by this process.
    #[default]
    WebSocket,
    /// The embedding host owns the socket and bridges frames over channels.
    Host,
}

/// Keep-alive settings. Accepted by the client but only acted upon by
/// [`crate::heartbeat::Heartbeat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    pub message_name: String,
    pub interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketConfig {
    pub url: String,
    pub encoding: EncodingMode,
    pub transport: TransportKind,
    pub heartbeat: Option<HeartbeatConfig>,
    /// Upper bound on the wait for a connecting socket inside `call`.
    pub connect_timeout: Duration,
    /// Poll granularity of that wait.
    pub poll_interval: Duration,
    /// Bound on the wait for a correlated response. `None` waits forever.
    pub response_timeout: Option<Duration>,
    /// Reject inbound binary frames whose length field disagrees with the
    /// bytes received.
    pub strict_length: bool,
}

impl SocketConfig {
    #[must_use]
    pub fn new(url: impl Into<String>, encoding: EncodingMode) -> Self {
        Self {
            url: url.into(),
            encoding,
            transport: TransportKind::default(),
            heartbeat: None,
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            response_timeout: None,
            strict_length: true,
        }
    }

    #[must_use]
    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    /// A zero interval is stored as given; [`crate::heartbeat::Heartbeat::spawn`]
    /// refuses to start with it.
    #[must_use]
    pub fn with_heartbeat(mut self, message_name: impl Into<String>, interval: Duration) -> Self {
        self.heartbeat = Some(HeartbeatConfig { message_name: message_name.into(), interval });
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_strict_length(mut self, strict: bool) -> Self {
        self.strict_length = strict;
        self
    }

    /// Build config from environment variables.
    ///
    /// Required:
    /// - `SOCKMUX_URL`
    ///
    /// Optional:
    /// - `SOCKMUX_ENCODING`: `text` (default) or `binary`
    /// - `SOCKMUX_TRANSPORT`: `websocket` (default) or `host`
    /// - `SOCKMUX_HEARTBEAT_NAME` + `SOCKMUX_HEARTBEAT_SECS`: both or neither
    /// - `SOCKMUX_CONNECT_TIMEOUT_MS`: default 5000
    /// - `SOCKMUX_POLL_INTERVAL_MS`: default 100
    /// - `SOCKMUX_RESPONSE_TIMEOUT_MS`: unset waits forever
    /// - `SOCKMUX_STRICT_LENGTH`: `true` (default) or `false`
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is missing or a value fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var("SOCKMUX_URL").map_err(|_| ConfigError::Missing { var: "SOCKMUX_URL".into() })?;
        let encoding = parse_encoding(std::env::var("SOCKMUX_ENCODING").ok().as_deref())?;
        let transport = parse_transport(std::env::var("SOCKMUX_TRANSPORT").ok().as_deref())?;
        let heartbeat = parse_heartbeat(
            std::env::var("SOCKMUX_HEARTBEAT_NAME").ok(),
            std::env::var("SOCKMUX_HEARTBEAT_SECS").ok().as_deref(),
        )?;
        let strict_length = match std::env::var("SOCKMUX_STRICT_LENGTH").ok().as_deref() {
            None | Some("true" | "1") => true,
            Some("false" | "0") => false,
            Some(other) => return Err(ConfigError::Parse(format!("invalid SOCKMUX_STRICT_LENGTH: {other}"))),
        };

        Ok(Self {
            url,
            encoding,
            transport,
            heartbeat,
            connect_timeout: Duration::from_millis(
                env_parse_u64("SOCKMUX_CONNECT_TIMEOUT_MS")?.unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
            ),
            poll_interval: Duration::from_millis(
                env_parse_u64("SOCKMUX_POLL_INTERVAL_MS")?.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
            response_timeout: env_parse_u64("SOCKMUX_RESPONSE_TIMEOUT_MS")?.map(Duration::from_millis),
            strict_length,
        })
    }
}

/// `None` when `key` is unset. A set but malformed value is an error, never
/// the default.
fn env_parse_u64(key: &str) -> Result<Option<u64>, ConfigError> {
    let Ok(raw) = std::env::var(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|e| ConfigError::Parse(format!("invalid {key}: {raw} ({e})")))
}

/// Interval for a heartbeat period given in seconds. `None` unless the value
/// is positive, finite, representable, and not rounded down to zero.
#[must_use]
pub fn heartbeat_interval(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs).ok().filter(|d| !d.is_zero())
}

pub(crate) fn parse_encoding(raw: Option<&str>) -> Result<EncodingMode, ConfigError> {
    match raw.unwrap_or("text") {
        "text" | "json" => Ok(EncodingMode::Text),
        "binary" | "protobuf" => Ok(EncodingMode::Binary),
        other => Err(ConfigError::Parse(format!("unknown SOCKMUX_ENCODING: {other}"))),
    }
}

fn parse_transport(raw: Option<&str>) -> Result<TransportKind, ConfigError> {
    match raw.unwrap_or("websocket") {
        "websocket" | "ws" => Ok(TransportKind::WebSocket),
        "host" => Ok(TransportKind::Host),
        other => Err(ConfigError::Parse(format!("unknown SOCKMUX_TRANSPORT: {other}"))),
    }
}

fn parse_heartbeat(name: Option<String>, secs: Option<&str>) -> Result<Option<HeartbeatConfig>, ConfigError> {
    match (name, secs) {
        (None, None) => Ok(None),
        (Some(message_name), Some(secs)) => {
            let interval = secs
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(heartbeat_interval)
                .ok_or_else(|| ConfigError::Parse(format!("invalid SOCKMUX_HEARTBEAT_SECS: {secs}")))?;
            Ok(Some(HeartbeatConfig { message_name, interval }))
        }
        _ => Err(ConfigError::Parse(
            "SOCKMUX_HEARTBEAT_NAME and SOCKMUX_HEARTBEAT_SECS must be set together".into(),
        )),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

//! Websocket transport on `tokio-tungstenite`.
//!
//! `open` spawns one task per connection that dials the URL, then relays
//! outbound frames from an unbounded queue and reports inbound frames through
//! the event sink until either side closes.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::{
    ConnectionState, EventSink, SharedState, TransportAdapter, TransportEvent, TransportHandle, WireMessage,
};
use crate::error::TransportError;

/// Dials `ws://` and `wss://` URLs from inside the current tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

enum Outbound {
    Frame(WireMessage),
    Close,
}

impl TransportAdapter for WebSocketTransport {
    fn open(&self, url: &str, events: EventSink) -> Result<Box<dyn TransportHandle>, TransportError> {
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(TransportError::InvalidUrl(url.to_owned()));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::Open(format!("no tokio runtime: {e}")))?;

        let state = SharedState::connecting();
        let (tx, rx) = mpsc::unbounded_channel();
        runtime.spawn(run_socket(url.to_owned(), state.clone(), events, rx));

        Ok(Box::new(WebSocketHandle { state, outbound: tx }))
    }
}

struct WebSocketHandle {
    state: SharedState,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl TransportHandle for WebSocketHandle {
    fn send(&self, message: WireMessage) -> Result<(), TransportError> {
        if self.state.get() != ConnectionState::Open {
            return Err(TransportError::NotOpen);
        }
        self.outbound
            .send(Outbound::Frame(message))
            .map_err(|_| TransportError::NotOpen)
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn close(&self) {
        self.state.mark_closed();
        let _ = self.outbound.send(Outbound::Close);
    }
}

async fn run_socket(url: String, state: SharedState, events: EventSink, mut rx: mpsc::UnboundedReceiver<Outbound>) {
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            warn!(%url, error = %e, "ws: connect failed");
            if state.mark_closed() {
                events(TransportEvent::Error(e.to_string()));
                events(TransportEvent::Closed);
            }
            return;
        }
    };

    // Closed while the handshake was in flight.
    if !state.mark_open() {
        debug!(%url, "ws: closed before open; dropping socket");
        return;
    }
    info!(%url, "ws: connected");
    events(TransportEvent::Open);

    let (mut sink, mut stream) = stream.split();
    let mut failure: Option<String> = None;

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(Outbound::Frame(message)) => {
                        let message = match message {
                            WireMessage::Text(text) => Message::Text(text.into()),
                            WireMessage::Binary(bytes) => Message::Binary(bytes.into()),
                        };
                        if let Err(e) = sink.send(message).await {
                            failure = Some(e.to_string());
                            break;
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let _ = sink.close().await;
                        break;
                    }
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        events(TransportEvent::Message(WireMessage::Text(text.as_str().to_owned())));
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        events(TransportEvent::Message(WireMessage::Binary(bytes.to_vec())));
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        failure = Some(e.to_string());
                        break;
                    }
                }
            }
        }
    }

    let was_open = state.mark_closed();
    if let Some(reason) = failure {
        warn!(%url, error = %reason, "ws: socket failed");
        if was_open {
            events(TransportEvent::Error(reason));
        }
    } else {
        info!(%url, "ws: disconnected");
    }
    if was_open {
        events(TransportEvent::Closed);
    }
}

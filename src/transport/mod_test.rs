use super::*;
use std::sync::Mutex;

fn recording_sink() -> (EventSink, Arc<Mutex<Vec<TransportEvent>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = Arc::clone(&seen);
    let sink: EventSink = Arc::new(move |event| sink_seen.lock().expect("sink mutex").push(event));
    (sink, seen)
}

#[test]
fn shared_state_transitions() {
    let state = SharedState::connecting();
    assert_eq!(state.get(), ConnectionState::Connecting);

    assert!(state.mark_open());
    assert!(!state.mark_open());
    assert_eq!(state.get(), ConnectionState::Open);

    assert!(state.mark_closed());
    assert!(!state.mark_closed());
    assert_eq!(state.get(), ConnectionState::Closed);
}

#[test]
fn closed_state_cannot_reopen() {
    let state = SharedState::connecting();
    assert!(state.mark_closed());
    assert!(!state.mark_open());
    assert_eq!(state.get(), ConnectionState::Closed);
}

#[test]
fn wire_message_reports_kind_and_length() {
    assert_eq!(WireMessage::Text("abc".into()).kind(), "text");
    assert_eq!(WireMessage::Binary(vec![1, 2]).len(), 2);
    assert!(WireMessage::Binary(Vec::new()).is_empty());
}

#[test]
fn host_open_offers_connection_in_connecting_state() {
    let (transport, mut listener) = HostTransport::new();
    let (sink, seen) = recording_sink();

    let handle = transport.open("host://lobby", sink).expect("open");
    assert_eq!(handle.state(), ConnectionState::Connecting);
    assert!(matches!(handle.send(WireMessage::Text("x".into())), Err(TransportError::NotOpen)));

    let conn = listener.try_accept().expect("connection offered");
    assert_eq!(conn.url(), "host://lobby");
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn host_peer_drives_lifecycle_events() {
    let (transport, mut listener) = HostTransport::new();
    let (sink, seen) = recording_sink();
    let handle = transport.open("host://lobby", sink).expect("open");
    let mut conn = listener.try_accept().expect("connection");
    let peer = conn.peer();

    peer.open();
    peer.open();
    assert_eq!(handle.state(), ConnectionState::Open);

    handle.send(WireMessage::Binary(vec![9])).expect("send");
    assert_eq!(conn.try_recv(), Some(WireMessage::Binary(vec![9])));

    peer.deliver(WireMessage::Text("hello".into()));
    peer.fail("reset by peer");
    peer.close();
    peer.deliver(WireMessage::Text("late".into()));

    assert_eq!(handle.state(), ConnectionState::Closed);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            TransportEvent::Open,
            TransportEvent::Message(WireMessage::Text("hello".into())),
            TransportEvent::Error("reset by peer".into()),
            TransportEvent::Closed,
        ]
    );
}

#[test]
fn client_side_close_is_silent_and_blocks_sends() {
    let (transport, mut listener) = HostTransport::new();
    let (sink, seen) = recording_sink();
    let handle = transport.open("host://lobby", sink).expect("open");
    let peer = listener.try_accept().expect("connection").peer();
    peer.open();

    handle.close();
    assert_eq!(peer.state(), ConnectionState::Closed);
    assert!(matches!(handle.send(WireMessage::Text("x".into())), Err(TransportError::NotOpen)));
    assert_eq!(*seen.lock().unwrap(), vec![TransportEvent::Open]);
}

#[test]
fn host_open_fails_once_listener_is_gone() {
    let (transport, listener) = HostTransport::new();
    drop(listener);
    let (sink, _) = recording_sink();
    assert!(matches!(transport.open("host://lobby", sink), Err(TransportError::Open(_))));
}

#[test]
fn websocket_rejects_non_ws_urls() {
    let (sink, _) = recording_sink();
    let err = WebSocketTransport.open("http://example.test", sink).err().expect("should fail");
    assert!(matches!(err, TransportError::InvalidUrl(_)));
}

#[test]
fn websocket_open_requires_a_runtime() {
    let (sink, _) = recording_sink();
    let err = WebSocketTransport.open("ws://127.0.0.1:9", sink).err().expect("should fail");
    assert!(matches!(err, TransportError::Open(_)));
}

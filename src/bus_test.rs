use super::*;
use serde_json::json;

#[test]
fn publish_without_subscribers_is_a_no_op() {
    let bus = BroadcastBus::default();
    bus.publish("chat", &json!({"msg": "hi"}));
}

#[tokio::test]
async fn subscribers_receive_topic_and_payload() {
    let bus = BroadcastBus::new(4);
    let mut a = bus.subscribe();
    let mut b = bus.subscribe();

    bus.publish(SOCKET_RECV_TOPIC, &json!({"name": "chat", "session": 1, "data": null}));

    let expected = BusEvent {
        topic: "socket:recv".to_owned(),
        payload: json!({"name": "chat", "session": 1, "data": null}),
    };
    assert_eq!(a.recv().await.expect("a"), expected);
    assert_eq!(b.recv().await.expect("b"), expected);
}

#[tokio::test]
async fn lagging_subscriber_skips_instead_of_blocking() {
    let bus = BroadcastBus::new(1);
    let mut rx = bus.subscribe();

    bus.publish("a", &json!(1));
    bus.publish("b", &json!(2));

    assert!(matches!(rx.recv().await, Err(broadcast::error::RecvError::Lagged(1))));
    assert_eq!(rx.recv().await.expect("latest").topic, "b");
}

use super::engine::{Relay, encode};
use super::envelope::{EnvelopeKind, OutboundEnvelope, WELCOME_MESSAGE};
use super::registry::ConnectionRegistry;
use super::transform::{InboundEvent, device_id_from_topic, transform, transform_at};
use crate::client::{Connection, ConnectionState};
use crate::utils::BridgeError;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tungstenite::protocol::Message as WsMessage;

fn open_connection() -> (Arc<Connection>, UnboundedReceiver<WsMessage>) {
    let (tx, rx) = mpsc::unbounded_channel::<WsMessage>();
    (Arc::new(Connection::new(tx)), rx)
}

fn text_of(msg: WsMessage) -> String {
    match msg {
        WsMessage::Text(text) => text.as_str().to_string(),
        other => panic!("Expected a text message, got {other:?}"),
    }
}

#[test]
fn test_device_id_from_topic() {
    assert_eq!(device_id_from_topic("classroom/device42/telemetry"), "device42");
    assert_eq!(device_id_from_topic("classroom/device42"), "device42");
    assert_eq!(device_id_from_topic("classroom"), "");
    assert_eq!(device_id_from_topic(""), "");
    assert_eq!(device_id_from_topic("classroom//telemetry"), "");
}

#[test]
fn test_transform_builds_telemetry_envelope() {
    let payload = json!({ "temp": 21.5, "tags": ["a", "b"], "nested": { "ok": true } });
    let raw = serde_json::to_vec(&payload).unwrap();

    let env = transform_at("classroom/device42/telemetry", &raw, 1234).unwrap();
    assert_eq!(env.kind, EnvelopeKind::Telemetry);
    assert_eq!(env.device_id.as_deref(), Some("device42"));
    assert_eq!(env.topic.as_deref(), Some("classroom/device42/telemetry"));
    assert_eq!(env.payload, Some(payload));
    assert_eq!(env.message, None);
    assert_eq!(env.timestamp, 1234);
}

#[test]
fn test_transform_short_topic_has_empty_device_id() {
    let env = transform("telemetry", br#"{"temp":1}"#).unwrap();
    assert_eq!(env.device_id.as_deref(), Some(""));
}

#[test]
fn test_transform_accepts_non_object_json() {
    let env = transform("classroom/d/telemetry", b"[1,2,3]").unwrap();
    assert_eq!(env.payload, Some(json!([1, 2, 3])));
}

#[test]
fn test_transform_stamps_current_time() {
    let before = chrono::Utc::now().timestamp_millis();
    let env = transform("classroom/d/telemetry", b"{}").unwrap();
    let after = chrono::Utc::now().timestamp_millis();
    assert!(env.timestamp >= before && env.timestamp <= after);
}

#[test]
fn test_transform_rejects_malformed_payload() {
    assert!(matches!(
        transform("classroom/d/telemetry", b"{not json"),
        Err(BridgeError::Parse(_))
    ));
    assert!(matches!(
        transform("classroom/d/telemetry", &[0xff, 0xfe, 0x00]),
        Err(BridgeError::Parse(_))
    ));
    assert!(matches!(
        transform("classroom/d/telemetry", b""),
        Err(BridgeError::Parse(_))
    ));
}

#[test]
fn test_telemetry_envelope_wire_format() {
    let env = OutboundEnvelope::telemetry(
        "device42".to_string(),
        "classroom/device42/telemetry".to_string(),
        json!({ "temp": 21.5 }),
        1_700_000_000_000,
    );
    let wire: Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();
    assert_eq!(
        wire,
        json!({
            "type": "telemetry",
            "deviceId": "device42",
            "topic": "classroom/device42/telemetry",
            "payload": { "temp": 21.5 },
            "timestamp": 1_700_000_000_000_i64
        })
    );
}

#[test]
fn test_connected_envelope_wire_format() {
    let wire: Value =
        serde_json::from_str(&OutboundEnvelope::connected(42).to_json().unwrap()).unwrap();
    assert_eq!(
        wire,
        json!({ "type": "connected", "message": WELCOME_MESSAGE, "timestamp": 42 })
    );
}

#[test]
fn test_registry_add_is_idempotent() {
    let registry = ConnectionRegistry::new(0);
    let (conn, _rx) = open_connection();

    assert!(registry.add(conn.clone()).unwrap());
    assert!(!registry.add(conn.clone()).unwrap());
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.snapshot().len(), 1);
}

#[test]
fn test_registry_remove_is_idempotent() {
    let registry = ConnectionRegistry::new(0);
    let (conn, _rx) = open_connection();
    let (other, _rx2) = open_connection();
    registry.add(conn.clone()).unwrap();
    registry.add(other.clone()).unwrap();

    assert!(registry.remove(&conn.id));
    assert!(!registry.remove(&conn.id));
    assert_eq!(registry.len(), 1);
    assert!(registry.contains(&other.id));
    assert_eq!(conn.state(), ConnectionState::Closing);
    assert!(conn.send(WsMessage::text("late")).is_err());
}

#[test]
fn test_registry_rejects_closed_connection() {
    let registry = ConnectionRegistry::new(0);
    let (conn, _rx) = open_connection();
    conn.close();
    assert!(registry.add(conn).is_err());
    assert!(registry.is_empty());
}

#[test]
fn test_registry_enforces_capacity() {
    let registry = ConnectionRegistry::new(2);
    let (a, _ra) = open_connection();
    let (b, _rb) = open_connection();
    let (c, _rc) = open_connection();

    registry.add(a.clone()).unwrap();
    registry.add(b).unwrap();
    assert!(matches!(
        registry.add(c.clone()),
        Err(BridgeError::CapacityReached(2))
    ));
    // re-adding a member at capacity is still a no-op, not an error
    assert!(!registry.add(a.clone()).unwrap());

    registry.remove(&a.id);
    assert!(registry.add(c).unwrap());
}

#[test]
fn test_closed_connection_absent_from_next_snapshot() {
    let registry = ConnectionRegistry::new(0);
    let (conn, _rx) = open_connection();
    registry.add(conn.clone()).unwrap();
    assert_eq!(registry.snapshot().len(), 1);

    registry.remove(&conn.id);
    assert!(registry.snapshot().iter().all(|c| c.id != conn.id));
}

#[test]
fn test_broadcast_delivers_identical_frame_to_all() {
    let registry = ConnectionRegistry::new_shared(0);
    let relay = Relay::new(registry.clone());
    let mut receivers = Vec::new();
    for _ in 0..3 {
        let (conn, rx) = open_connection();
        registry.add(conn).unwrap();
        receivers.push(rx);
    }

    let env = OutboundEnvelope::telemetry(
        "d1".to_string(),
        "classroom/d1/telemetry".to_string(),
        json!({ "x": 1 }),
        7,
    );
    assert_eq!(relay.broadcast(&env), 3);

    let expected = text_of(encode(&env).unwrap());
    for rx in &mut receivers {
        assert_eq!(text_of(rx.try_recv().unwrap()), expected);
        assert!(rx.try_recv().is_err());
    }
}

#[test]
fn test_broadcast_survives_connection_closed_mid_flight() {
    let registry = ConnectionRegistry::new_shared(0);
    let relay = Relay::new(registry.clone());

    let (alive_a, mut rx_a) = open_connection();
    let (dead, rx_dead) = open_connection();
    let (alive_b, mut rx_b) = open_connection();
    registry.add(alive_a).unwrap();
    registry.add(dead.clone()).unwrap();
    registry.add(alive_b).unwrap();

    // The writer side goes away while the connection is still registered.
    drop(rx_dead);

    let sent = relay.broadcast(&OutboundEnvelope::connected(1));
    assert_eq!(sent, 2);
    assert!(!registry.contains(&dead.id));
    assert_eq!(registry.len(), 2);
    assert!(rx_a.try_recv().is_ok());
    assert!(rx_b.try_recv().is_ok());
}

#[test]
fn test_broadcast_skips_closing_connection() {
    let registry = ConnectionRegistry::new_shared(0);
    let relay = Relay::new(registry.clone());
    let (closing, mut rx_closing) = open_connection();
    let (open, mut rx_open) = open_connection();
    registry.add(closing.clone()).unwrap();
    registry.add(open).unwrap();

    closing.begin_close();

    assert_eq!(relay.broadcast(&OutboundEnvelope::connected(1)), 1);
    assert!(rx_closing.try_recv().is_err());
    assert!(rx_open.try_recv().is_ok());
    assert!(!registry.contains(&closing.id));
}

#[test]
fn test_broadcast_to_empty_registry() {
    let relay = Relay::new(ConnectionRegistry::new_shared(0));
    assert_eq!(relay.broadcast(&OutboundEnvelope::connected(1)), 0);
}

#[test]
fn test_handle_drops_malformed_payload() {
    let registry = ConnectionRegistry::new_shared(0);
    let relay = Relay::new(registry.clone());
    let (conn, mut rx) = open_connection();
    registry.add(conn).unwrap();

    assert_eq!(
        relay.handle(InboundEvent::new("classroom/d/telemetry", &b"\xff\xfe"[..])),
        0
    );
    assert!(rx.try_recv().is_err());
    assert_eq!(registry.len(), 1);

    assert_eq!(
        relay.handle(InboundEvent::new("classroom/d/telemetry", &b"{\"ok\":1}"[..])),
        1
    );
    let wire: Value = serde_json::from_str(&text_of(rx.try_recv().unwrap())).unwrap();
    assert_eq!(wire["payload"], json!({ "ok": 1 }));
}

#[test]
fn test_send_welcome_targets_one_connection() {
    let registry = ConnectionRegistry::new_shared(0);
    let relay = Relay::new(registry.clone());
    let (newcomer, mut rx_new) = open_connection();
    let (existing, mut rx_existing) = open_connection();
    registry.add(existing).unwrap();
    registry.add(newcomer.clone()).unwrap();

    relay.send_welcome(&newcomer).unwrap();

    let wire: Value = serde_json::from_str(&text_of(rx_new.try_recv().unwrap())).unwrap();
    assert_eq!(wire["type"], "connected");
    assert_eq!(wire["message"], WELCOME_MESSAGE);
    assert!(wire.get("deviceId").is_none());
    assert!(rx_existing.try_recv().is_err());
}

#[tokio::test]
async fn test_run_preserves_order_and_stops_when_senders_drop() {
    let registry = ConnectionRegistry::new_shared(0);
    let relay = Relay::new(registry.clone());
    let (conn, mut rx) = open_connection();
    registry.add(conn).unwrap();

    let (tx, events) = mpsc::unbounded_channel();
    for i in 0..5 {
        tx.send(InboundEvent::new(
            "classroom/d/telemetry",
            format!("{{\"seq\":{i}}}"),
        ))
        .unwrap();
    }
    drop(tx);

    relay.run(events).await;

    for i in 0..5 {
        let wire: Value = serde_json::from_str(&text_of(rx.try_recv().unwrap())).unwrap();
        assert_eq!(wire["payload"]["seq"], i);
    }
    assert!(rx.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_churn_during_broadcast() {
    let registry = ConnectionRegistry::new_shared(0);
    let relay = Relay::new(registry.clone());

    let (stable, mut rx_stable) = open_connection();
    registry.add(stable).unwrap();

    let churn = {
        let registry = registry.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                let (conn, rx) = open_connection();
                registry.add(conn.clone()).unwrap();
                tokio::task::yield_now().await;
                drop(rx);
                registry.remove(&conn.id);
            }
        })
    };

    let rounds = 200;
    for i in 0..rounds {
        relay.broadcast(&OutboundEnvelope::connected(i));
        tokio::task::yield_now().await;
    }
    churn.await.unwrap();

    let mut received = Vec::new();
    while let Ok(msg) = rx_stable.try_recv() {
        let env: OutboundEnvelope = serde_json::from_str(&text_of(msg)).unwrap();
        received.push(env.timestamp);
    }
    assert_eq!(received, (0..rounds).collect::<Vec<_>>());
    assert_eq!(registry.len(), 1);
}

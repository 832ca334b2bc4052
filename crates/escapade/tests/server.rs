//! Integration tests for the Escapade server, handler, and full connection flow.
//!
//! These run on the real clock against real sockets, so timing assertions
//! leave generous slack.

use std::time::Duration;

use escapade::prelude::*;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

fn room(id: &str, duration: u64) -> RoomRecord {
    let mut record = RoomRecord::new(RoomId::new(id));
    record.timer_duration = Some(duration);
    record.config = json!({
        "timeTriggers": [
            {"timeSeconds": 298, "action": {"type": "send_hint", "message": "two seconds in"}}
        ]
    });
    record
}

/// Starts a server on random ports and returns the WebSocket address.
async fn start_server() -> String {
    let server = EscapadeServerBuilder::new()
        .ws_bind("127.0.0.1:0")
        .http_bind("127.0.0.1:0")
        .build(MemoryStore::with_records([room("R1", 300), room("R2", 300)]))
        .await
        .expect("server should build");

    let addr = server
        .ws_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    addr
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send(ws: &mut ClientWs, event: &str, data: Value) {
    let frame = json!({"event": event, "data": data}).to_string();
    ws.send(Message::Text(frame.into())).await.expect("send");
}

async fn recv(ws: &mut ClientWs) -> ServerEvent {
    let msg = tokio::time::timeout(Duration::from_secs(3), ws.next())
        .await
        .expect("event within 3s")
        .expect("stream open")
        .expect("recv");
    serde_json::from_slice(&msg.into_data()).expect("decode event")
}

/// Asserts nothing arrives for a short while.
async fn assert_silent(ws: &mut ClientWs) {
    let result = tokio::time::timeout(Duration::from_millis(300), ws.next()).await;
    assert!(result.is_err(), "expected no event, got {result:?}");
}

/// Joins a room and consumes the join burst.
async fn join(ws: &mut ClientWs, room_id: &str, client_type: &str) -> Vec<ServerEvent> {
    send(ws, "join_room", json!({"roomId": room_id, "clientType": client_type})).await;
    let burst = if client_type == "gm" { 4 } else { 3 };
    let mut events = Vec::new();
    for _ in 0..burst {
        events.push(recv(ws).await);
    }
    events
}

fn main_update(remaining: u64, duration: u64, running: bool) -> ServerEvent {
    ServerEvent::TimerUpdate(TimerUpdate {
        remaining,
        duration,
        running,
        enabled: None,
    })
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_join_room_sends_ack_snapshots_and_config() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    let events = join(&mut ws, "R1", "gm").await;
    assert!(matches!(
        &events[0],
        ServerEvent::RoomJoined { room_id, .. } if room_id.as_str() == "R1"
    ));
    assert_eq!(events[1], main_update(300, 300, false));
    assert_eq!(
        events[2],
        ServerEvent::SecondaryTimerUpdate(TimerUpdate {
            remaining: 600,
            duration: 600,
            running: false,
            enabled: Some(false),
        })
    );
    match &events[3] {
        ServerEvent::RoomConfig { config } => assert!(config.get("timeTriggers").is_some()),
        other => panic!("expected room_config, got {other:?}"),
    }
}

#[tokio::test]
async fn test_join_unknown_room_is_not_found() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    send(&mut ws, "join_room", json!({"roomId": "nope", "clientType": "player"})).await;
    match recv(&mut ws).await {
        ServerEvent::Error { code, .. } => assert_eq!(code, 404),
        other => panic!("expected Error 404, got {other:?}"),
    }

    send(&mut ws, "join_room", json!({"clientType": "player"})).await;
    match recv(&mut ws).await {
        ServerEvent::Error { code, .. } => assert_eq!(code, 400),
        other => panic!("expected Error 400, got {other:?}"),
    }
}

#[tokio::test]
async fn test_timer_start_tick_stop_reaches_every_subscriber() {
    let addr = start_server().await;
    let mut gm = connect(&addr).await;
    let mut player = connect(&addr).await;
    join(&mut gm, "R1", "gm").await;
    join(&mut player, "R1", "player").await;

    send(&mut gm, "timer_control", json!({"roomId": "R1", "action": "start"})).await;
    assert_eq!(recv(&mut gm).await, main_update(300, 300, true));
    assert_eq!(recv(&mut player).await, main_update(300, 300, true));

    // After a second: the tick snapshot.
    assert_eq!(recv(&mut player).await, main_update(299, 300, true));
    assert_eq!(recv(&mut gm).await, main_update(299, 300, true));

    send(&mut gm, "timer_control", json!({"roomId": "R1", "action": "stop"})).await;
    assert_eq!(recv(&mut gm).await, main_update(300, 300, false));
    assert_eq!(recv(&mut player).await, main_update(300, 300, false));
}

#[tokio::test]
async fn test_time_trigger_hint_is_broadcast() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    join(&mut ws, "R1", "player").await;

    send(&mut ws, "timer_control", json!({"roomId": "R1", "action": "start"})).await;

    let mut hint = None;
    for _ in 0..6 {
        if let ServerEvent::HintReceived(h) = recv(&mut ws).await {
            hint = Some(h);
            break;
        }
    }
    let hint = hint.expect("hint at 298s remaining");
    assert_eq!(hint.message, "two seconds in");
}

#[tokio::test]
async fn test_invalid_timer_control_errors_only_the_issuer() {
    let addr = start_server().await;
    let mut gm = connect(&addr).await;
    let mut player = connect(&addr).await;
    join(&mut gm, "R1", "gm").await;
    join(&mut player, "R1", "player").await;

    send(&mut gm, "timer_control", json!({"roomId": "R1", "action": "explode"})).await;
    match recv(&mut gm).await {
        ServerEvent::Error { code, message } => {
            assert_eq!(code, 400);
            assert!(message.contains("explode"));
        }
        other => panic!("expected Error 400, got {other:?}"),
    }

    send(&mut gm, "timer_control", json!({"roomId": "R1", "action": "adjust", "amount": "lots"})).await;
    match recv(&mut gm).await {
        ServerEvent::Error { code, .. } => assert_eq!(code, 400),
        other => panic!("expected Error 400, got {other:?}"),
    }

    assert_silent(&mut player).await;
}

#[tokio::test]
async fn test_disabled_secondary_timer_is_missing() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    join(&mut ws, "R1", "gm").await;

    send(&mut ws, "secondary_timer_control", json!({"roomId": "R1", "action": "start"})).await;
    match recv(&mut ws).await {
        ServerEvent::Error { code, .. } => assert_eq!(code, 404),
        other => panic!("expected Error 404, got {other:?}"),
    }
}

#[tokio::test]
async fn test_timer_control_for_uninitialized_room() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    send(&mut ws, "timer_control", json!({"roomId": "R2", "action": "start"})).await;
    match recv(&mut ws).await {
        ServerEvent::Error { code, .. } => assert_eq!(code, 404),
        other => panic!("expected Error 404, got {other:?}"),
    }
}

#[tokio::test]
async fn test_heartbeat_response() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    send(&mut ws, "heartbeat", json!({"clientTime": 12345})).await;
    match recv(&mut ws).await {
        ServerEvent::HeartbeatAck {
            client_time,
            server_time,
        } => {
            assert_eq!(client_time, 12345);
            assert!(server_time > 0);
        }
        other => panic!("expected HeartbeatAck, got {other:?}"),
    }
}

#[tokio::test]
async fn test_garbage_frame_reports_error_and_keeps_connection() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    ws.send(Message::Text("not json".into())).await.expect("send");
    match recv(&mut ws).await {
        ServerEvent::Error { code, .. } => assert_eq!(code, 400),
        other => panic!("expected Error 400, got {other:?}"),
    }

    send(&mut ws, "heartbeat", json!({"clientTime": 999})).await;
    assert!(matches!(recv(&mut ws).await, ServerEvent::HeartbeatAck { .. }));
}

#[tokio::test]
async fn test_leave_room_stops_broadcasts_but_not_the_timer() {
    let addr = start_server().await;
    let mut gm = connect(&addr).await;
    let mut player = connect(&addr).await;
    join(&mut gm, "R1", "gm").await;
    join(&mut player, "R1", "player").await;

    send(&mut player, "leave_room", json!({"roomId": "R1"})).await;
    // The leave is processed before the next message on the same socket.
    send(&mut player, "heartbeat", json!({"clientTime": 1})).await;
    assert!(matches!(recv(&mut player).await, ServerEvent::HeartbeatAck { .. }));

    send(&mut gm, "timer_control", json!({"roomId": "R1", "action": "start"})).await;
    assert_eq!(recv(&mut gm).await, main_update(300, 300, true));
    assert_silent(&mut player).await;
    assert_eq!(recv(&mut gm).await, main_update(299, 300, true));
}

#[tokio::test]
async fn test_switching_rooms_leaves_the_previous_one() {
    let addr = start_server().await;
    let mut gm = connect(&addr).await;
    let mut roamer = connect(&addr).await;
    join(&mut gm, "R1", "gm").await;
    join(&mut roamer, "R1", "player").await;
    join(&mut roamer, "R2", "player").await;

    send(&mut gm, "timer_control", json!({"roomId": "R1", "action": "start"})).await;
    assert_eq!(recv(&mut gm).await, main_update(300, 300, true));
    assert_silent(&mut roamer).await;
}

#[tokio::test]
async fn test_shutdown_flushes_pending_records() {
    let server = EscapadeServerBuilder::new()
        .ws_bind("127.0.0.1:0")
        .http_bind("127.0.0.1:0")
        .build(MemoryStore::with_records([room("R1", 300)]))
        .await
        .expect("server should build");
    let addr = server.ws_addr().expect("should have local addr").to_string();
    let store = std::sync::Arc::clone(server.registry().store());

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let running = tokio::spawn(server.run_until(async {
        let _ = stop_rx.await;
    }));
    tokio::time::sleep(Duration::from_millis(10)).await;

    let mut ws = connect(&addr).await;
    join(&mut ws, "R1", "gm").await;
    send(&mut ws, "timer_control", json!({"roomId": "R1", "action": "adjust", "amount": 60})).await;
    assert_eq!(recv(&mut ws).await, main_update(360, 360, false));

    // Still buffered in the write-behind queue.
    let record = store.load(&RoomId::new("R1")).await.unwrap().unwrap();
    assert_eq!(record.timer_duration, Some(300));

    stop_tx.send(()).unwrap();
    running.await.unwrap().unwrap();

    let record = store.load(&RoomId::new("R1")).await.unwrap().unwrap();
    assert_eq!(record.timer_duration, Some(360));
}

//! HTTP API tests, driving the router directly with `tower::ServiceExt`.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use escapade::http::router;
use escapade::prelude::*;
use escapade_room::{PersistQueue, WebhookJob, WebhookQueue};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tower::ServiceExt;

// =========================================================================
// Helpers
// =========================================================================

struct Api {
    app: Router,
    registry: Arc<RoomRegistry<MemoryStore>>,
    store: Arc<MemoryStore>,
    _webhooks: mpsc::Receiver<WebhookJob>,
}

fn escape_room() -> RoomRecord {
    let mut record = RoomRecord::new(RoomId::new("R1"));
    record.timer_duration = Some(300);
    record.variables.insert(
        "door_open".into(),
        Variable::new(VariableType::Boolean, &json!(false)).unwrap(),
    );
    record.config = json!({
        "variableTriggers": [{
            "variableName": "door_open",
            "condition": "equals",
            "comparisonValue": "true",
            "actions": [{"type": "show_message", "text": "The door creaks open"}]
        }]
    });
    record
}

fn api() -> Api {
    let store = Arc::new(MemoryStore::with_records([escape_room()]));
    let config = EngineConfig::default();
    let (persist, worker) = PersistQueue::spawn(Arc::clone(&store), config.persist_interval);
    let (webhooks, receiver) = WebhookQueue::detached(16);
    let registry = Arc::new(RoomRegistry::with_queues(
        Arc::clone(&store),
        config,
        persist,
        webhooks,
        vec![worker],
    ));
    Api {
        app: router(Arc::clone(&registry)),
        registry,
        store,
        _webhooks: receiver,
    }
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(body) => Body::from(body.to_string()),
            None => Body::empty(),
        })
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_health() {
    let api = api();
    let (status, _) = call(&api.app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_list_variables_of_stored_room() {
    let api = api();
    let (status, body) = call(&api.app, "GET", "/api/rooms/R1/variables", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"door_open": {"type": "boolean", "value": false}}));
}

#[tokio::test]
async fn test_unknown_and_invalid_rooms() {
    let api = api();
    let (status, body) = call(&api.app, "GET", "/api/rooms/R404/variables", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
    assert!(body["error"].as_str().unwrap().contains("R404"));

    let (status, _) = call(&api.app, "GET", "/api/rooms/bad.id/variables", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_variable_then_conflict() {
    let api = api();
    let body = json!({"name": "score", "type": "integer", "value": "3"});
    let (status, created) = call(&api.app, "POST", "/api/rooms/R1/variables", Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created, json!({"name": "score", "type": "integer", "value": 3}));

    let (status, body) = call(&api.app, "POST", "/api/rooms/R1/variables", Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 409);

    let record = api.store.load(&RoomId::new("R1")).await.unwrap().unwrap();
    assert_eq!(record.variables["score"].value, json!(3));
}

#[tokio::test]
async fn test_create_infers_type_when_missing() {
    let api = api();
    let (status, created) = call(
        &api.app,
        "POST",
        "/api/rooms/R1/variables",
        Some(json!({"name": "code", "value": "4711"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["type"], "string");
}

#[tokio::test]
async fn test_write_to_active_room_broadcasts_and_fires_rules() {
    let api = api();
    let handle = api.registry.get_or_init(&RoomId::new("R1")).await.unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    handle.join(ClientId(1), ClientRole::Player, tx).await.unwrap();
    drain(&mut rx);

    let (status, body) = call(
        &api.app,
        "POST",
        "/api/rooms/R1/variables/door_open",
        Some(json!({"value": true, "type": "boolean"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"name": "door_open", "type": "boolean", "value": true}));

    let events = drain(&mut rx);
    let names: Vec<&str> = events.iter().map(ServerEvent::name).collect();
    assert_eq!(names, ["variable_updated", "show_message"]);
    match &events[0] {
        ServerEvent::VariableUpdated(update) => {
            assert_eq!(update.var, "door_open");
            assert_eq!(update.value, json!(true));
        }
        other => panic!("expected variable_updated, got {other:?}"),
    }
}

#[tokio::test]
async fn test_write_errors() {
    let api = api();

    let (status, _) = call(
        &api.app,
        "POST",
        "/api/rooms/R1/variables/missing",
        Some(json!({"value": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &api.app,
        "POST",
        "/api/rooms/R1/variables/timer_main",
        Some(json!({"value": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &api.app,
        "POST",
        "/api/rooms/R1/variables/door_open",
        Some(json!({"nothing": "here"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
}

#[tokio::test]
async fn test_teardown_reports_whether_room_was_active() {
    let api = api();
    let (status, body) = call(&api.app, "POST", "/api/rooms/R1/teardown", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"roomId": "R1", "wasActive": false}));

    api.registry.get_or_init(&RoomId::new("R1")).await.unwrap();
    let (_, body) = call(&api.app, "POST", "/api/rooms/R1/teardown", None).await;
    assert_eq!(body["wasActive"], true);
    assert!(api.registry.active_rooms().await.is_empty());
}

//! HTTP API for room variables and room lifecycle hooks.
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `GET /health` | liveness |
//! | `GET /api/rooms/:room_id/variables` | every variable of a room |
//! | `POST /api/rooms/:room_id/variables` | create `{name, type, value}` |
//! | `POST /api/rooms/:room_id/variables/:name` | write `{value, type?}` |
//! | `POST /api/rooms/:room_id/teardown` | stop a room's timers |
//!
//! Errors come back as `{"error": <message>, "code": <status>}`.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use escapade_protocol::RoomId;
use escapade_room::{RoomRegistry, RoomStore};
use escapade_rules::{Variable, VariableType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::EscapadeError;

type Registry<S> = State<Arc<RoomRegistry<S>>>;

/// Builds the API router around a registry.
pub fn router<S: RoomStore>(registry: Arc<RoomRegistry<S>>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/rooms/:room_id/variables",
            get(list_variables::<S>).post(create_variable::<S>),
        )
        .route("/api/rooms/:room_id/variables/:name", post(write_variable::<S>))
        .route("/api/rooms/:room_id/teardown", post(teardown::<S>))
        .with_state(registry)
}

#[derive(Debug, Deserialize)]
struct NewVariable {
    name: String,
    #[serde(rename = "type", default)]
    kind: Option<VariableType>,
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Deserialize)]
struct VariableWrite {
    value: Value,
    #[serde(rename = "type", default)]
    kind: Option<VariableType>,
}

#[derive(Debug, Serialize)]
struct NamedVariable {
    name: String,
    #[serde(flatten)]
    variable: Variable,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TeardownReply {
    room_id: RoomId,
    was_active: bool,
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn list_variables<S: RoomStore>(
    State(registry): Registry<S>,
    Path(room_id): Path<RoomId>,
) -> Result<Json<BTreeMap<String, Variable>>, EscapadeError> {
    Ok(Json(registry.variables(&room_id).await?))
}

async fn create_variable<S: RoomStore>(
    State(registry): Registry<S>,
    Path(room_id): Path<RoomId>,
    body: Result<Json<NewVariable>, JsonRejection>,
) -> Result<(StatusCode, Json<NamedVariable>), EscapadeError> {
    let Json(body) = body.map_err(|e| EscapadeError::InvalidBody(e.body_text()))?;
    let kind = body.kind.unwrap_or_else(|| VariableType::infer(&body.value));
    let variable = registry
        .create_variable(&room_id, body.name.clone(), kind, body.value)
        .await?;
    tracing::info!(%room_id, variable = %body.name, %kind, "variable created");
    Ok((
        StatusCode::CREATED,
        Json(NamedVariable {
            name: body.name,
            variable,
        }),
    ))
}

async fn write_variable<S: RoomStore>(
    State(registry): Registry<S>,
    Path((room_id, name)): Path<(RoomId, String)>,
    body: Result<Json<VariableWrite>, JsonRejection>,
) -> Result<Json<NamedVariable>, EscapadeError> {
    let Json(body) = body.map_err(|e| EscapadeError::InvalidBody(e.body_text()))?;
    let variable = registry
        .write_variable(&room_id, name.clone(), body.value, body.kind)
        .await?;
    tracing::debug!(%room_id, variable = %name, "variable written");
    Ok(Json(NamedVariable { name, variable }))
}

async fn teardown<S: RoomStore>(
    State(registry): Registry<S>,
    Path(room_id): Path<RoomId>,
) -> Json<TeardownReply> {
    let was_active = registry.teardown(&room_id).await;
    Json(TeardownReply {
        room_id,
        was_active,
    })
}

//! Unified error type for the Escapade server.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use escapade_protocol::ProtocolError;
use escapade_room::{RoomError, StoreError};
use escapade_rules::RuleError;
use escapade_transport::TransportError;
use serde_json::json;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum EscapadeError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid command).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Malformed variable value or rule data.
    #[error(transparent)]
    Rule(#[from] RuleError),

    /// Reading or writing a room record failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A room-level error (not found, missing timer, variable conflict).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// An HTTP request body that isn't the expected JSON.
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl EscapadeError {
    /// HTTP-style status code reported to clients.
    pub fn code(&self) -> u16 {
        match self {
            Self::Protocol(e) => e.code(),
            Self::Room(e) => e.code(),
            Self::Rule(_) | Self::InvalidBody(_) => 400,
            Self::Transport(_) | Self::Store(_) | Self::Io(_) => 500,
        }
    }
}

impl IntoResponse for EscapadeError {
    fn into_response(self) -> Response {
        let code = self.code();
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self, code, "request failed");
        } else {
            tracing::debug!(error = %self, code, "request rejected");
        }
        (status, Json(json!({ "error": self.to_string(), "code": code }))).into_response()
    }
}

//! Outbound events: what a room publishes to its subscribers.
//!
//! Event names are part of the client contract, including the two
//! camelCase names (`variableUpdate`, `hintReceived`) existing clients
//! listen for.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ClientId, RoomId, TimerKind};

/// An event published on a room's broadcast channel or sent to one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Reply to `join_room`.
    #[serde(rename = "room_joined", rename_all = "camelCase")]
    RoomJoined { room_id: RoomId, client_id: ClientId },

    /// The room's rule configuration, pushed to game masters on join.
    #[serde(rename = "room_config")]
    RoomConfig { config: Value },

    #[serde(rename = "timer_update")]
    TimerUpdate(TimerUpdate),

    #[serde(rename = "secondary_timer_update")]
    SecondaryTimerUpdate(TimerUpdate),

    #[serde(rename = "timer_complete")]
    TimerComplete,

    #[serde(rename = "secondary_timer_complete")]
    SecondaryTimerComplete,

    /// A client wrote a variable.
    #[serde(rename = "variable_updated")]
    VariableUpdated(VariableUpdated),

    #[serde(rename = "play_sound")]
    PlaySound(SoundPayload),

    #[serde(rename = "show_message")]
    ShowMessage(MessagePayload),

    #[serde(rename = "show_lightbox")]
    ShowLightbox(LightboxPayload),

    /// A rule asked clients to display a variable change.
    #[serde(rename = "variableUpdate")]
    VariableUpdate(VariableChange),

    #[serde(rename = "hintReceived")]
    HintReceived(HintReceived),

    #[serde(rename = "heartbeat_ack", rename_all = "camelCase")]
    HeartbeatAck { client_time: u64, server_time: u64 },

    /// Sent only to the client whose command failed. `code` follows
    /// HTTP conventions (400 invalid, 404 missing, 409 conflict).
    #[serde(rename = "error")]
    Error { code: u16, message: String },
}

impl ServerEvent {
    /// The snapshot event for a timer kind.
    pub fn timer_update(kind: TimerKind, update: TimerUpdate) -> Self {
        match kind {
            TimerKind::Main => Self::TimerUpdate(update),
            TimerKind::Secondary => Self::SecondaryTimerUpdate(update),
        }
    }

    /// The completion event for a timer kind.
    pub fn timer_complete(kind: TimerKind) -> Self {
        match kind {
            TimerKind::Main => Self::TimerComplete,
            TimerKind::Secondary => Self::SecondaryTimerComplete,
        }
    }

    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    /// The wire name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RoomJoined { .. } => "room_joined",
            Self::RoomConfig { .. } => "room_config",
            Self::TimerUpdate(_) => "timer_update",
            Self::SecondaryTimerUpdate(_) => "secondary_timer_update",
            Self::TimerComplete => "timer_complete",
            Self::SecondaryTimerComplete => "secondary_timer_complete",
            Self::VariableUpdated(_) => "variable_updated",
            Self::PlaySound(_) => "play_sound",
            Self::ShowMessage(_) => "show_message",
            Self::ShowLightbox(_) => "show_lightbox",
            Self::VariableUpdate(_) => "variableUpdate",
            Self::HintReceived(_) => "hintReceived",
            Self::HeartbeatAck { .. } => "heartbeat_ack",
            Self::Error { .. } => "error",
        }
    }
}

/// Snapshot of one timer. `enabled` is only present for the secondary
/// timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerUpdate {
    pub remaining: u64,
    pub duration: u64,
    pub running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableUpdated {
    pub var: String,
    pub value: Value,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoundPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub text: String,
    /// Display time in seconds.
    pub duration: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightboxPayload {
    pub media_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    pub auto_close_enabled: bool,
    pub auto_close_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableChange {
    pub name: String,
    pub value: Value,
    #[serde(rename = "type")]
    pub kind: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HintReceived {
    pub message: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub source: String,
}

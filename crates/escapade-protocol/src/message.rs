//! Inbound messages: what clients send over the socket.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ClientRole, ProtocolError, RoomId, TimerKind};

/// A message from a connected client.
///
/// `#[serde(tag = "event", content = "data")]` matches the
/// `{"event": "timer_control", "data": {...}}` frames browser clients
/// emit. Room ids are optional at this level so a missing id is reported
/// back as an invalid command instead of an opaque decode failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to a room's broadcasts.
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        #[serde(default)]
        room_id: Option<RoomId>,
        #[serde(default)]
        client_type: ClientRole,
    },

    /// Unsubscribe from a room.
    #[serde(rename_all = "camelCase")]
    LeaveRoom {
        #[serde(default)]
        room_id: Option<RoomId>,
    },

    /// Control the room's `main` timer.
    TimerControl(TimerControl),

    /// Control the room's `secondary` timer.
    SecondaryTimerControl(TimerControl),

    /// Keep-alive. Echoed back with the server's clock for RTT estimates.
    #[serde(rename_all = "camelCase")]
    Heartbeat {
        #[serde(default)]
        client_time: u64,
    },
}

impl ClientMessage {
    /// Validates a timer control message.
    ///
    /// Returns `None` for messages that aren't timer controls.
    pub fn timer_command(
        &self,
    ) -> Option<Result<(TimerKind, RoomId, TimerCommand), ProtocolError>> {
        let (kind, control) = match self {
            Self::TimerControl(c) => (TimerKind::Main, c),
            Self::SecondaryTimerControl(c) => (TimerKind::Secondary, c),
            _ => return None,
        };
        Some(control.validate().map(|(room_id, cmd)| (kind, room_id, cmd)))
    }
}

/// Raw `timer_control` payload, validated into a [`TimerCommand`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerControl {
    #[serde(default)]
    pub room_id: Option<RoomId>,
    pub action: String,
    /// Seconds to add (`adjust`) or the new duration (`reset`). Accepts a
    /// JSON number or a numeric string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Value>,
}

impl TimerControl {
    /// Checks the room id, action name, and amount.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidCommand`] for a missing room id, an unknown
    /// action, or a missing/non-numeric `adjust` amount.
    pub fn validate(&self) -> Result<(RoomId, TimerCommand), ProtocolError> {
        let room_id = self
            .room_id
            .clone()
            .filter(RoomId::is_valid)
            .ok_or_else(|| ProtocolError::InvalidCommand("missing or invalid roomId".into()))?;

        let command = match self.action.as_str() {
            "start" => TimerCommand::Start,
            "pause" => TimerCommand::Pause,
            "stop" => TimerCommand::Stop,
            "adjust" => {
                let amount = self.amount.as_ref().ok_or_else(|| {
                    ProtocolError::InvalidCommand("adjust requires an amount".into())
                })?;
                TimerCommand::Adjust(parse_seconds(amount)?)
            }
            "reset" => match &self.amount {
                None | Some(Value::Null) => TimerCommand::Reset(None),
                Some(v) => TimerCommand::Reset(Some(parse_seconds(v)?)),
            },
            other => {
                return Err(ProtocolError::InvalidCommand(format!(
                    "unknown timer action '{other}'"
                )));
            }
        };

        Ok((room_id, command))
    }
}

/// A validated timer control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    Start,
    Pause,
    Stop,
    /// Seconds to add to the duration (negative to remove time).
    Adjust(i64),
    /// Reset to full duration, optionally replacing the duration.
    Reset(Option<i64>),
}

impl TimerCommand {
    pub fn name(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Stop => "stop",
            Self::Adjust(_) => "adjust",
            Self::Reset(_) => "reset",
        }
    }
}

fn parse_seconds(value: &Value) -> Result<i64, ProtocolError> {
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
        }
        _ => None,
    };
    parsed.ok_or_else(|| ProtocolError::InvalidCommand(format!("amount {value} is not numeric")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn control(room: Option<&str>, action: &str, amount: Option<Value>) -> TimerControl {
        TimerControl {
            room_id: room.map(RoomId::from),
            action: action.into(),
            amount,
        }
    }

    #[test]
    fn test_decode_join_room() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "event": "join_room",
            "data": { "roomId": "R1", "clientType": "gm" }
        }))
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::JoinRoom {
                room_id: Some(RoomId::from("R1")),
                client_type: ClientRole::GameMaster,
            }
        );
    }

    #[test]
    fn test_join_room_defaults_to_player() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "event": "join_room",
            "data": { "roomId": "R1" }
        }))
        .unwrap();
        assert!(matches!(
            msg,
            ClientMessage::JoinRoom { client_type: ClientRole::Player, .. }
        ));
    }

    #[test]
    fn test_secondary_timer_control_maps_to_secondary_kind() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "event": "secondary_timer_control",
            "data": { "roomId": "R1", "action": "pause" }
        }))
        .unwrap();
        let (kind, room, cmd) = msg.timer_command().unwrap().unwrap();
        assert_eq!(kind, TimerKind::Secondary);
        assert_eq!(room, RoomId::from("R1"));
        assert_eq!(cmd, TimerCommand::Pause);
    }

    #[test]
    fn test_heartbeat_is_not_a_timer_command() {
        let msg = ClientMessage::Heartbeat { client_time: 5 };
        assert!(msg.timer_command().is_none());
    }

    #[test]
    fn test_adjust_accepts_number_and_numeric_string() {
        let (_, cmd) = control(Some("R1"), "adjust", Some(json!(60))).validate().unwrap();
        assert_eq!(cmd, TimerCommand::Adjust(60));
        let (_, cmd) = control(Some("R1"), "adjust", Some(json!("-30"))).validate().unwrap();
        assert_eq!(cmd, TimerCommand::Adjust(-30));
    }

    #[test]
    fn test_adjust_rejects_non_numeric_amount() {
        let err = control(Some("R1"), "adjust", Some(json!("lots"))).validate().unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidCommand(_)));
        let err = control(Some("R1"), "adjust", None).validate().unwrap_err();
        assert!(err.to_string().contains("amount"));
    }

    #[test]
    fn test_reset_amount_is_optional() {
        let (_, cmd) = control(Some("R1"), "reset", None).validate().unwrap();
        assert_eq!(cmd, TimerCommand::Reset(None));
        let (_, cmd) = control(Some("R1"), "reset", Some(json!(1800))).validate().unwrap();
        assert_eq!(cmd, TimerCommand::Reset(Some(1800)));
    }

    #[test]
    fn test_missing_room_id_is_invalid() {
        let err = control(None, "start", None).validate().unwrap_err();
        assert!(err.to_string().contains("roomId"));
    }

    #[test]
    fn test_unknown_action_is_invalid() {
        let err = control(Some("R1"), "rewind", None).validate().unwrap_err();
        assert!(err.to_string().contains("rewind"));
    }
}

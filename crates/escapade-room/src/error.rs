//! Error types for the room layer.

use escapade_protocol::{RoomId, TimerKind};
use escapade_rules::RuleError;
use escapade_timer::TimerError;

use crate::StoreError;

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// No record exists for this room.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// The id can't name a room.
    #[error("invalid room id '{0}'")]
    InvalidRoomId(String),

    /// The timer isn't initialized, or is the disabled secondary timer.
    #[error("room {room_id} has no active {kind} timer")]
    TimerMissing { room_id: RoomId, kind: TimerKind },

    /// The timer refused the command.
    #[error(transparent)]
    Timer(#[from] TimerError),

    #[error("variable '{name}' already exists in room {room_id}")]
    VariableExists { room_id: RoomId, name: String },

    #[error("variable '{name}' not found in room {room_id}")]
    VariableMissing { room_id: RoomId, name: String },

    /// Derived timer variables are owned by the engine.
    #[error("variable '{0}' is read-only")]
    ReadOnlyVariable(String),

    /// A value didn't fit the variable's type.
    #[error(transparent)]
    InvalidVariable(#[from] RuleError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The room's command channel is closed.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),
}

impl RoomError {
    /// HTTP-style status code reported to clients.
    pub fn code(&self) -> u16 {
        match self {
            RoomError::InvalidRoomId(_)
            | RoomError::Timer(_)
            | RoomError::ReadOnlyVariable(_)
            | RoomError::InvalidVariable(_) => 400,
            RoomError::NotFound(_)
            | RoomError::TimerMissing { .. }
            | RoomError::VariableMissing { .. } => 404,
            RoomError::VariableExists { .. } => 409,
            RoomError::Store(_) => 500,
            RoomError::Unavailable(_) => 503,
        }
    }
}

//! Identity types shared by every Escapade layer.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Identifier of a room record.
///
/// Room ids are assigned by the record store (short random strings such
/// as `V7as_cLh2m8UX2EIrRCjh`), so this wraps a `String` rather than a
/// counter. Serialized as the bare string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Room ids end up in file names and URL paths; anything beyond
    /// ASCII alphanumerics, `-` and `_` is refused.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= 128
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a connected client (one per socket).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// TimerKind
// ---------------------------------------------------------------------------

/// Which of a room's two countdowns a command, event, or trigger is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    Main,
    Secondary,
}

impl TimerKind {
    pub const ALL: [TimerKind; 2] = [TimerKind::Main, TimerKind::Secondary];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Secondary => "secondary",
        }
    }

    /// Name of the derived variable holding this timer's elapsed seconds.
    pub fn elapsed_variable(self) -> String {
        format!("timer_{}", self.as_str())
    }

    /// Name of the derived variable holding this timer's remaining seconds.
    pub fn remaining_variable(self) -> String {
        format!("timer_{}_remaining", self.as_str())
    }
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ClientRole
// ---------------------------------------------------------------------------

/// What kind of client joined a room. Game masters additionally receive
/// the room's rule configuration on join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ClientRole {
    #[serde(rename = "gm", alias = "game_master", alias = "gamemaster", alias = "admin")]
    GameMaster,
    #[default]
    #[serde(rename = "player", alias = "display")]
    Player,
}

impl ClientRole {
    pub fn is_game_master(self) -> bool {
        matches!(self, Self::GameMaster)
    }
}

impl fmt::Display for ClientRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GameMaster => f.write_str("gm"),
            Self::Player => f.write_str("player"),
        }
    }
}

// ---------------------------------------------------------------------------
// Recipient
// ---------------------------------------------------------------------------

/// Who inside a room should receive an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// Every client joined to the room.
    All,
    /// One client, e.g. the join snapshot for a late joiner.
    Client(ClientId),
}

//! Error types for the protocol layer.

/// Errors that can occur while decoding, encoding, or validating
/// client messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Deserialization failed: malformed JSON, unknown event name, or a
    /// payload of the wrong shape.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The message decoded but is not a valid command, e.g. a timer
    /// control without a room id or with an unknown action.
    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

impl ProtocolError {
    /// HTTP-style status code reported to the issuing client.
    pub fn code(&self) -> u16 {
        match self {
            Self::Encode(_) => 500,
            Self::Decode(_) | Self::InvalidCommand(_) => 400,
        }
    }
}

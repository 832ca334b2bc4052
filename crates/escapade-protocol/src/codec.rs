//! Codec trait and implementations for serializing/deserializing messages.
//!
//! The protocol layer doesn't care how messages are serialized; the
//! connection handler only needs something implementing [`Codec`].
//! [`JsonCodec`] is the one browser clients speak.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because a single codec instance is shared by
/// every connection task of the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the bytes are malformed or
    /// don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use escapade_protocol::{ClientMessage, Codec, JsonCodec, TimerKind};
///
/// let codec = JsonCodec;
/// let raw = br#"{"event":"timer_control","data":{"roomId":"R1","action":"start"}}"#;
///
/// let msg: ClientMessage = codec.decode(raw).unwrap();
/// let (kind, room_id, command) = msg.timer_command().unwrap().unwrap();
/// assert_eq!(kind, TimerKind::Main);
/// assert_eq!(room_id.as_str(), "R1");
/// # let _ = command;
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

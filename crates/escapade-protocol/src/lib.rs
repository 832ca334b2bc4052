//! Wire protocol for Escapade.
//!
//! This crate defines what game-master and player clients exchange with
//! the room runtime:
//!
//! - **Types** ([`RoomId`], [`ClientId`], [`TimerKind`], [`ClientRole`],
//!   [`Recipient`]) — identities shared by every layer.
//! - **Inbound** ([`ClientMessage`], [`TimerControl`], [`TimerCommand`]) —
//!   what clients send over the socket.
//! - **Outbound** ([`ServerEvent`] and its payloads) — what rooms publish.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how messages become bytes.
//!
//! Every message travels as `{"event": <name>, "data": <payload>}` so
//! browser clients can dispatch on the event name directly.
//!
//! ```text
//! Transport (bytes) → Protocol (ClientMessage / ServerEvent) → Room actor
//! ```

mod codec;
mod error;
mod event;
mod message;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use event::{
    HintReceived, LightboxPayload, MessagePayload, ServerEvent, SoundPayload,
    TimerUpdate, VariableChange, VariableUpdated,
};
pub use message::{ClientMessage, TimerCommand, TimerControl};
pub use types::{ClientId, ClientRole, Recipient, RoomId, TimerKind};

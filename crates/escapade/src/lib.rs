//! # Escapade
//!
//! Room runtime engine for escape rooms.
//!
//! Each room runs two countdown timers, a set of typed variables and a
//! list of declarative rules. Game-master and player screens subscribe to
//! a room over WebSocket and receive timer snapshots, rule-driven cues
//! (sounds, messages, hints) and variable changes. Props and tooling
//! write variables over HTTP.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use escapade::prelude::*;
//!
//! # async fn run() -> Result<(), EscapadeError> {
//! let store = JsonFileStore::open("./data/rooms").await?;
//! let server = EscapadeServerBuilder::new()
//!     .ws_bind("0.0.0.0:3001")
//!     .http_bind("0.0.0.0:3000")
//!     .build(store)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
pub mod http;
mod server;

pub use error::EscapadeError;
pub use server::{EscapadeServer, EscapadeServerBuilder};

pub mod prelude {
    pub use crate::{EscapadeError, EscapadeServer, EscapadeServerBuilder};
    pub use escapade_protocol::{
        ClientId, ClientMessage, ClientRole, Codec, JsonCodec, ProtocolError, RoomId, ServerEvent,
        TimerCommand, TimerKind, TimerUpdate,
    };
    pub use escapade_room::{
        EngineConfig, JsonFileStore, MemoryStore, RoomError, RoomHandle, RoomRecord, RoomRegistry,
        RoomStore, StoreError,
    };
    pub use escapade_rules::{Action, RuleError, RuleSet, Variable, VariableType};
    pub use escapade_timer::TimerSnapshot;
    pub use escapade_transport::TransportError;
}

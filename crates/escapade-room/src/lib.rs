//! Room runtime for Escapade.
//!
//! Each active room runs as an isolated Tokio task (actor model) that
//! owns its two countdown timers, its variables, its rules and its
//! subscribers.
//!
//! # Key types
//!
//! - [`RoomRegistry`] — initializes rooms from the store, routes to them,
//!   tears them down
//! - [`RoomHandle`] — send commands to a running room actor
//! - [`RoomStore`] — where room records are read from and written to
//! - [`EngineConfig`] — engine-wide settings
//! - [`BroadcastChannel`] — a room's subscribers
//! - [`ActionDispatcher`] — turns fired rules into events and webhooks

mod channel;
mod config;
mod dispatch;
mod error;
mod persist;
mod registry;
mod room;
mod store;
mod variables;
mod webhook;

pub use channel::{BroadcastChannel, ClientSender};
pub use config::EngineConfig;
pub use dispatch::{ActionDispatcher, TRIGGER_SOURCE};
pub use error::RoomError;
pub use persist::PersistQueue;
pub use registry::RoomRegistry;
pub use room::{RoomHandle, RoomSnapshot};
pub use store::{JsonFileStore, MemoryStore, RoomRecord, RoomStore, StoreError};
pub use variables::is_timer_variable;
pub use webhook::{WebhookJob, WebhookQueue};

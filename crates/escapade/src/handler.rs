//! Per-connection handler: room membership and message routing.
//!
//! Each accepted connection gets its own Tokio task running this handler
//! plus an outbound pump task. The flow is:
//!   1. Assign a `ClientId` and an outbound queue
//!   2. Pump: drain the queue (room broadcasts and direct replies) to the socket
//!   3. Loop: receive client messages → join/leave rooms, route timer commands,
//!      answer heartbeats
//!   4. On close, leave the joined room

use std::sync::Arc;

use escapade_protocol::{ClientId, ClientMessage, Codec, RoomId, ServerEvent};
use escapade_room::{ClientSender, RoomError, RoomHandle, RoomStore};
use escapade_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc;

use crate::EscapadeError;
use crate::server::ServerState;

/// What one connection is subscribed to.
struct Session {
    client_id: ClientId,
    sender: ClientSender,
    room: Option<RoomHandle>,
}

impl Session {
    /// Queues an event for this client only.
    fn reply(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }

    fn reply_error(&self, code: u16, message: impl Into<String>) {
        self.reply(ServerEvent::error(code, message));
    }

    async fn leave_room(&mut self) {
        let Some(handle) = self.room.take() else {
            return;
        };
        let client_id = self.client_id;
        let room_id = handle.room_id();
        match handle.leave(client_id).await {
            Ok(_) => tracing::info!(%client_id, %room_id, "client left room"),
            Err(e) => tracing::debug!(%client_id, %room_id, error = %e, "leave room failed"),
        }
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<S, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<S, C>>,
) -> Result<(), EscapadeError>
where
    S: RoomStore,
    C: Codec,
{
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    let client_id = state.next_client_id();
    tracing::debug!(%conn_id, %client_id, "handling new connection");

    let (sender, outbound) = mpsc::unbounded_channel();
    let pump = tokio::spawn(pump_outbound(
        Arc::clone(&conn),
        Arc::clone(&state),
        outbound,
    ));

    let mut session = Session {
        client_id,
        sender,
        room: None,
    };

    loop {
        let data = match tokio::time::timeout(state.idle_timeout, conn.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::info!(%client_id, "connection closed cleanly");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(%client_id, error = %e, "recv error");
                break;
            }
            Err(_) => {
                tracing::info!(%client_id, "connection timed out");
                break;
            }
        };

        let message: ClientMessage = match state.codec.decode(&data) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(%client_id, error = %e, "failed to decode client message");
                session.reply_error(e.code(), e.to_string());
                continue;
            }
        };

        handle_message(&state, &mut session, message).await;
    }

    session.leave_room().await;
    drop(session);
    pump.abort();
    conn.close().await?;
    Ok(())
}

/// Writes queued events to the socket until the queue or the socket
/// closes.
async fn pump_outbound<S, C>(
    conn: Arc<WebSocketConnection>,
    state: Arc<ServerState<S, C>>,
    mut outbound: mpsc::UnboundedReceiver<ServerEvent>,
) where
    S: RoomStore,
    C: Codec,
{
    while let Some(event) = outbound.recv().await {
        let bytes = match state.codec.encode(&event) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(event = event.name(), error = %e, "failed to encode event");
                continue;
            }
        };
        if let Err(e) = conn.send(&bytes).await {
            tracing::debug!(conn_id = %conn.id(), error = %e, "send failed, stopping pump");
            break;
        }
    }
}

async fn handle_message<S, C>(
    state: &Arc<ServerState<S, C>>,
    session: &mut Session,
    message: ClientMessage,
) where
    S: RoomStore,
    C: Codec,
{
    let client_id = session.client_id;

    if let Some(command) = message.timer_command() {
        let (kind, room_id, command) = match command {
            Ok(parts) => parts,
            Err(e) => {
                tracing::debug!(%client_id, error = %e, "rejected timer control");
                session.reply_error(e.code(), e.to_string());
                return;
            }
        };
        let Some(handle) = state.registry.get(&room_id).await else {
            tracing::warn!(%client_id, %room_id, %kind, "timer control for uninitialized room");
            let e = RoomError::TimerMissing { room_id, kind };
            session.reply_error(e.code(), e.to_string());
            return;
        };
        match handle.timer(kind, command).await {
            Ok(snapshot) => tracing::debug!(
                %client_id,
                %room_id,
                %kind,
                command = command.name(),
                remaining = snapshot.remaining,
                "timer command applied"
            ),
            Err(e) => {
                tracing::debug!(%client_id, %room_id, %kind, error = %e, "timer command failed");
                session.reply_error(e.code(), e.to_string());
            }
        }
        return;
    }

    match message {
        ClientMessage::JoinRoom {
            room_id,
            client_type,
        } => {
            let Some(room_id) = room_id.filter(RoomId::is_valid) else {
                session.reply_error(400, "join_room requires a valid roomId");
                return;
            };
            let handle = match state.registry.get_or_init(&room_id).await {
                Ok(handle) => handle,
                Err(e) => {
                    tracing::debug!(%client_id, %room_id, error = %e, "join room failed");
                    session.reply_error(e.code(), e.to_string());
                    return;
                }
            };
            session.leave_room().await;
            match handle.join(client_id, client_type, session.sender.clone()).await {
                Ok(()) => {
                    tracing::info!(%client_id, %room_id, role = %client_type, "client joined room");
                    session.room = Some(handle);
                }
                Err(e) => session.reply_error(e.code(), e.to_string()),
            }
        }

        ClientMessage::LeaveRoom { room_id } => {
            let in_room = match (&session.room, &room_id) {
                (Some(handle), Some(id)) => handle.room_id() == id,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if in_room {
                session.leave_room().await;
            } else {
                tracing::debug!(%client_id, "leave_room for a room the client isn't in");
            }
        }

        ClientMessage::Heartbeat { client_time } => {
            let server_time = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0);
            session.reply(ServerEvent::HeartbeatAck {
                client_time,
                server_time,
            });
        }

        ClientMessage::TimerControl(_) | ClientMessage::SecondaryTimerControl(_) => {}
    }
}

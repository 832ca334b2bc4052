//! Write-behind persistence.
//!
//! Room actors push their latest record into the queue and never wait on
//! I/O. The worker keeps only the newest record per room and writes the
//! dirty set every `persist_interval`, on [`PersistQueue::flush`], and
//! once more when the last queue handle is dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use escapade_protocol::RoomId;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use crate::{RoomRecord, RoomStore};

enum PersistCommand {
    Save(RoomRecord),
    Flush(oneshot::Sender<()>),
}

/// Sending half of the write-behind queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PersistQueue {
    tx: mpsc::UnboundedSender<PersistCommand>,
}

impl std::fmt::Debug for PersistCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Save(r) => f.debug_tuple("Save").field(&r.id).finish(),
            Self::Flush(_) => f.write_str("Flush"),
        }
    }
}

impl PersistQueue {
    /// Starts the flush worker for `store`.
    pub fn spawn<S: RoomStore>(store: Arc<S>, interval: Duration) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(store, rx, interval));
        (Self { tx }, worker)
    }

    /// Marks `record` as the room's latest state. Replaces any pending
    /// write for the same room.
    pub fn save(&self, record: RoomRecord) {
        if self.tx.send(PersistCommand::Save(record)).is_err() {
            warn!("persistence worker stopped, dropping room write");
        }
    }

    /// Writes everything pending and waits for it.
    pub async fn flush(&self) {
        let (reply, done) = oneshot::channel();
        if self.tx.send(PersistCommand::Flush(reply)).is_ok() {
            let _ = done.await;
        }
    }
}

async fn run_worker<S: RoomStore>(
    store: Arc<S>,
    mut rx: mpsc::UnboundedReceiver<PersistCommand>,
    interval: Duration,
) {
    let mut pending: HashMap<RoomId, RoomRecord> = HashMap::new();
    let mut timer = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(PersistCommand::Save(record)) => {
                    trace!(room_id = %record.id, "room write queued");
                    pending.insert(record.id.clone(), record);
                }
                Some(PersistCommand::Flush(reply)) => {
                    write_all(store.as_ref(), &mut pending).await;
                    let _ = reply.send(());
                }
                None => break,
            },
            _ = timer.tick() => {
                if !pending.is_empty() {
                    write_all(store.as_ref(), &mut pending).await;
                }
            }
        }
    }

    write_all(store.as_ref(), &mut pending).await;
    debug!("persistence worker stopped");
}

async fn write_all<S: RoomStore>(store: &S, pending: &mut HashMap<RoomId, RoomRecord>) {
    for (room_id, record) in pending.drain() {
        match store.save(&record).await {
            Ok(()) => trace!(%room_id, "room record written"),
            Err(e) => warn!(%room_id, error = %e, "failed to persist room record"),
        }
    }
}

//! Room registry: initializes, tracks and tears down room actors.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError};

use escapade_protocol::RoomId;
use escapade_rules::{Variable, VariableType};
use escapade_timer::{Clock, MonotonicClock};
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::room::spawn_room;
use crate::variables;
use crate::{EngineConfig, PersistQueue, RoomError, RoomHandle, RoomRecord, RoomStore, WebhookQueue};

type Gates = std::sync::Mutex<HashMap<RoomId, Arc<Mutex<()>>>>;

/// All active rooms of one process.
///
/// A room becomes active (its timers are created from the stored record)
/// the first time a client joins it, and stays active until it is torn
/// down. Variable reads and writes for rooms that aren't active go
/// straight to the store.
///
/// The room map is only locked for lookups. Anything that touches the
/// store for a room (initialization, teardown with its final flush,
/// writes to an inactive room) runs under that room's own gate, so rooms
/// never wait on each other's I/O.
pub struct RoomRegistry<S: RoomStore> {
    rooms: Mutex<HashMap<RoomId, RoomHandle>>,
    gates: Arc<Gates>,
    store: Arc<S>,
    config: EngineConfig,
    persist: PersistQueue,
    webhooks: WebhookQueue,
    clock: Arc<dyn Clock>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: RoomStore> RoomRegistry<S> {
    /// Creates an empty registry and starts the persistence and webhook
    /// workers. Must be called inside a Tokio runtime.
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        let config = config.validated();
        let (persist, persist_worker) = PersistQueue::spawn(Arc::clone(&store), config.persist_interval);
        let (webhooks, webhook_worker) = WebhookQueue::spawn(&config);
        Self::with_queues(store, config, persist, webhooks, vec![persist_worker, webhook_worker])
    }

    /// Creates a registry around caller-provided queues, e.g. a detached
    /// [`WebhookQueue`] whose jobs a test inspects.
    pub fn with_queues(
        store: Arc<S>,
        config: EngineConfig,
        persist: PersistQueue,
        webhooks: WebhookQueue,
        workers: Vec<JoinHandle<()>>,
    ) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            gates: Arc::default(),
            store,
            config: config.validated(),
            persist,
            webhooks,
            clock: Arc::new(MonotonicClock),
            workers: Mutex::new(workers),
        }
    }

    /// Replaces the clock rooms read remaining time from. Only rooms
    /// initialized afterwards use it.
    ///
    /// Tick wake-ups still follow the Tokio timer; the clock decides how
    /// much time each tick accounts for.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the room's actor, initializing it from the store on first
    /// use.
    pub async fn get_or_init(&self, room_id: &RoomId) -> Result<RoomHandle, RoomError> {
        if !room_id.is_valid() {
            return Err(RoomError::InvalidRoomId(room_id.to_string()));
        }
        if let Some(handle) = self.get(room_id).await {
            return Ok(handle);
        }

        let _gate = self.lock_room(room_id).await;
        // Another caller may have initialized it while we waited.
        if let Some(handle) = self.get(room_id).await {
            return Ok(handle);
        }

        let record = self.load(room_id).await?;
        let handle = spawn_room(
            record,
            &self.config,
            self.persist.clone(),
            self.webhooks.clone(),
            Arc::clone(&self.clock),
        );
        let mut rooms = self.rooms.lock().await;
        if rooms.insert(room_id.clone(), handle.clone()).is_some() {
            debug!(%room_id, "room actor gone, reinitialized");
        }
        info!(%room_id, active = rooms.len(), "room timers initialized");
        Ok(handle)
    }

    /// The room's actor if it is active.
    pub async fn get(&self, room_id: &RoomId) -> Option<RoomHandle> {
        self.rooms
            .lock()
            .await
            .get(room_id)
            .filter(|h| !h.is_closed())
            .cloned()
    }

    pub async fn active_rooms(&self) -> Vec<RoomId> {
        self.rooms.lock().await.keys().cloned().collect()
    }

    /// Every variable of a room.
    pub async fn variables(&self, room_id: &RoomId) -> Result<BTreeMap<String, Variable>, RoomError> {
        if let Some(handle) = self.get(room_id).await {
            return handle.variables().await;
        }
        let _gate = self.lock_room(room_id).await;
        if let Some(handle) = self.get(room_id).await {
            return handle.variables().await;
        }
        Ok(self.load(room_id).await?.variables)
    }

    /// Adds a variable to a room. 409 if the name is taken.
    pub async fn create_variable(
        &self,
        room_id: &RoomId,
        name: String,
        kind: VariableType,
        value: Value,
    ) -> Result<Variable, RoomError> {
        if let Some(handle) = self.get(room_id).await {
            return handle.create_variable(name, kind, value).await;
        }
        let _gate = self.lock_room(room_id).await;
        if let Some(handle) = self.get(room_id).await {
            return handle.create_variable(name, kind, value).await;
        }
        let mut record = self.load(room_id).await?;
        let variable = variables::create(&mut record.variables, room_id, &name, kind, &value)?;
        self.store.save(&record).await?;
        info!(%room_id, variable = %name, %kind, "variable created in stored room");
        Ok(variable)
    }

    /// Writes a room variable.
    ///
    /// For an active room this publishes `variable_updated` and runs the
    /// variable rules. An inactive room has no subscribers or rules
    /// loaded, so only the stored record changes.
    pub async fn write_variable(
        &self,
        room_id: &RoomId,
        name: String,
        value: Value,
        kind: Option<VariableType>,
    ) -> Result<Variable, RoomError> {
        if let Some(handle) = self.get(room_id).await {
            return handle.write_variable(name, value, kind).await;
        }
        let _gate = self.lock_room(room_id).await;
        if let Some(handle) = self.get(room_id).await {
            return handle.write_variable(name, value, kind).await;
        }
        let mut record = self.load(room_id).await?;
        let variable = variables::update(&mut record.variables, room_id, &name, &value, kind)?;
        self.store.save(&record).await?;
        debug!(%room_id, variable = %name, "variable written to stored room");
        Ok(variable)
    }

    /// Tears down a room's timers and drops its actor. Returns `false` if
    /// the room wasn't active.
    ///
    /// The room stays gated until its final record is flushed, so a join
    /// arriving mid-teardown initializes from the up-to-date record.
    pub async fn teardown(&self, room_id: &RoomId) -> bool {
        let _gate = self.lock_room(room_id).await;
        let Some(handle) = self.rooms.lock().await.remove(room_id) else {
            return false;
        };
        let _ = handle.teardown().await;
        self.persist.flush().await;
        info!(%room_id, "room torn down");
        true
    }

    /// Tears down every room and writes everything pending.
    pub async fn shutdown(&self) {
        let handles: Vec<RoomHandle> = self.rooms.lock().await.drain().map(|(_, h)| h).collect();
        for handle in &handles {
            let _ = handle.teardown().await;
        }
        self.persist.flush().await;
        info!(rooms = handles.len(), "room registry shut down");
    }

    /// Shuts down and waits for the background workers to finish.
    /// Consumes the registry so its queue handles are released.
    pub async fn close(self) {
        self.shutdown().await;
        let workers = std::mem::take(&mut *self.workers.lock().await);
        drop(self);
        for worker in workers {
            let _ = worker.await;
        }
    }

    /// Waits for exclusive use of one room's store-backed state.
    async fn lock_room(&self, room_id: &RoomId) -> RoomGate {
        let gate = {
            let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(gates.entry(room_id.clone()).or_default())
        };
        RoomGate {
            guard: Some(gate.lock_owned().await),
            room_id: room_id.clone(),
            gates: Arc::clone(&self.gates),
        }
    }

    async fn load(&self, room_id: &RoomId) -> Result<RoomRecord, RoomError> {
        if !room_id.is_valid() {
            return Err(RoomError::InvalidRoomId(room_id.to_string()));
        }
        self.store
            .load(room_id)
            .await?
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))
    }
}

/// Held while a room's store-backed state is being changed. Dropping the
/// last holder forgets the room's gate.
struct RoomGate {
    guard: Option<OwnedMutexGuard<()>>,
    room_id: RoomId,
    gates: Arc<Gates>,
}

impl Drop for RoomGate {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        // Waiters clone the gate under this same lock, so a count of one
        // means nobody else is holding or queued on it.
        if gates.get(&self.room_id).is_some_and(|g| Arc::strong_count(g) == 1) {
            gates.remove(&self.room_id);
        }
    }
}

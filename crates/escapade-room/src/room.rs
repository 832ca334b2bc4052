//! Room actor: an isolated Tokio task that owns one room's runtime state.
//!
//! The actor owns both timers and their tickers, the trigger evaluator,
//! the variables, and the broadcast channel. Commands arrive over a
//! bounded mpsc channel; ticks arrive from the tickers. Both are handled
//! to completion one at a time in the same `select!` loop, so nothing in
//! here needs a lock.

use std::collections::BTreeMap;
use std::sync::Arc;

use escapade_protocol::{
    ClientId, ClientRole, Recipient, RoomId, ServerEvent, TimerCommand, TimerKind, TimerUpdate,
    VariableUpdated,
};
use escapade_rules::{RuleSet, TriggerEvaluator, Variable, VariableType};
use escapade_timer::{Clock, TickInfo, Ticker, TimerSnapshot, TimerState};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::variables;
use crate::{
    ActionDispatcher, BroadcastChannel, ClientSender, EngineConfig, PersistQueue, RoomError,
    RoomRecord, WebhookQueue,
};

/// Commands sent to a room actor through its channel.
pub(crate) enum RoomCommand {
    Join {
        client_id: ClientId,
        role: ClientRole,
        sender: ClientSender,
        reply: oneshot::Sender<()>,
    },
    Leave {
        client_id: ClientId,
        reply: oneshot::Sender<bool>,
    },
    Timer {
        kind: TimerKind,
        command: TimerCommand,
        reply: oneshot::Sender<Result<TimerSnapshot, RoomError>>,
    },
    Variables {
        reply: oneshot::Sender<BTreeMap<String, Variable>>,
    },
    CreateVariable {
        name: String,
        kind: VariableType,
        value: Value,
        reply: oneshot::Sender<Result<Variable, RoomError>>,
    },
    WriteVariable {
        name: String,
        value: Value,
        kind: Option<VariableType>,
        reply: oneshot::Sender<Result<Variable, RoomError>>,
    },
    Snapshot {
        reply: oneshot::Sender<RoomSnapshot>,
    },
    Teardown {
        reply: oneshot::Sender<()>,
    },
}

/// A point-in-time view of a room.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub main: TimerSnapshot,
    pub secondary: TimerSnapshot,
    pub clients: usize,
    /// Time-trigger keys spent in the current timer lifetime.
    pub fired_keys: usize,
}

/// Handle to a running room actor. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    sender: mpsc::Sender<RoomCommand>,
}

impl std::fmt::Debug for RoomCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Join { .. } => "Join",
            Self::Leave { .. } => "Leave",
            Self::Timer { .. } => "Timer",
            Self::Variables { .. } => "Variables",
            Self::CreateVariable { .. } => "CreateVariable",
            Self::WriteVariable { .. } => "WriteVariable",
            Self::Snapshot { .. } => "Snapshot",
            Self::Teardown { .. } => "Teardown",
        };
        f.write_str(name)
    }
}

impl RoomHandle {
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// `true` once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Subscribes a client. It receives `room_joined`, both timer
    /// snapshots and, for game masters, `room_config`.
    pub async fn join(
        &self,
        client_id: ClientId,
        role: ClientRole,
        sender: ClientSender,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Join {
            client_id,
            role,
            sender,
            reply,
        })
        .await
    }

    /// Unsubscribes a client. Timers are not affected.
    pub async fn leave(&self, client_id: ClientId) -> Result<bool, RoomError> {
        self.request(|reply| RoomCommand::Leave { client_id, reply })
            .await
    }

    /// Applies a control command to one timer. When this returns, the
    /// timer's tick schedule already reflects the command.
    pub async fn timer(
        &self,
        kind: TimerKind,
        command: TimerCommand,
    ) -> Result<TimerSnapshot, RoomError> {
        self.request(|reply| RoomCommand::Timer {
            kind,
            command,
            reply,
        })
        .await?
    }

    /// Every variable, including the timer-derived ones.
    pub async fn variables(&self) -> Result<BTreeMap<String, Variable>, RoomError> {
        self.request(|reply| RoomCommand::Variables { reply }).await
    }

    pub async fn create_variable(
        &self,
        name: String,
        kind: VariableType,
        value: Value,
    ) -> Result<Variable, RoomError> {
        self.request(|reply| RoomCommand::CreateVariable {
            name,
            kind,
            value,
            reply,
        })
        .await?
    }

    /// Writes a variable, publishes `variable_updated` and runs the
    /// variable-condition rules.
    pub async fn write_variable(
        &self,
        name: String,
        value: Value,
        kind: Option<VariableType>,
    ) -> Result<Variable, RoomError> {
        self.request(|reply| RoomCommand::WriteVariable {
            name,
            value,
            kind,
            reply,
        })
        .await?
    }

    pub async fn snapshot(&self) -> Result<RoomSnapshot, RoomError> {
        self.request(|reply| RoomCommand::Snapshot { reply }).await
    }

    /// Stops both timers, writes the record and ends the actor.
    pub async fn teardown(&self) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Teardown { reply }).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))
    }
}

/// One countdown and the ticker driving it.
struct TimerSlot {
    state: TimerState,
    ticker: Ticker,
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor {
    room_id: RoomId,
    record: RoomRecord,
    main: TimerSlot,
    secondary: TimerSlot,
    /// `timer_<kind>` and `timer_<kind>_remaining`. Not persisted.
    derived: BTreeMap<String, Variable>,
    evaluator: TriggerEvaluator,
    channel: BroadcastChannel,
    dispatcher: ActionDispatcher,
    persist: PersistQueue,
    clear_triggers_on_reset: bool,
    clock: Arc<dyn Clock>,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    /// Runs the actor loop until teardown or until every handle is gone.
    async fn run(mut self) {
        info!(room_id = %self.room_id, "room actor started");

        loop {
            tokio::select! {
                biased;

                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => {
                        if !self.handle_command(cmd) {
                            break;
                        }
                    }
                    None => {
                        self.teardown();
                        break;
                    }
                },
                tick = self.main.ticker.wait_for_tick() => self.on_tick(TimerKind::Main, tick),
                tick = self.secondary.ticker.wait_for_tick() => self.on_tick(TimerKind::Secondary, tick),
            }
        }

        info!(room_id = %self.room_id, "room actor stopped");
    }

    /// Returns `false` when the actor should stop.
    fn handle_command(&mut self, cmd: RoomCommand) -> bool {
        match cmd {
            RoomCommand::Join {
                client_id,
                role,
                sender,
                reply,
            } => {
                self.handle_join(client_id, role, sender);
                let _ = reply.send(());
            }
            RoomCommand::Leave { client_id, reply } => {
                let removed = self.channel.leave(client_id);
                debug!(room_id = %self.room_id, %client_id, removed, "client left");
                let _ = reply.send(removed);
            }
            RoomCommand::Timer {
                kind,
                command,
                reply,
            } => {
                let _ = reply.send(self.handle_timer(kind, command));
            }
            RoomCommand::Variables { reply } => {
                let mut all = self.record.variables.clone();
                all.extend(self.derived.clone());
                let _ = reply.send(all);
            }
            RoomCommand::CreateVariable {
                name,
                kind,
                value,
                reply,
            } => {
                let result =
                    variables::create(&mut self.record.variables, &self.room_id, &name, kind, &value);
                if result.is_ok() {
                    info!(room_id = %self.room_id, variable = %name, %kind, "variable created");
                    self.persist.save(self.record.clone());
                }
                let _ = reply.send(result);
            }
            RoomCommand::WriteVariable {
                name,
                value,
                kind,
                reply,
            } => {
                let _ = reply.send(self.handle_write(&name, &value, kind));
            }
            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(RoomSnapshot {
                    room_id: self.room_id.clone(),
                    main: self.main.state.snapshot(),
                    secondary: self.secondary.state.snapshot(),
                    clients: self.channel.len(),
                    fired_keys: self.evaluator.fired().len(),
                });
            }
            RoomCommand::Teardown { reply } => {
                self.teardown();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn handle_join(&mut self, client_id: ClientId, role: ClientRole, sender: ClientSender) {
        self.channel.join(client_id, sender);
        info!(
            room_id = %self.room_id,
            %client_id,
            %role,
            clients = self.channel.len(),
            "client joined"
        );

        let to = Recipient::Client(client_id);
        self.channel.deliver(
            to.clone(),
            ServerEvent::RoomJoined {
                room_id: self.room_id.clone(),
                client_id,
            },
        );
        for kind in TimerKind::ALL {
            let snapshot = self.slot(kind).state.snapshot();
            self.channel
                .deliver(to.clone(), ServerEvent::timer_update(kind, timer_update(kind, snapshot)));
        }
        if role.is_game_master() {
            self.channel.deliver(
                to,
                ServerEvent::RoomConfig {
                    config: self.record.config.clone(),
                },
            );
        }
    }

    fn handle_timer(
        &mut self,
        kind: TimerKind,
        command: TimerCommand,
    ) -> Result<TimerSnapshot, RoomError> {
        let now = self.clock.now();
        let room_id = self.room_id.clone();
        let slot = self.slot_mut(kind);
        if !slot.state.is_enabled() {
            warn!(room_id = %room_id, %kind, command = command.name(), "timer not available");
            return Err(RoomError::TimerMissing { room_id, kind });
        }

        let changed = match command {
            TimerCommand::Start => match slot.state.start(now) {
                Some(anchor) => {
                    slot.ticker.arm(anchor, now);
                    true
                }
                None => false,
            },
            TimerCommand::Pause => {
                let paused = slot.state.pause();
                slot.ticker.disarm();
                paused
            }
            TimerCommand::Stop => {
                slot.state.stop();
                slot.ticker.disarm();
                true
            }
            TimerCommand::Adjust(amount) => {
                slot.state.adjust(amount, now)?;
                true
            }
            TimerCommand::Reset(duration) => {
                slot.state.reset(duration);
                slot.ticker.disarm();
                true
            }
        };
        let snapshot = slot.state.snapshot();

        if matches!(command, TimerCommand::Reset(_)) && self.clear_triggers_on_reset {
            self.evaluator.clear_fired();
        }
        if matches!(command, TimerCommand::Adjust(_) | TimerCommand::Reset(_)) {
            self.record.timer_duration = Some(self.main.state.duration());
            self.record.secondary_timer_duration = Some(self.secondary.state.duration());
            self.persist.save(self.record.clone());
        }
        if changed {
            self.channel
                .publish(ServerEvent::timer_update(kind, timer_update(kind, snapshot)));
        }

        info!(
            room_id = %self.room_id,
            %kind,
            command = command.name(),
            remaining = snapshot.remaining,
            duration = snapshot.duration,
            running = snapshot.running,
            "timer command applied"
        );
        Ok(snapshot)
    }

    fn handle_write(
        &mut self,
        name: &str,
        value: &Value,
        kind: Option<VariableType>,
    ) -> Result<Variable, RoomError> {
        let variable = variables::update(&mut self.record.variables, &self.room_id, name, value, kind)?;
        debug!(room_id = %self.room_id, variable = name, value = %variable.value, "variable written");

        self.channel.publish(ServerEvent::VariableUpdated(VariableUpdated {
            var: name.to_string(),
            value: variable.value.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }));
        let fired = self.evaluator.variable_pass(name, &variable);
        self.dispatcher.dispatch_all(fired, &mut self.channel);
        self.persist.save(self.record.clone());
        Ok(variable)
    }

    fn on_tick(&mut self, kind: TimerKind, tick: TickInfo) {
        let now = self.clock.now();
        let slot = self.slot_mut(kind);
        let Some(outcome) = slot.state.tick(now) else {
            // A tick can't outlive its timer; keep the invariant anyway.
            slot.ticker.disarm();
            return;
        };
        let snapshot = slot.state.snapshot();
        trace!(
            room_id = %self.room_id,
            %kind,
            remaining = outcome.remaining,
            skipped = tick.ticks_skipped,
            "tick"
        );

        self.channel
            .publish(ServerEvent::timer_update(kind, timer_update(kind, snapshot)));

        let fired = self.evaluator.time_pass(kind, outcome.crossed.clone());
        self.dispatcher.dispatch_all(fired, &mut self.channel);

        self.write_timer_variable(kind.elapsed_variable(), outcome.elapsed);
        self.write_timer_variable(kind.remaining_variable(), outcome.remaining);

        if outcome.completed {
            info!(room_id = %self.room_id, %kind, "timer complete");
            self.channel.publish(ServerEvent::timer_complete(kind));
        }

        let slot = self.slot_mut(kind);
        slot.ticker.record_tick_end();
        if outcome.completed {
            slot.ticker.disarm();
        }
    }

    /// Sets a derived timer variable and runs its rules. These change
    /// every second, so no `variable_updated` is published for them.
    fn write_timer_variable(&mut self, name: String, seconds: u64) {
        let variable = Variable {
            kind: VariableType::Integer,
            value: Value::from(seconds),
        };
        let fired = self.evaluator.variable_pass(&name, &variable);
        self.derived.insert(name, variable);
        self.dispatcher.dispatch_all(fired, &mut self.channel);
    }

    fn teardown(&mut self) {
        self.main.ticker.disarm();
        self.secondary.ticker.disarm();
        self.main.state.pause();
        self.secondary.state.pause();
        self.evaluator.clear_fired();
        self.persist.save(self.record.clone());
        info!(room_id = %self.room_id, clients = self.channel.len(), "room torn down");
    }

    fn slot(&self, kind: TimerKind) -> &TimerSlot {
        match kind {
            TimerKind::Main => &self.main,
            TimerKind::Secondary => &self.secondary,
        }
    }

    fn slot_mut(&mut self, kind: TimerKind) -> &mut TimerSlot {
        match kind {
            TimerKind::Main => &mut self.main,
            TimerKind::Secondary => &mut self.secondary,
        }
    }
}

/// Wire form of a timer snapshot. Only the secondary timer reports
/// `enabled`.
fn timer_update(kind: TimerKind, snapshot: TimerSnapshot) -> TimerUpdate {
    TimerUpdate {
        remaining: snapshot.remaining,
        duration: snapshot.duration,
        running: snapshot.running,
        enabled: (kind == TimerKind::Secondary).then_some(snapshot.enabled),
    }
}

/// Spawns a room actor for `record` and returns a handle to it.
pub(crate) fn spawn_room(
    record: RoomRecord,
    config: &EngineConfig,
    persist: PersistQueue,
    webhooks: WebhookQueue,
    clock: Arc<dyn Clock>,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(config.command_channel_size);
    let room_id = record.id.clone();

    let main = TimerState::new(record.timer_duration.unwrap_or(config.default_main_duration));
    let secondary = TimerState::new(
        record
            .secondary_timer_duration
            .unwrap_or(config.default_secondary_duration),
    )
    .with_enabled(record.secondary_timer_enabled);

    let mut derived = BTreeMap::new();
    for (kind, state) in [(TimerKind::Main, &main), (TimerKind::Secondary, &secondary)] {
        derived.insert(kind.elapsed_variable(), Variable::inferred(Value::from(state.elapsed())));
        derived.insert(
            kind.remaining_variable(),
            Variable::inferred(Value::from(state.remaining())),
        );
    }

    let rules = RuleSet::from_config(&record.config);
    debug!(room_id = %room_id, rules = rules.len(), "room rules loaded");

    let actor = RoomActor {
        room_id: room_id.clone(),
        main: TimerSlot {
            state: main,
            ticker: Ticker::new(config.tick_config()),
        },
        secondary: TimerSlot {
            state: secondary,
            ticker: Ticker::new(config.tick_config()),
        },
        derived,
        evaluator: TriggerEvaluator::new(rules),
        channel: BroadcastChannel::new(),
        dispatcher: ActionDispatcher::new(room_id.clone(), webhooks),
        persist,
        clear_triggers_on_reset: config.clear_triggers_on_reset,
        clock,
        record,
        receiver: rx,
    };

    tokio::spawn(actor.run());

    RoomHandle {
        room_id,
        sender: tx,
    }
}

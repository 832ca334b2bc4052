//! Decides which actions fire for a tick or a variable write.

use std::collections::HashSet;
use std::ops::RangeInclusive;

use escapade_protocol::TimerKind;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::{Action, Condition, RuleSet, Variable};

/// Dedup marker for a time trigger: `(timeSeconds, action tag)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FiredKey {
    pub time_seconds: u64,
    pub action: String,
}

/// Time-trigger keys already dispatched in a room's current timer
/// lifetime. Shared by both timer kinds of the room.
#[derive(Debug, Clone, Default)]
pub struct FiredKeys(HashSet<FiredKey>);

impl FiredKeys {
    /// Marks `key` as fired. Returns `false` if it already was.
    pub fn insert(&mut self, key: FiredKey) -> bool {
        self.0.insert(key)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Why an action fired. Attached to webhook bodies.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerContext {
    Time {
        timer: TimerKind,
        #[serde(rename = "timeSeconds")]
        time_seconds: u64,
    },
    Variable {
        variable: String,
        value: Value,
        condition: Condition,
    },
}

/// One action to dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Fired {
    pub action: Action,
    pub context: TriggerContext,
}

/// A room's rules plus its fired-key set.
///
/// Owned by the room actor, so it needs no interior locking.
#[derive(Debug, Clone, Default)]
pub struct TriggerEvaluator {
    rules: RuleSet,
    fired: FiredKeys,
}

impl TriggerEvaluator {
    pub fn new(rules: RuleSet) -> Self {
        Self {
            rules,
            fired: FiredKeys::default(),
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn fired(&self) -> &FiredKeys {
        &self.fired
    }

    /// Forgets every fired key, re-arming all time triggers.
    pub fn clear_fired(&mut self) {
        self.fired.clear();
    }

    /// Time-threshold pass for one tick of `kind`.
    ///
    /// `crossed` holds every remaining-seconds value the tick accounts
    /// for; normally one, more after a scheduler stall. Values are
    /// visited from highest to lowest so actions come out in countdown
    /// order. Each `(timeSeconds, action)` key fires at most once.
    pub fn time_pass(&mut self, kind: TimerKind, crossed: RangeInclusive<u64>) -> Vec<Fired> {
        let mut out = Vec::new();
        if self.rules.time_triggers().is_empty() {
            return out;
        }
        for remaining in crossed.rev() {
            for trigger in self.rules.time_triggers() {
                if trigger.time_seconds != remaining || !trigger.applies_to(kind) {
                    continue;
                }
                let key = FiredKey {
                    time_seconds: trigger.time_seconds,
                    action: trigger.action.tag().to_string(),
                };
                if !self.fired.insert(key) {
                    continue;
                }
                debug!(
                    kind = %kind,
                    time_seconds = remaining,
                    action = trigger.action.tag(),
                    "time trigger fired"
                );
                out.push(Fired {
                    action: trigger.action.clone(),
                    context: TriggerContext::Time {
                        timer: kind,
                        time_seconds: remaining,
                    },
                });
            }
        }
        out
    }

    /// Variable-condition pass for one write of `name`. Every matching
    /// trigger fires, every time; actions keep declaration order.
    pub fn variable_pass(&self, name: &str, variable: &Variable) -> Vec<Fired> {
        let mut out = Vec::new();
        for trigger in self.rules.triggers_for(name) {
            if !trigger.matches(variable) {
                continue;
            }
            debug!(
                variable = name,
                condition = ?trigger.condition,
                actions = trigger.actions.len(),
                "variable trigger fired"
            );
            out.extend(trigger.actions.iter().map(|action| Fired {
                action: action.clone(),
                context: TriggerContext::Variable {
                    variable: name.to_string(),
                    value: variable.value.clone(),
                    condition: trigger.condition,
                },
            }));
        }
        out
    }
}

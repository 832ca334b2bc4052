//! Trigger declarations and the tolerant config loader.

use std::collections::HashMap;

use escapade_protocol::TimerKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::{Action, RuleError, Variable};

/// Comparator of a [`VariableTrigger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    #[serde(alias = "eq", alias = "==")]
    Equals,
    #[serde(alias = "neq", alias = "!=")]
    NotEquals,
    #[serde(alias = "gt", alias = ">")]
    GreaterThan,
    #[serde(alias = "lt", alias = "<")]
    LessThan,
}

impl Condition {
    /// Evaluates `variable <condition> expected`.
    ///
    /// Equality coerces `expected` to the variable's type first; ordering
    /// is numeric and false whenever either side isn't a number.
    pub fn holds(self, variable: &Variable, expected: &Value) -> bool {
        use std::cmp::Ordering;
        match self {
            Condition::Equals => variable.equals(expected),
            Condition::NotEquals => !variable.equals(expected),
            Condition::GreaterThan => variable.compare_numeric(expected) == Some(Ordering::Greater),
            Condition::LessThan => variable.compare_numeric(expected) == Some(Ordering::Less),
        }
    }
}

/// Fires once when a timer's remaining seconds reach `time_seconds`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeTrigger {
    pub time_seconds: u64,
    /// Restricts the trigger to one timer. `None` watches both.
    pub timer: Option<TimerKind>,
    pub action: Action,
}

impl TimeTrigger {
    /// Parses a declaration like
    /// `{"timeSeconds": 60, "action": "send_hint", "message": "halfway"}`.
    pub fn from_value(value: &Value) -> Result<Self, RuleError> {
        let obj = as_object(value, "time trigger")?;
        let time_seconds = obj
            .get("timeSeconds")
            .or_else(|| obj.get("time_seconds"))
            .ok_or(RuleError::MissingField("timeSeconds"))
            .and_then(|v| {
                as_seconds(v).ok_or_else(|| {
                    RuleError::InvalidShape(format!("timeSeconds must be a non-negative integer, got {v}"))
                })
            })?;
        let timer = match obj.get("timer") {
            None | Some(Value::Null) => None,
            Some(v) => Some(TimerKind::deserialize(v).map_err(|_| {
                RuleError::InvalidShape(format!("timer must be \"main\" or \"secondary\", got {v}"))
            })?),
        };
        Ok(Self {
            time_seconds,
            timer,
            action: Action::from_value(value)?,
        })
    }

    /// Whether this trigger watches the given timer.
    pub fn applies_to(&self, kind: TimerKind) -> bool {
        self.timer.is_none_or(|t| t == kind)
    }
}

/// Fires every time `variable_name` is written with a value satisfying
/// `condition` against `comparison_value`.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableTrigger {
    pub variable_name: String,
    pub condition: Condition,
    pub comparison_value: Value,
    pub actions: Vec<Action>,
}

impl VariableTrigger {
    /// Parses a declaration. Malformed entries in `actions` are dropped
    /// with a warning; the rest of the list is kept in order.
    pub fn from_value(value: &Value) -> Result<Self, RuleError> {
        let obj = as_object(value, "variable trigger")?;
        let variable_name = obj
            .get("variableName")
            .or_else(|| obj.get("variable"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or(RuleError::MissingField("variableName"))?
            .to_string();
        let condition = obj
            .get("condition")
            .ok_or(RuleError::MissingField("condition"))
            .and_then(|v| {
                Condition::deserialize(v)
                    .map_err(|_| RuleError::InvalidShape(format!("unknown condition {v}")))
            })?;
        let comparison_value = obj
            .get("comparisonValue")
            .or_else(|| obj.get("value"))
            .cloned()
            .ok_or(RuleError::MissingField("comparisonValue"))?;

        let actions = match obj.get("actions") {
            Some(Value::Array(list)) => list
                .iter()
                .filter_map(|a| match Action::from_value(a) {
                    Ok(action) => Some(action),
                    Err(e) => {
                        warn!(variable = %variable_name, error = %e, "skipping malformed action");
                        None
                    }
                })
                .collect(),
            Some(other) => {
                return Err(RuleError::InvalidShape(format!(
                    "actions must be an array, got {other}"
                )));
            }
            // Single inline action: `{"variableName": .., "type": "send_hint", ..}`.
            None => vec![Action::from_value(value)?],
        };

        Ok(Self {
            variable_name,
            condition,
            comparison_value,
            actions,
        })
    }

    pub fn matches(&self, variable: &Variable) -> bool {
        self.condition.holds(variable, &self.comparison_value)
    }
}

/// A room's parsed rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    time_triggers: Vec<TimeTrigger>,
    /// Keyed by variable name, declaration order kept per name.
    variable_triggers: HashMap<String, Vec<VariableTrigger>>,
}

impl RuleSet {
    /// Builds a rule set from a room's config blob.
    ///
    /// Never fails. The blob may be an object or a JSON string holding
    /// one. An absent or non-array section is empty and a malformed entry
    /// is skipped; both are logged at `warn`.
    pub fn from_config(config: &Value) -> Self {
        let parsed;
        let config = match config {
            Value::String(text) => match serde_json::from_str::<Value>(text) {
                Ok(v) => {
                    parsed = v;
                    &parsed
                }
                Err(e) => {
                    warn!(error = %e, "room config is not valid JSON, no rules loaded");
                    return Self::default();
                }
            },
            Value::Null => return Self::default(),
            other => other,
        };
        let Some(obj) = config.as_object() else {
            warn!("room config is not an object, no rules loaded");
            return Self::default();
        };

        let mut rules = Self::default();
        for entry in section(obj, "timeTriggers", "time_triggers") {
            match TimeTrigger::from_value(entry) {
                Ok(t) => rules.time_triggers.push(t),
                Err(e) => warn!(error = %e, entry = %entry, "skipping malformed time trigger"),
            }
        }
        for entry in section(obj, "variableTriggers", "variable_triggers") {
            match VariableTrigger::from_value(entry) {
                Ok(t) => rules.push_variable_trigger(t),
                Err(e) => warn!(error = %e, entry = %entry, "skipping malformed variable trigger"),
            }
        }
        rules
    }

    pub fn push_variable_trigger(&mut self, trigger: VariableTrigger) {
        self.variable_triggers
            .entry(trigger.variable_name.clone())
            .or_default()
            .push(trigger);
    }

    pub fn time_triggers(&self) -> &[TimeTrigger] {
        &self.time_triggers
    }

    /// Triggers bound to one variable, in declaration order.
    pub fn triggers_for(&self, name: &str) -> &[VariableTrigger] {
        self.variable_triggers
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.time_triggers.is_empty() && self.variable_triggers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.time_triggers.len() + self.variable_triggers.values().map(Vec::len).sum::<usize>()
    }
}

fn section<'a>(obj: &'a Map<String, Value>, key: &str, alt: &str) -> &'a [Value] {
    match obj.get(key).or_else(|| obj.get(alt)) {
        None | Some(Value::Null) => &[],
        Some(Value::Array(list)) => list,
        Some(other) => {
            warn!(section = key, value = %other, "trigger section is not an array, ignoring");
            &[]
        }
    }
}

fn as_object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>, RuleError> {
    value
        .as_object()
        .ok_or_else(|| RuleError::InvalidShape(format!("{what} must be an object, got {value}")))
}

fn as_seconds(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::VariableType;

    #[test]
    fn test_time_trigger_parses_inline_action() {
        let t = TimeTrigger::from_value(&json!({
            "timeSeconds": 60, "action": "send_hint", "message": "halfway"
        }))
        .unwrap();
        assert_eq!(t.time_seconds, 60);
        assert_eq!(t.timer, None);
        assert_eq!(t.action.tag(), "send_hint");
        assert!(t.applies_to(TimerKind::Main));
        assert!(t.applies_to(TimerKind::Secondary));
    }

    #[test]
    fn test_time_trigger_timer_filter() {
        let t = TimeTrigger::from_value(&json!({
            "timeSeconds": "30", "timer": "secondary", "action": "play_sound", "soundId": "tick"
        }))
        .unwrap();
        assert_eq!(t.time_seconds, 30);
        assert!(!t.applies_to(TimerKind::Main));
        assert!(t.applies_to(TimerKind::Secondary));
    }

    #[test]
    fn test_time_trigger_rejects_negative_seconds() {
        assert!(TimeTrigger::from_value(&json!({"timeSeconds": -1, "action": "send_hint", "message": "x"})).is_err());
    }

    #[test]
    fn test_variable_trigger_aliases_and_inline_action() {
        let t = VariableTrigger::from_value(&json!({
            "variable": "door_open", "condition": "==", "value": "true",
            "type": "send_hint", "message": "door!"
        }))
        .unwrap();
        assert_eq!(t.variable_name, "door_open");
        assert_eq!(t.condition, Condition::Equals);
        assert_eq!(t.actions.len(), 1);
    }

    #[test]
    fn test_variable_trigger_skips_bad_actions_in_list() {
        let t = VariableTrigger::from_value(&json!({
            "variableName": "score", "condition": "greater_than", "comparisonValue": 10,
            "actions": [
                {"type": "send_hint"},
                {"type": "show_message", "text": "nice"},
                {"type": "mystery"}
            ]
        }))
        .unwrap();
        let tags: Vec<_> = t.actions.iter().map(Action::tag).collect();
        assert_eq!(tags, ["show_message", "mystery"]);
    }

    #[test]
    fn test_conditions() {
        let b = Variable::new(VariableType::Boolean, &json!(true)).unwrap();
        assert!(Condition::Equals.holds(&b, &json!("true")));
        assert!(Condition::NotEquals.holds(&b, &json!(false)));

        let n = Variable::inferred(json!(250));
        assert!(Condition::LessThan.holds(&n, &json!(300)));
        assert!(!Condition::GreaterThan.holds(&n, &json!(300)));
        assert!(!Condition::LessThan.holds(&n, &json!("lots")));
    }

    #[test]
    fn test_from_config_accepts_json_text() {
        let text = json!(r#"{"timeTriggers":[{"timeSeconds":5,"action":"send_hint","message":"go"}]}"#);
        let rules = RuleSet::from_config(&text);
        assert_eq!(rules.time_triggers().len(), 1);
    }

    #[test]
    fn test_from_config_is_forgiving() {
        assert!(RuleSet::from_config(&json!(null)).is_empty());
        assert!(RuleSet::from_config(&json!("{not json")).is_empty());
        assert!(RuleSet::from_config(&json!([1, 2])).is_empty());
        assert!(RuleSet::from_config(&json!({"timeTriggers": "nope"})).is_empty());

        let rules = RuleSet::from_config(&json!({
            "timeTriggers": [
                {"timeSeconds": 10, "action": "send_hint", "message": "ten"},
                {"timeSeconds": "soon", "action": "send_hint", "message": "bad"},
                42
            ],
            "variableTriggers": [
                {"variableName": "a", "condition": "equals", "comparisonValue": 1, "actions": []},
                {"variableName": "b", "condition": "roughly", "comparisonValue": 1, "actions": []}
            ]
        }));
        assert_eq!(rules.time_triggers().len(), 1);
        assert_eq!(rules.triggers_for("a").len(), 1);
        assert!(rules.triggers_for("b").is_empty());
        assert_eq!(rules.len(), 2);
    }
}

//! Variable map edits shared by live rooms and stored records.

use std::collections::BTreeMap;

use escapade_protocol::{RoomId, TimerKind};
use escapade_rules::{RuleError, Variable, VariableType};
use serde_json::Value;

use crate::RoomError;

/// Whether `name` is one of the engine-maintained timer variables
/// (`timer_main`, `timer_secondary_remaining`, ...).
pub fn is_timer_variable(name: &str) -> bool {
    TimerKind::ALL
        .iter()
        .any(|k| name == k.elapsed_variable() || name == k.remaining_variable())
}

/// Adds a new variable. Fails if the name is taken.
pub(crate) fn create(
    vars: &mut BTreeMap<String, Variable>,
    room_id: &RoomId,
    name: &str,
    kind: VariableType,
    value: &Value,
) -> Result<Variable, RoomError> {
    check_name(name)?;
    if vars.contains_key(name) {
        return Err(RoomError::VariableExists {
            room_id: room_id.clone(),
            name: name.to_string(),
        });
    }
    let variable = Variable::new(kind, value)?;
    vars.insert(name.to_string(), variable.clone());
    Ok(variable)
}

/// Writes an existing variable. A `kind` different from the declared one
/// re-types the variable; otherwise the value is coerced to the declared
/// type. The map is untouched on error.
pub(crate) fn update(
    vars: &mut BTreeMap<String, Variable>,
    room_id: &RoomId,
    name: &str,
    value: &Value,
    kind: Option<VariableType>,
) -> Result<Variable, RoomError> {
    check_name(name)?;
    let current = vars.get_mut(name).ok_or_else(|| RoomError::VariableMissing {
        room_id: room_id.clone(),
        name: name.to_string(),
    })?;
    match kind {
        Some(kind) if kind != current.kind => *current = Variable::new(kind, value)?,
        _ => current.assign(value)?,
    }
    Ok(current.clone())
}

fn check_name(name: &str) -> Result<(), RoomError> {
    if name.trim().is_empty() {
        return Err(RoomError::InvalidVariable(RuleError::MissingField("name")));
    }
    if is_timer_variable(name) {
        return Err(RoomError::ReadOnlyVariable(name.to_string()));
    }
    Ok(())
}

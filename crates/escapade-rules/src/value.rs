//! Typed room variables.
//!
//! Every variable carries a declared [`VariableType`]. Values written to it
//! are coerced to that type first, so `"true"` written to a boolean is
//! stored as `true` and comparisons see consistent shapes.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::RuleError;

/// Declared type of a room variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    Boolean,
    #[serde(alias = "number")]
    Integer,
    String,
    Array,
    Object,
}

impl VariableType {
    pub fn as_str(self) -> &'static str {
        match self {
            VariableType::Boolean => "boolean",
            VariableType::Integer => "integer",
            VariableType::String => "string",
            VariableType::Array => "array",
            VariableType::Object => "object",
        }
    }

    /// The type a bare JSON value most naturally has.
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Bool(_) => VariableType::Boolean,
            Value::Number(_) => VariableType::Integer,
            Value::Array(_) => VariableType::Array,
            Value::Object(_) => VariableType::Object,
            Value::String(_) | Value::Null => VariableType::String,
        }
    }

    /// Converts `value` to this type.
    ///
    /// - boolean: `true`/`false`, the strings `"true"`/`"false"`/`"1"`/`"0"`
    ///   (case-insensitive), and the numbers 0 and 1.
    /// - integer: numbers, and strings that parse as numbers.
    /// - string: strings as-is, everything else as its JSON text.
    /// - array/object: matching JSON values, or strings holding them.
    ///
    /// # Errors
    /// [`RuleError::Coercion`] when the value has no sensible reading.
    pub fn coerce(self, value: &Value) -> Result<Value, RuleError> {
        let coerced = match (self, value) {
            (VariableType::Boolean, Value::Bool(_)) => Some(value.clone()),
            (VariableType::Boolean, Value::String(s)) => {
                match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" => Some(Value::Bool(true)),
                    "false" | "0" => Some(Value::Bool(false)),
                    _ => None,
                }
            }
            (VariableType::Boolean, Value::Number(n)) => match n.as_f64() {
                Some(f) if f == 0.0 => Some(Value::Bool(false)),
                Some(f) if f == 1.0 => Some(Value::Bool(true)),
                _ => None,
            },

            (VariableType::Integer, Value::Number(_)) => Some(value.clone()),
            (VariableType::Integer, Value::String(s)) => parse_number(s),

            (VariableType::String, Value::String(_)) => Some(value.clone()),
            (VariableType::String, Value::Null) => Some(Value::String(String::new())),
            (VariableType::String, other) => Some(Value::String(other.to_string())),

            (VariableType::Array, Value::Array(_)) => Some(value.clone()),
            (VariableType::Object, Value::Object(_)) => Some(value.clone()),
            (VariableType::Array | VariableType::Object, Value::String(s)) => {
                serde_json::from_str::<Value>(s)
                    .ok()
                    .filter(|parsed| VariableType::infer(parsed) == self)
            }

            _ => None,
        };
        coerced.ok_or_else(|| RuleError::Coercion {
            kind: self,
            value: value.clone(),
        })
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A variable's declared type and current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    #[serde(rename = "type")]
    pub kind: VariableType,
    pub value: Value,
}

impl Variable {
    /// Builds a variable, coercing `value` to `kind`.
    pub fn new(kind: VariableType, value: &Value) -> Result<Self, RuleError> {
        Ok(Self {
            kind,
            value: kind.coerce(value)?,
        })
    }

    /// A variable whose type is inferred from the value.
    pub fn inferred(value: Value) -> Self {
        Self {
            kind: VariableType::infer(&value),
            value,
        }
    }

    /// Replaces the value, coercing it to the declared type.
    pub fn assign(&mut self, value: &Value) -> Result<(), RuleError> {
        self.value = self.kind.coerce(value)?;
        Ok(())
    }

    /// Equality after coercing `other` to this variable's type. Values
    /// that can't be coerced fall back to comparing their text.
    pub fn equals(&self, other: &Value) -> bool {
        match self.kind.coerce(other) {
            Ok(coerced) => values_equal(&self.value, &coerced),
            Err(_) => as_text(&self.value) == as_text(other),
        }
    }

    /// Numeric ordering. `None` if either side isn't numeric.
    pub fn compare_numeric(&self, other: &Value) -> Option<std::cmp::Ordering> {
        let lhs = as_number(&self.value)?;
        let rhs = as_number(other)?;
        lhs.partial_cmp(&rhs)
    }
}

fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::from(i));
    }
    s.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

/// Numbers compare by value, so `1` equals `1.0`.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

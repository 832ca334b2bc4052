//! Error types for rule parsing and variable coercion.

use crate::VariableType;

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// A declaration isn't the JSON shape it should be.
    #[error("invalid rule: {0}")]
    InvalidShape(String),

    /// A required field is absent.
    #[error("missing field '{0}'")]
    MissingField(&'static str),

    /// An action's payload didn't match its tag.
    #[error("invalid '{tag}' action: {source}")]
    Payload {
        tag: String,
        #[source]
        source: serde_json::Error,
    },

    /// A value can't be represented as the variable's declared type.
    #[error("value {value} is not a valid {kind}")]
    Coercion {
        kind: VariableType,
        value: serde_json::Value,
    },
}

//! Actions produced by triggers.
//!
//! Declarations are tagged by a `"type"` key (variable-trigger action
//! lists) or an `"action"` key (time triggers, where the payload fields
//! sit next to `timeSeconds`). Both forms parse through
//! [`Action::from_value`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{RuleError, VariableType};

/// Default on-screen time for `show_message`, in seconds.
const DEFAULT_MESSAGE_SECS: u64 = 5;
/// Default auto-close delay for `show_media`, in seconds.
const DEFAULT_AUTO_CLOSE_SECS: u64 = 5;

/// Something a trigger does when it fires.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    PlaySound(PlaySound),
    ShowMessage(ShowMessage),
    ShowMedia(ShowMedia),
    UpdateVariable(UpdateVariable),
    SendHint(SendHint),
    SendWebhook(SendWebhook),
    /// A tag this engine doesn't know. Kept so the dispatcher can log
    /// and skip it in place instead of failing the whole rule.
    Unrecognized { tag: String },
}

impl Action {
    /// Parses one action declaration.
    ///
    /// # Errors
    /// - [`RuleError::InvalidShape`] if `value` isn't an object.
    /// - [`RuleError::MissingField`] if it has no `type`/`action` tag.
    /// - [`RuleError::Payload`] if a known tag's payload is malformed.
    pub fn from_value(value: &Value) -> Result<Self, RuleError> {
        let obj = value
            .as_object()
            .ok_or_else(|| RuleError::InvalidShape(format!("action must be an object, got {value}")))?;
        let tag = obj
            .get("type")
            .or_else(|| obj.get("action"))
            .and_then(Value::as_str)
            .ok_or(RuleError::MissingField("type"))?;

        let action = match tag {
            "play_sound" => Action::PlaySound(payload(tag, value)?),
            "show_message" => Action::ShowMessage(payload(tag, value)?),
            "show_media" => Action::ShowMedia(payload(tag, value)?),
            "update_variable" => Action::UpdateVariable(payload(tag, value)?),
            "send_hint" => Action::SendHint(payload(tag, value)?),
            "send_webhook" => Action::SendWebhook(payload(tag, value)?),
            other => Action::Unrecognized {
                tag: other.to_string(),
            },
        };
        action.check()?;
        Ok(action)
    }

    /// The declaration tag, as used in fired keys and logs.
    pub fn tag(&self) -> &str {
        match self {
            Action::PlaySound(_) => "play_sound",
            Action::ShowMessage(_) => "show_message",
            Action::ShowMedia(_) => "show_media",
            Action::UpdateVariable(_) => "update_variable",
            Action::SendHint(_) => "send_hint",
            Action::SendWebhook(_) => "send_webhook",
            Action::Unrecognized { tag } => tag,
        }
    }

    fn check(&self) -> Result<(), RuleError> {
        match self {
            Action::PlaySound(s) if s.sound_id.is_none() && s.file.is_none() => {
                Err(RuleError::MissingField("soundId"))
            }
            Action::SendWebhook(w) if w.url.trim().is_empty() => Err(RuleError::MissingField("url")),
            _ => Ok(()),
        }
    }
}

fn payload<T: for<'de> Deserialize<'de>>(tag: &str, value: &Value) -> Result<T, RuleError> {
    T::deserialize(value).map_err(|source| RuleError::Payload {
        tag: tag.to_string(),
        source,
    })
}

/// Accepts ids authored either as strings or as numbers.
fn string_or_number<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    match Value::deserialize(de)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {other}"
        ))),
    }
}

fn opt_string_or_number<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(de)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {other}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaySound {
    #[serde(
        default,
        alias = "sound_id",
        alias = "sound",
        deserialize_with = "opt_string_or_number"
    )]
    pub sound_id: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub volume: Option<f64>,
}

impl PlaySound {
    /// Volume in `0.0..=1.0`, full volume when unset.
    pub fn volume(&self) -> f64 {
        self.volume.unwrap_or(1.0).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowMessage {
    #[serde(alias = "message")]
    pub text: String,
    #[serde(default)]
    pub duration: Option<u64>,
}

impl ShowMessage {
    pub fn duration(&self) -> u64 {
        self.duration.unwrap_or(DEFAULT_MESSAGE_SECS)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowMedia {
    #[serde(alias = "media_id", alias = "media", deserialize_with = "string_or_number")]
    pub media_id: String,
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default, alias = "auto_close_enabled", alias = "autoClose")]
    pub auto_close_enabled: Option<bool>,
    #[serde(default, alias = "auto_close_seconds")]
    pub auto_close_seconds: Option<u64>,
}

impl ShowMedia {
    pub fn auto_close_enabled(&self) -> bool {
        self.auto_close_enabled.unwrap_or(false)
    }

    pub fn auto_close_seconds(&self) -> u64 {
        self.auto_close_seconds.unwrap_or(DEFAULT_AUTO_CLOSE_SECS)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateVariable {
    #[serde(alias = "variableName", alias = "variable")]
    pub name: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default, rename = "variableType", alias = "valueType")]
    pub kind: Option<VariableType>,
}

impl UpdateVariable {
    /// Declared type, or the one the value implies.
    pub fn kind(&self) -> VariableType {
        self.kind.unwrap_or_else(|| VariableType::infer(&self.value))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendHint {
    #[serde(alias = "text", alias = "hint")]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendWebhook {
    pub url: String,
    #[serde(default, alias = "body")]
    pub payload: Option<Value>,
}

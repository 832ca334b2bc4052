//! Rules for Escapade rooms.
//!
//! A room's config blob declares two kinds of rules:
//!
//! - [`TimeTrigger`] — fires when a timer's remaining seconds reach a
//!   threshold, at most once per room-timer lifetime ([`FiredKeys`]).
//! - [`VariableTrigger`] — fires every time a written variable satisfies
//!   a [`Condition`], with no deduplication.
//!
//! Both produce [`Action`]s. This crate only decides *what* fires; the
//! room actor publishes the result.
//!
//! Rule declarations are authored by hand in an admin UI, so parsing is
//! forgiving: a missing or malformed section is an empty rule set and a
//! malformed entry is skipped, each with a warning.

mod action;
mod error;
mod evaluator;
mod trigger;
mod value;

pub use action::{
    Action, PlaySound, SendHint, SendWebhook, ShowMedia, ShowMessage, UpdateVariable,
};
pub use error::RuleError;
pub use evaluator::{Fired, FiredKey, FiredKeys, TriggerContext, TriggerEvaluator};
pub use trigger::{Condition, RuleSet, TimeTrigger, VariableTrigger};
pub use value::{Variable, VariableType};

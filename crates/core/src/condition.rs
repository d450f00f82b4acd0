//! Pure, deterministic edge-condition evaluation.
//!
//! Conditions only read the run state and the caller context; they never
//! touch a store. Unknown condition kinds evaluate to `false` (the publish
//! validator rejects them, so hitting one at runtime means the definition
//! predates the current kind registry).

use serde_json::{Map, Value};

use crate::definition::Condition;

/// Condition kinds the engine can evaluate.
pub mod kinds {
    pub const ALWAYS: &str = "always";
    pub const FIELD_EXISTS: &str = "field_exists";
    pub const FIELD_EQUALS: &str = "field_equals";

    /// All recognised condition kinds.
    pub const ALL: &[&str] = &[ALWAYS, FIELD_EXISTS, FIELD_EQUALS];
}

/// Whether `kind` is a recognised condition kind.
pub fn is_known_kind(kind: &str) -> bool {
    kinds::ALL.contains(&kind)
}

/// Look up a field in `state` first, then in `ctx`.
fn lookup<'a>(field: &str, state: &'a Map<String, Value>, ctx: &'a Map<String, Value>) -> Option<&'a Value> {
    state.get(field).or_else(|| ctx.get(field))
}

/// Evaluate a condition against the run state and the caller context.
///
/// An edge with no condition is treated as `always` by the caller; this
/// function only sees explicit conditions.
pub fn evaluate(condition: &Condition, state: &Map<String, Value>, ctx: &Map<String, Value>) -> bool {
    let empty = Map::new();
    let params = condition.params.as_ref().unwrap_or(&empty);

    match condition.kind.as_str() {
        kinds::ALWAYS => true,

        kinds::FIELD_EXISTS => {
            let Some(field) = params.get("field").and_then(Value::as_str) else {
                tracing::warn!(params = ?params, "field_exists condition without field");
                return false;
            };
            matches!(lookup(field, state, ctx), Some(v) if !v.is_null())
        }

        kinds::FIELD_EQUALS => {
            let Some(field) = params.get("field").and_then(Value::as_str) else {
                tracing::warn!(params = ?params, "field_equals condition without field");
                return false;
            };
            let Some(expected) = params.get("value") else {
                tracing::warn!(params = ?params, "field_equals condition without value");
                return false;
            };
            lookup(field, state, ctx) == Some(expected)
        }

        other => {
            tracing::warn!(condition_kind = other, "Unknown condition kind");
            false
        }
    }
}

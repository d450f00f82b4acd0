//! Declarative capture: merging submitted input into the run state.
//!
//! A screen step's `capture` field supports three forms:
//!
//! - map form `{target_field: source_field}` — copy `input[source]` into
//!   `state[target]`;
//! - array form `["a", "b"]` — copy the named input fields verbatim;
//! - string form `"a"` — copy a single field.
//!
//! Fields absent from the input are skipped; nothing else in the state is
//! touched.

use serde_json::{Map, Value};

/// Apply a step's capture contract to the current state, returning the new
/// state. The input and prior state are not mutated.
pub fn apply_capture(
    capture: Option<&Value>,
    input: &Map<String, Value>,
    state: &Map<String, Value>,
) -> Map<String, Value> {
    let mut next = state.clone();

    match capture {
        None | Some(Value::Null) => {}

        Some(Value::Object(mapping)) => {
            for (target, source) in mapping {
                let Some(source) = source.as_str() else {
                    continue;
                };
                if let Some(value) = input.get(source) {
                    next.insert(target.clone(), value.clone());
                }
            }
        }

        Some(Value::Array(fields)) => {
            for field in fields.iter().filter_map(Value::as_str) {
                if let Some(value) = input.get(field) {
                    next.insert(field.to_string(), value.clone());
                }
            }
        }

        Some(Value::String(field)) => {
            if let Some(value) = input.get(field.as_str()) {
                next.insert(field.clone(), value.clone());
            }
        }

        Some(other) => {
            tracing::warn!(capture = ?other, "Unsupported capture shape, ignoring");
        }
    }

    next
}

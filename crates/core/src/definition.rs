//! The versioned recorrido definition model.
//!
//! A `RecorridoDefinition` is a value object: a step graph with a single
//! entry point. Steps are polymorphic over two variants discriminated by a
//! `"type"` field — screen steps (rendered to the student, await input) and
//! motor steps (non-visual structural transforms, executed automatically).
//! The two variants share almost no behavior, so they are a sum type with
//! exhaustive matching at normalize/validate/execute sites.
//!
//! Structural fields are deliberately permissive (`Option`): the editor
//! saves work-in-progress drafts, and the two-tier validator — not serde —
//! is responsible for reporting what is missing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A complete recorrido definition: the unit that is drafted, normalized,
/// validated and — once published — frozen into an immutable version.
///
/// `steps` is a `BTreeMap` so the canonical (alphabetical) step order falls
/// out of the representation; insertion order is irrelevant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecorridoDefinition {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub entry_step_id: String,
    #[serde(default)]
    pub steps: BTreeMap<String, Step>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Free-form metadata, passthrough only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl RecorridoDefinition {
    /// Whether a step id exists in the graph.
    pub fn has_step(&self, step_id: &str) -> bool {
        self.steps.contains_key(step_id)
    }

    /// Outgoing edges of a step, in declaration order.
    pub fn outgoing_edges<'a>(&'a self, step_id: &'a str) -> impl Iterator<Item = &'a Edge> {
        self.edges.iter().filter(move |e| e.from_step_id == step_id)
    }
}

// ---------------------------------------------------------------------------
// Step variants
// ---------------------------------------------------------------------------

/// Marker for the `"type": "motor"` discriminator.
///
/// Serde tries the `Motor` variant first; anything without the literal
/// `"motor"` tag falls through to `Screen`, which matches the original
/// contract (no `type`, or any other `type`, means screen step).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotorTag {
    #[default]
    #[serde(rename = "motor")]
    Motor,
}

/// A single step in the graph: either a non-visual motor transform or a
/// screen rendered to the student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Step {
    Motor(MotorStep),
    Screen(ScreenStep),
}

impl Step {
    /// Whether this is a motor (non-visual) step.
    pub fn is_motor(&self) -> bool {
        matches!(self, Step::Motor(_))
    }

    /// The `order` value, if the editor assigned one.
    pub fn order(&self) -> Option<f64> {
        match self {
            Step::Motor(m) => m.order,
            Step::Screen(s) => s.order,
        }
    }
}

/// A screen step: rendered to the student via a screen template, waits for
/// a `submit` with input.
///
/// `order` encodes manual drag-and-drop placement in the editor; it is
/// preserved verbatim whenever present and never synthesized or dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_template_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_type: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub props: Map<String, Value>,
    /// Declarative capture contract: string, array or map form (see
    /// [`crate::capture`]).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    /// Typed domain events emitted when the step is submitted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emit: Vec<EmitEvent>,
    /// Legacy emit format, kept for compatibility with older definitions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emit_events: Vec<LegacyEmitEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<f64>,
}

/// A motor step: a compile-time structural transform keyed by
/// `(motor_key, motor_version)`. Never shown to the student, never waits
/// for input. Render-related fields do not exist on this type, so they
/// cannot be smuggled in past the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorStep {
    #[serde(rename = "type")]
    pub tag: MotorTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motor_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motor_version: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<f64>,
}

/// A typed domain event declared on a screen step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmitEvent {
    #[serde(default)]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub payload_template: Map<String, Value>,
}

/// Legacy emit format (`{type, payload}`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyEmitEvent {
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub payload: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Edges
// ---------------------------------------------------------------------------

/// A directed transition between two steps, optionally gated by a condition.
///
/// Higher `priority` is evaluated first; ties are broken by declaration
/// order. An edge with no condition always matches (the default/fallback
/// branch).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(default)]
    pub from_step_id: String,
    #[serde(default)]
    pub to_step_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<f64>,
}

/// An edge condition: a registered condition kind plus its parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motor_tag_discriminates_variants() {
        let motor: Step = serde_json::from_value(serde_json::json!({
            "type": "motor",
            "motor_key": "resolver_select",
            "motor_version": 1,
        }))
        .unwrap();
        assert!(motor.is_motor());

        let screen: Step = serde_json::from_value(serde_json::json!({
            "screen_template_id": "screen_text",
            "props": {"body": "hola"},
        }))
        .unwrap();
        assert!(!screen.is_motor());
    }

    #[test]
    fn unknown_type_falls_through_to_screen() {
        let step: Step = serde_json::from_value(serde_json::json!({
            "type": "experience",
            "screen_template_id": "screen_text",
        }))
        .unwrap();
        assert!(!step.is_motor());
    }

    #[test]
    fn motor_serializes_with_tag_and_no_render_fields() {
        let step = Step::Motor(MotorStep {
            tag: MotorTag::Motor,
            motor_key: Some("expand".into()),
            motor_version: Some(2),
            inputs: None,
            order: Some(1.5),
        });
        let value = serde_json::to_value(&step).unwrap();
        assert_eq!(value["type"], "motor");
        assert_eq!(value["order"], 1.5);
        assert!(value.get("screen_template_id").is_none());
        assert!(value.get("props").is_none());
    }

    #[test]
    fn incomplete_motor_still_deserializes_as_motor() {
        // Missing motor_key/motor_version is a validation concern, not a
        // deserialization failure.
        let step: Step = serde_json::from_value(serde_json::json!({"type": "motor"})).unwrap();
        assert!(step.is_motor());
    }

    #[test]
    fn steps_iterate_in_alphabetical_order() {
        let def: RecorridoDefinition = serde_json::from_value(serde_json::json!({
            "id": "demo",
            "entry_step_id": "b",
            "steps": {
                "b": {"screen_template_id": "screen_text"},
                "a": {"screen_template_id": "screen_text"},
            },
            "edges": [],
        }))
        .unwrap();
        let ids: Vec<_> = def.steps.keys().cloned().collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}

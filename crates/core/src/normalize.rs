//! Definition normalizer.
//!
//! Cleans and canonicalises a definition before a draft save or a publish:
//! steps sorted by id, edges sorted by `(from, to)`, variant-specific field
//! whitelists, broken edge references silently dropped (a deliberate
//! "heal, don't fail" policy for editor robustness), empty prop values
//! stripped. Deterministic, pure and idempotent.
//!
//! The `order` field encodes the user's manual drag-and-drop placement and
//! is preserved verbatim whenever present; losing it is a critical
//! regression.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::definition::{Edge, MotorStep, RecorridoDefinition, ScreenStep, Step};

/// Normalization options.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    /// Drop edges whose endpoints do not reference existing steps.
    pub remove_invalid_edges: bool,
    /// Strip `null`/`""` prop values from screen steps.
    pub clean_empty_props: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            remove_invalid_edges: true,
            clean_empty_props: true,
        }
    }
}

/// Normalize a definition into its canonical form.
pub fn normalize(definition: &RecorridoDefinition, options: &NormalizeOptions) -> RecorridoDefinition {
    let steps: BTreeMap<String, Step> = definition
        .steps
        .iter()
        .map(|(id, step)| (id.clone(), normalize_step(step, options)))
        .collect();

    let mut edges: Vec<Edge> = definition
        .edges
        .iter()
        .map(normalize_edge)
        .filter(|edge| {
            if !options.remove_invalid_edges {
                return true;
            }
            steps.contains_key(&edge.from_step_id) && steps.contains_key(&edge.to_step_id)
        })
        .collect();

    edges.sort_by(|a, b| {
        a.from_step_id
            .cmp(&b.from_step_id)
            .then_with(|| a.to_step_id.cmp(&b.to_step_id))
    });

    RecorridoDefinition {
        id: definition.id.clone(),
        entry_step_id: definition.entry_step_id.clone(),
        steps,
        edges,
        meta: definition.meta.clone(),
    }
}

/// Normalize a single step per its variant.
fn normalize_step(step: &Step, options: &NormalizeOptions) -> Step {
    match step {
        // Motor steps carry only their transform fields. Render fields
        // cannot exist on the type, so nothing to strip here.
        Step::Motor(motor) => Step::Motor(MotorStep {
            tag: motor.tag,
            motor_key: motor.motor_key.clone(),
            motor_version: motor.motor_version,
            inputs: motor.inputs.clone(),
            order: motor.order,
        }),

        Step::Screen(screen) => {
            let props = if options.clean_empty_props {
                screen
                    .props
                    .iter()
                    .filter(|(_, v)| !is_empty_prop(v))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            } else {
                screen.props.clone()
            };

            let emit = screen
                .emit
                .iter()
                .filter(|e| !e.event_type.is_empty())
                .cloned()
                .collect();

            let emit_events = screen
                .emit_events
                .iter()
                .filter(|e| !e.event_type.is_empty())
                .cloned()
                .collect();

            Step::Screen(ScreenStep {
                screen_template_id: screen.screen_template_id.clone(),
                step_type: screen.step_type.clone(),
                props,
                capture: screen.capture.clone(),
                resource_id: screen.resource_id.clone(),
                emit,
                emit_events,
                order: screen.order,
            })
        }
    }
}

/// Normalize a single edge: keep endpoints, a well-formed condition and a
/// numeric priority; everything else is dropped.
fn normalize_edge(edge: &Edge) -> Edge {
    let condition = edge
        .condition
        .as_ref()
        .filter(|c| !c.kind.is_empty())
        .cloned();

    Edge {
        from_step_id: edge.from_step_id.clone(),
        to_step_id: edge.to_step_id.clone(),
        condition,
        priority: edge.priority,
    }
}

/// Whether a prop value counts as empty (`null` or `""`).
fn is_empty_prop(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(value: serde_json::Value) -> RecorridoDefinition {
        serde_json::from_value(value).unwrap()
    }

    fn sample() -> RecorridoDefinition {
        def(serde_json::json!({
            "id": "demo",
            "entry_step_id": "a",
            "steps": {
                "b": {"screen_template_id": "screen_text", "props": {"body": "", "title": "Hola"}},
                "a": {"screen_template_id": "screen_choice", "order": 2.5},
                "m": {"type": "motor", "motor_key": "expand", "motor_version": 1},
            },
            "edges": [
                {"from_step_id": "b", "to_step_id": "a"},
                {"from_step_id": "a", "to_step_id": "b", "condition": {"type": "always"}},
                {"from_step_id": "a", "to_step_id": "ghost"},
            ],
        }))
    }

    #[test]
    fn is_idempotent() {
        let options = NormalizeOptions::default();
        let once = normalize(&sample(), &options);
        let twice = normalize(&once, &options);
        assert_eq!(once, twice);
    }

    #[test]
    fn sorts_edges_by_from_then_to() {
        let normalized = normalize(&sample(), &NormalizeOptions::default());
        let pairs: Vec<_> = normalized
            .edges
            .iter()
            .map(|e| (e.from_step_id.as_str(), e.to_step_id.as_str()))
            .collect();
        assert_eq!(pairs, vec![("a", "b"), ("b", "a")]);
    }

    #[test]
    fn drops_edges_with_broken_references() {
        let normalized = normalize(&sample(), &NormalizeOptions::default());
        assert!(normalized.edges.iter().all(|e| e.to_step_id != "ghost"));
    }

    #[test]
    fn keeps_invalid_edges_when_disabled() {
        let options = NormalizeOptions {
            remove_invalid_edges: false,
            ..NormalizeOptions::default()
        };
        let normalized = normalize(&sample(), &options);
        assert!(normalized.edges.iter().any(|e| e.to_step_id == "ghost"));
    }

    #[test]
    fn strips_empty_props() {
        let normalized = normalize(&sample(), &NormalizeOptions::default());
        let Step::Screen(b) = &normalized.steps["b"] else {
            panic!("b should be a screen step");
        };
        assert!(!b.props.contains_key("body"));
        assert_eq!(b.props["title"], "Hola");
    }

    #[test]
    fn keeps_empty_props_when_disabled() {
        let options = NormalizeOptions {
            clean_empty_props: false,
            ..NormalizeOptions::default()
        };
        let normalized = normalize(&sample(), &options);
        let Step::Screen(b) = &normalized.steps["b"] else {
            panic!("b should be a screen step");
        };
        assert!(b.props.contains_key("body"));
    }

    #[test]
    fn preserves_order_on_both_variants() {
        let source = def(serde_json::json!({
            "id": "demo",
            "entry_step_id": "a",
            "steps": {
                "a": {"screen_template_id": "t", "order": 0.5},
                "m": {"type": "motor", "motor_key": "k", "motor_version": 1, "order": 7},
            },
            "edges": [],
        }));
        let normalized = normalize(&source, &NormalizeOptions::default());
        assert_eq!(normalized.steps["a"].order(), Some(0.5));
        assert_eq!(normalized.steps["m"].order(), Some(7.0));
    }

    #[test]
    fn drops_emit_entries_without_event_type() {
        let source = def(serde_json::json!({
            "id": "demo",
            "entry_step_id": "a",
            "steps": {
                "a": {
                    "screen_template_id": "t",
                    "emit": [
                        {"event_type": "", "payload_template": {}},
                        {"event_type": "step_done", "payload_template": {"run": "{{run_id}}"}},
                    ],
                },
            },
            "edges": [],
        }));
        let normalized = normalize(&source, &NormalizeOptions::default());
        let Step::Screen(a) = &normalized.steps["a"] else {
            panic!("a should be a screen step");
        };
        assert_eq!(a.emit.len(), 1);
        assert_eq!(a.emit[0].event_type, "step_done");
    }

    #[test]
    fn drops_conditions_without_kind() {
        let source = def(serde_json::json!({
            "id": "demo",
            "entry_step_id": "a",
            "steps": {
                "a": {"screen_template_id": "t"},
                "b": {"screen_template_id": "t"},
            },
            "edges": [
                {"from_step_id": "a", "to_step_id": "b", "condition": {"type": ""}},
            ],
        }));
        let normalized = normalize(&source, &NormalizeOptions::default());
        assert!(normalized.edges[0].condition.is_none());
    }

    #[test]
    fn edge_endpoints_always_reference_existing_steps() {
        let normalized = normalize(&sample(), &NormalizeOptions::default());
        for edge in &normalized.edges {
            assert!(normalized.has_step(&edge.from_step_id));
            assert!(normalized.has_step(&edge.to_step_id));
        }
    }

    #[test]
    fn meta_passes_through() {
        let source = def(serde_json::json!({
            "id": "demo",
            "entry_step_id": "a",
            "steps": {"a": {"screen_template_id": "t"}},
            "edges": [],
            "meta": {"editor_version": "0.6.3"},
        }));
        let normalized = normalize(&source, &NormalizeOptions::default());
        assert_eq!(normalized.meta, source.meta);
    }
}

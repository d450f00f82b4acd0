//! Two-tier definition validation.
//!
//! The two passes are independent by design and share no error codes:
//!
//! - **Draft validation** is permissive and blocks only structural
//!   corruption; it is the save-time gate in the editor. Its error strings
//!   are the editor's contract and keep the original Spanish wording.
//! - **Publish validation** is the strict gate in front of the version
//!   store. It fails closed on anything the draft tier would accept but the
//!   runtime cannot execute: unreachable steps, cycles with no way out,
//!   unknown condition kinds, incomplete condition params.
//!
//! Publish acceptance is a strict subset of draft acceptance.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::condition::{self, kinds};
use crate::definition::{Condition, RecorridoDefinition, Step};
use crate::slug;

/// Result of the permissive draft-tier validation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DraftValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Result of the strict publish-tier validation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PublishValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

// ---------------------------------------------------------------------------
// Draft tier
// ---------------------------------------------------------------------------

/// Validate the minimum bar below which the JSON cannot even be a draft.
///
/// Checks: id and entry_step_id present and resolvable, at least one step,
/// every screen step has a `screen_template_id`, every motor step has a
/// valid `motor_key`/`motor_version`, every edge's endpoints exist.
pub fn validate_for_draft(definition: &RecorridoDefinition) -> DraftValidation {
    let mut errors = Vec::new();

    if definition.id.is_empty() {
        errors.push("Falta el ID del recorrido".to_string());
    }

    if definition.entry_step_id.is_empty() {
        errors.push("Falta entry_step_id".to_string());
    }

    if definition.steps.is_empty() {
        errors.push("Debe haber al menos un step".to_string());
    }

    if !definition.entry_step_id.is_empty() && !definition.has_step(&definition.entry_step_id) {
        errors.push(format!(
            "entry_step_id \"{}\" no existe en steps",
            definition.entry_step_id
        ));
    }

    for (step_id, step) in &definition.steps {
        validate_step_structure(step_id, step, &mut errors);
    }

    for (i, edge) in definition.edges.iter().enumerate() {
        if edge.from_step_id.is_empty() {
            errors.push(format!("Edge {i}: falta from_step_id"));
        } else if !definition.has_step(&edge.from_step_id) {
            errors.push(format!(
                "Edge {i}: from_step_id \"{}\" no existe en steps",
                edge.from_step_id
            ));
        }

        if edge.to_step_id.is_empty() {
            errors.push(format!("Edge {i}: falta to_step_id"));
        } else if !definition.has_step(&edge.to_step_id) {
            errors.push(format!(
                "Edge {i}: to_step_id \"{}\" no existe en steps",
                edge.to_step_id
            ));
        }
    }

    DraftValidation {
        valid: errors.is_empty(),
        errors,
    }
}

/// Per-variant structural checks shared by both tiers.
fn validate_step_structure(step_id: &str, step: &Step, errors: &mut Vec<String>) {
    match step {
        Step::Motor(motor) => {
            match motor.motor_key.as_deref() {
                None | Some("") => errors.push(format!(
                    "Step motor \"{step_id}\": debe tener un \"motor_key\" (string no vacío)"
                )),
                Some(key) if key.trim().is_empty() => errors.push(format!(
                    "Step motor \"{step_id}\": debe tener un \"motor_key\" (string no vacío)"
                )),
                Some(_) => {}
            }

            match motor.motor_version {
                None => errors.push(format!(
                    "Step motor \"{step_id}\": debe tener un \"motor_version\" (número)"
                )),
                Some(v) if v < 1 => errors.push(format!(
                    "Step motor \"{step_id}\": motor_version debe ser un número >= 1"
                )),
                Some(_) => {}
            }
        }

        Step::Screen(screen) => {
            if screen.screen_template_id.as_deref().unwrap_or("").is_empty() {
                errors.push(format!("Step \"{step_id}\": falta screen_template_id"));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Publish tier
// ---------------------------------------------------------------------------

/// Validate the strict publish gate.
///
/// Errors block the publish transaction entirely; warnings are advisory
/// (surfaced to the editor, recorded in the audit entry, never blocking).
pub fn validate_for_publish(definition: &RecorridoDefinition) -> PublishValidation {
    // Draft-tier structural rules first. If the structure is broken the
    // graph checks below would only produce noise.
    let draft = validate_for_draft(definition);
    let mut errors = draft.errors;
    let mut warnings = Vec::new();

    if !definition.id.is_empty() {
        if let Err(e) = slug::validate_slug_id(&definition.id) {
            errors.push(format!("id: {e}"));
        }
    }

    for edge in &definition.edges {
        if let Some(condition) = &edge.condition {
            validate_condition(edge_label(edge), condition, &mut errors);
        }
    }

    // Duplicate (from, to) pairs are almost always an editor glitch.
    let mut seen_pairs = HashSet::new();
    for edge in &definition.edges {
        if !seen_pairs.insert((edge.from_step_id.as_str(), edge.to_step_id.as_str())) {
            warnings.push(format!(
                "Edge ({} → {}): duplicado",
                edge.from_step_id, edge.to_step_id
            ));
        }
    }

    for (step_id, step) in &definition.steps {
        if let Step::Screen(screen) = step {
            if screen.step_type.is_none() && screen.screen_template_id.is_some() {
                warnings.push(format!(
                    "Step \"{step_id}\": no tiene step_type definido (recomendado para mejor validación)"
                ));
            }
        }

        // A fan-out where every edge carries a condition has no fallback
        // branch; at runtime this can dead-end with "no matching edge".
        let outgoing: Vec<_> = definition.outgoing_edges(step_id).collect();
        if !outgoing.is_empty() && outgoing.iter().all(|e| e.condition.is_some()) {
            warnings.push(format!(
                "Step \"{step_id}\": todas las aristas salientes tienen condición (sin rama por defecto)"
            ));
        }
    }

    if errors.is_empty() {
        validate_graph(definition, &mut errors);
    }

    PublishValidation {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

fn edge_label(edge: &crate::definition::Edge) -> String {
    format!("Edge ({} → {})", edge.from_step_id, edge.to_step_id)
}

/// Check a condition's kind and required params.
fn validate_condition(label: String, cond: &Condition, errors: &mut Vec<String>) {
    if !condition::is_known_kind(&cond.kind) {
        errors.push(format!(
            "{label}: condition.type \"{}\" no existe en el registry",
            cond.kind
        ));
        return;
    }

    let field = cond
        .params
        .as_ref()
        .and_then(|p| p.get("field"))
        .and_then(serde_json::Value::as_str);

    match cond.kind.as_str() {
        kinds::FIELD_EXISTS => {
            if field.unwrap_or("").is_empty() {
                errors.push(format!("{label}: condition.params.field es requerido"));
            }
        }
        kinds::FIELD_EQUALS => {
            if field.unwrap_or("").is_empty() {
                errors.push(format!("{label}: condition.params.field es requerido"));
            }
            if cond.params.as_ref().and_then(|p| p.get("value")).is_none() {
                errors.push(format!("{label}: condition.params.value es requerido"));
            }
        }
        _ => {}
    }
}

/// Graph-level checks: reachability from the entry step, and cycles with no
/// path to a terminal step.
///
/// Terminal steps (no outgoing edges) are implicit completion points, so a
/// run can always finish iff every reachable step can reach one. Condition
/// satisfiability is not analysed statically; the no-fallback warning above
/// covers that gap.
fn validate_graph(definition: &RecorridoDefinition, errors: &mut Vec<String>) {
    // Forward adjacency, declaration order.
    let mut forward: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut reverse: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &definition.edges {
        forward
            .entry(edge.from_step_id.as_str())
            .or_default()
            .push(edge.to_step_id.as_str());
        reverse
            .entry(edge.to_step_id.as_str())
            .or_default()
            .push(edge.from_step_id.as_str());
    }

    // BFS from the entry step.
    let mut reachable = HashSet::new();
    let mut queue = VecDeque::from([definition.entry_step_id.as_str()]);
    while let Some(step_id) = queue.pop_front() {
        if !reachable.insert(step_id) {
            continue;
        }
        if let Some(next) = forward.get(step_id) {
            queue.extend(next.iter().copied());
        }
    }

    for step_id in definition.steps.keys() {
        if !reachable.contains(step_id.as_str()) {
            errors.push(format!(
                "Step \"{step_id}\" no es alcanzable desde entry_step_id"
            ));
        }
    }

    // Reverse BFS from terminal steps: everything that can still finish.
    let mut can_finish = HashSet::new();
    let mut queue: VecDeque<&str> = definition
        .steps
        .keys()
        .map(String::as_str)
        .filter(|id| forward.get(id).is_none_or(Vec::is_empty))
        .collect();
    while let Some(step_id) = queue.pop_front() {
        if !can_finish.insert(step_id) {
            continue;
        }
        if let Some(prev) = reverse.get(step_id) {
            queue.extend(prev.iter().copied());
        }
    }

    let mut trapped: Vec<&str> = reachable
        .iter()
        .filter(|id| !can_finish.contains(*id))
        .copied()
        .collect();
    trapped.sort_unstable();
    if !trapped.is_empty() {
        errors.push(format!(
            "Ciclo sin salida: los steps [{}] no pueden alcanzar un step terminal",
            trapped.join(", ")
        ));
    }
}

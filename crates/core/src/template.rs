//! Payload template resolution for emitted domain events.
//!
//! Emit payload templates may contain `{{user_id}}`, `{{run_id}}`,
//! `{{step_id}}`, `{{recorrido_id}}` and `{{state.<field>}}` placeholders.
//! Resolution is string substitution applied recursively through objects
//! and arrays; non-string leaves pass through untouched.

use serde_json::{Map, Value};

/// Variables available to payload templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext<'a> {
    pub user_id: &'a str,
    pub run_id: &'a str,
    pub step_id: &'a str,
    pub recorrido_id: &'a str,
    pub state: Option<&'a Map<String, Value>>,
}

/// Resolve placeholders in a single template string.
pub fn resolve_str(template: &str, ctx: &TemplateContext<'_>) -> String {
    let mut resolved = template
        .replace("{{user_id}}", ctx.user_id)
        .replace("{{run_id}}", ctx.run_id)
        .replace("{{step_id}}", ctx.step_id)
        .replace("{{recorrido_id}}", ctx.recorrido_id);

    if let Some(state) = ctx.state {
        for (key, value) in state {
            let placeholder = format!("{{{{state.{key}}}}}");
            if resolved.contains(&placeholder) {
                resolved = resolved.replace(&placeholder, &value_to_string(value));
            }
        }
    }

    resolved
}

/// Resolve placeholders recursively through a JSON value.
pub fn resolve_value(template: &Value, ctx: &TemplateContext<'_>) -> Value {
    match template {
        Value::String(s) => Value::String(resolve_str(s, ctx)),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_value(v, ctx)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, ctx)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Render a state value the way it reads in a payload (no JSON quoting for
/// plain strings).
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

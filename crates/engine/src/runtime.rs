//! Step-graph runtime: starting runs, rendering the current step,
//! processing submissions, and chaining motor steps.
//!
//! A run's `current_step_id` only ever points at a screen step (or the
//! step it completed on). Motor steps are resolved in memory: when a
//! transition lands on one, the whole motor chain executes first and a
//! single guarded UPDATE then moves the run to the next screen step or
//! completes it. A failing motor therefore leaves the run exactly where it
//! was.

use std::cmp::Ordering;
use std::sync::Arc;

use recorrido_core::capture::apply_capture;
use recorrido_core::condition::evaluate;
use recorrido_core::definition::{Edge, RecorridoDefinition, ScreenStep, Step};
use recorrido_core::slug::validate_slug_id;
use recorrido_core::template::{resolve_value, TemplateContext};
use recorrido_db::models::recorrido::status;
use recorrido_db::models::run::{event_types, run_status, AppendRunEvent, CreateRun, RecorridoRun};
use recorrido_db::repositories::{RecorridoRepo, RunEventRepo, RunRepo, VersionRepo};
use recorrido_db::DbPool;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::motor::MotorRegistry;

/// Upper bound on consecutive motor steps, against definitions that chain
/// motors in a loop the publish validator could not rule out.
pub const MAX_MOTOR_CHAIN: usize = 32;

/// What the client renders for a screen step. Motor steps never produce
/// one.
#[derive(Debug, Clone, Serialize)]
pub struct RenderSpec {
    pub step_id: String,
    pub screen_template_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_type: Option<String>,
    pub props: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

/// A run plus what to render next. `current_step` is `None` once the run
/// is no longer running.
#[derive(Debug, Serialize)]
pub struct RunState {
    pub run: RecorridoRun,
    pub current_step: Option<RenderSpec>,
}

/// The step-graph executor. Cheap to clone; the motor registry is shared.
#[derive(Clone)]
pub struct Runtime {
    pool: DbPool,
    motors: Arc<MotorRegistry>,
}

impl Runtime {
    pub fn new(pool: DbPool, motors: Arc<MotorRegistry>) -> Self {
        Self { pool, motors }
    }

    // -----------------------------------------------------------------------
    // Public operations
    // -----------------------------------------------------------------------

    /// Start a run of the latest published version, or resume the user's
    /// active run if one exists.
    pub async fn start_run(
        &self,
        user_id: &str,
        recorrido_id: &str,
    ) -> Result<RunState, EngineError> {
        validate_slug_id(recorrido_id).map_err(|e| EngineError::InvalidSlug(e.to_string()))?;

        let recorrido = RecorridoRepo::find_by_id(&self.pool, recorrido_id)
            .await?
            .filter(|r| r.status != status::DELETED)
            .ok_or_else(|| EngineError::RecorridoNotFound(recorrido_id.to_string()))?;
        let version = recorrido
            .current_published_version
            .ok_or_else(|| EngineError::NotPublished(recorrido.id.clone()))?;
        let definition = self.load_definition(&recorrido.id, version).await?;

        if let Some(existing) =
            RunRepo::find_active_for_user(&self.pool, user_id, &recorrido.id).await?
        {
            let run = self.settle(existing, &definition).await?;
            return self.snapshot(run, &definition);
        }

        let run = RunRepo::create(
            &self.pool,
            &CreateRun {
                user_id: user_id.to_string(),
                recorrido_id: recorrido.id.clone(),
                version,
                current_step_id: definition.entry_step_id.clone(),
            },
        )
        .await?;

        RunEventRepo::append(
            &self.pool,
            &AppendRunEvent {
                run_id: run.id,
                event_type: event_types::RECORRIDO_STARTED.to_string(),
                step_id: None,
                payload_json: serde_json::json!({ "version": version }),
                idempotency_key: None,
            },
        )
        .await?;

        info!(recorrido_id = %recorrido.id, run_id = %run.id, version, "run started");

        let run = self.settle(run, &definition).await?;
        self.snapshot(run, &definition)
    }

    /// Render the current step of a run.
    ///
    /// Read-mostly: bumps `last_activity_at`, appends an idempotent
    /// `step_viewed` event, and finishes any motor chain a previous request
    /// left unsettled.
    pub async fn get_current_step(
        &self,
        user_id: &str,
        run_id: Uuid,
    ) -> Result<RunState, EngineError> {
        let run = self.load_owned_run(user_id, run_id).await?;
        let definition = self.load_definition(&run.recorrido_id, run.version).await?;
        let run = if run.is_running() {
            self.settle(run, &definition).await?
        } else {
            run
        };

        RunRepo::touch(&self.pool, run.id).await?;
        if run.is_running() {
            RunEventRepo::append(
                &self.pool,
                &AppendRunEvent {
                    run_id: run.id,
                    event_type: event_types::STEP_VIEWED.to_string(),
                    step_id: Some(run.current_step_id.clone()),
                    payload_json: serde_json::json!({}),
                    idempotency_key: Some(format!("step_viewed:{}", run.current_step_id)),
                },
            )
            .await?;
        }

        self.snapshot(run, &definition)
    }

    /// Process a submission for the run's current step and advance the run.
    pub async fn submit_step(
        &self,
        user_id: &str,
        run_id: Uuid,
        step_id: &str,
        input: &Map<String, Value>,
    ) -> Result<RunState, EngineError> {
        let run = self.load_owned_run(user_id, run_id).await?;
        if !run.is_running() {
            return Err(EngineError::RunNotActive);
        }
        let definition = self.load_definition(&run.recorrido_id, run.version).await?;
        let run = self.settle(run, &definition).await?;
        if !run.is_running() {
            return Err(EngineError::RunNotActive);
        }
        if run.current_step_id != step_id {
            return Err(EngineError::WrongStep {
                expected: run.current_step_id.clone(),
                got: step_id.to_string(),
            });
        }

        let screen = match definition.steps.get(step_id) {
            Some(Step::Screen(screen)) => screen,
            Some(Step::Motor(_)) => {
                // settle() cannot leave a running run on a motor step.
                return Err(EngineError::CorruptDefinition(format!(
                    "el run quedó sobre el step motor \"{step_id}\""
                )));
            }
            None => {
                return Err(EngineError::CorruptDefinition(format!(
                    "current_step_id \"{step_id}\" no existe en la versión publicada"
                )));
            }
        };

        let state = context_map(&run)?;
        let next_state = apply_capture(screen.capture.as_ref(), input, &state);
        let ambient = ambient_context(&run, step_id);

        // Decide the transition before writing anything, so a dead end
        // leaves the run untouched.
        let landed = match select_transition(&definition, step_id, &next_state, &ambient) {
            Transition::NoMatch => {
                return Err(EngineError::NoMatchingEdge {
                    step_id: step_id.to_string(),
                })
            }
            Transition::Terminal => Landing::Completed(next_state),
            Transition::Edge(edge) => {
                self.resolve_landing(&run, &definition, &edge.to_step_id, next_state)?
            }
        };

        let updated = match &landed {
            Landing::Completed(final_state) => {
                RunRepo::complete(&self.pool, run.id, step_id, &Value::Object(final_state.clone()))
                    .await?
            }
            Landing::Screen(next_step, final_state) => {
                RunRepo::advance(
                    &self.pool,
                    run.id,
                    step_id,
                    next_step,
                    &Value::Object(final_state.clone()),
                )
                .await?
            }
        }
        .ok_or(EngineError::SubmitConflict)?;

        self.append_submit_events(&updated, screen, step_id, input).await?;
        if !updated.is_running() {
            RunEventRepo::append(
                &self.pool,
                &AppendRunEvent {
                    run_id: updated.id,
                    event_type: event_types::RECORRIDO_COMPLETED.to_string(),
                    step_id: Some(updated.current_step_id.clone()),
                    payload_json: serde_json::json!({}),
                    idempotency_key: None,
                },
            )
            .await?;
            info!(run_id = %updated.id, "run completed");
        }

        self.snapshot(updated, &definition)
    }

    /// Abandon a running run. Repeat calls on an abandoned run are no-ops.
    pub async fn abandon_run(
        &self,
        user_id: &str,
        run_id: Uuid,
        reason: Option<&str>,
    ) -> Result<RecorridoRun, EngineError> {
        let run = self.load_owned_run(user_id, run_id).await?;
        match run.status.as_str() {
            run_status::ABANDONED => return Ok(run),
            run_status::COMPLETED => return Err(EngineError::RunNotActive),
            _ => {}
        }

        let last_step = run.current_step_id.clone();
        let abandoned = match RunRepo::abandon(&self.pool, run.id).await? {
            Some(run) => run,
            // Lost a race against another abandon or a submit.
            None => {
                let run = RunRepo::find_by_id(&self.pool, run_id)
                    .await?
                    .ok_or(EngineError::RunNotFound(run_id))?;
                if run.status == run_status::ABANDONED {
                    return Ok(run);
                }
                return Err(EngineError::RunNotActive);
            }
        };

        RunEventRepo::append(
            &self.pool,
            &AppendRunEvent {
                run_id: abandoned.id,
                event_type: event_types::RECORRIDO_ABANDONED.to_string(),
                step_id: Some(last_step.clone()),
                payload_json: serde_json::json!({ "last_step": last_step, "reason": reason }),
                idempotency_key: None,
            },
        )
        .await?;

        Ok(abandoned)
    }

    // -----------------------------------------------------------------------
    // Motor chaining
    // -----------------------------------------------------------------------

    /// If the run sits on a motor step, execute the chain and move it to
    /// the next screen step (or complete it) with one guarded UPDATE.
    async fn settle(
        &self,
        run: RecorridoRun,
        definition: &RecorridoDefinition,
    ) -> Result<RecorridoRun, EngineError> {
        if !run.is_running()
            || !matches!(definition.steps.get(&run.current_step_id), Some(s) if s.is_motor())
        {
            return Ok(run);
        }

        let state = context_map(&run)?;
        let from = run.current_step_id.clone();
        let landing = self.resolve_landing(&run, definition, &from, state)?;

        let updated = match &landing {
            Landing::Completed(final_state) => {
                RunRepo::complete(&self.pool, run.id, &from, &Value::Object(final_state.clone()))
                    .await?
            }
            Landing::Screen(next_step, final_state) => {
                RunRepo::advance(
                    &self.pool,
                    run.id,
                    &from,
                    next_step,
                    &Value::Object(final_state.clone()),
                )
                .await?
            }
        }
        .ok_or(EngineError::SubmitConflict)?;

        if !updated.is_running() {
            RunEventRepo::append(
                &self.pool,
                &AppendRunEvent {
                    run_id: updated.id,
                    event_type: event_types::RECORRIDO_COMPLETED.to_string(),
                    step_id: Some(updated.current_step_id.clone()),
                    payload_json: serde_json::json!({}),
                    idempotency_key: None,
                },
            )
            .await?;
        }

        Ok(updated)
    }

    /// Follow the graph from `target` through any motor steps, executing
    /// them in memory, until a screen step or completion.
    fn resolve_landing(
        &self,
        run: &RecorridoRun,
        definition: &RecorridoDefinition,
        target: &str,
        mut state: Map<String, Value>,
    ) -> Result<Landing, EngineError> {
        let mut current = target.to_string();

        for _ in 0..MAX_MOTOR_CHAIN {
            let motor = match definition.steps.get(&current) {
                Some(Step::Motor(motor)) => motor,
                Some(Step::Screen(_)) => return Ok(Landing::Screen(current, state)),
                None => {
                    return Err(EngineError::CorruptDefinition(format!(
                        "el step \"{current}\" no existe en la versión publicada"
                    )));
                }
            };

            let (key, version) = match (motor.motor_key.as_deref(), motor.motor_version) {
                (Some(key), Some(version)) => (key, version),
                _ => {
                    return Err(EngineError::CorruptDefinition(format!(
                        "step motor \"{current}\" sin motor_key/motor_version"
                    )));
                }
            };
            let transform = self.motors.get(key, version).ok_or_else(|| {
                EngineError::MotorNotRegistered {
                    key: key.to_string(),
                    version,
                }
            })?;

            let inputs = resolve_motor_inputs(motor.inputs.as_ref(), run, &current, &state);
            let outputs = transform.execute(&inputs, &state).map_err(|e| {
                warn!(run_id = %run.id, motor = key, "motor failed: {e}");
                EngineError::MotorFailed {
                    key: key.to_string(),
                    message: e.to_string(),
                }
            })?;
            state.extend(outputs);

            let ambient = ambient_context(run, &current);
            current = match select_transition(definition, &current, &state, &ambient) {
                Transition::Terminal => return Ok(Landing::Completed(state)),
                Transition::NoMatch => {
                    return Err(EngineError::NoMatchingEdge { step_id: current })
                }
                Transition::Edge(edge) => edge.to_step_id.clone(),
            };
        }

        Err(EngineError::MotorChainTooLong {
            limit: MAX_MOTOR_CHAIN,
        })
    }

    // -----------------------------------------------------------------------
    // Events and rendering
    // -----------------------------------------------------------------------

    async fn append_submit_events(
        &self,
        run: &RecorridoRun,
        screen: &ScreenStep,
        step_id: &str,
        input: &Map<String, Value>,
    ) -> Result<(), EngineError> {
        RunEventRepo::append(
            &self.pool,
            &AppendRunEvent {
                run_id: run.id,
                event_type: event_types::STEP_COMPLETED.to_string(),
                step_id: Some(step_id.to_string()),
                payload_json: serde_json::json!({ "input": input }),
                idempotency_key: None,
            },
        )
        .await?;

        let state = context_map(run)?;
        let run_id = run.id.to_string();
        let ctx = TemplateContext {
            user_id: &run.user_id,
            run_id: &run_id,
            step_id,
            recorrido_id: &run.recorrido_id,
            state: Some(&state),
        };

        for (event_type, template) in screen
            .emit
            .iter()
            .map(|e| (&e.event_type, &e.payload_template))
            .chain(screen.emit_events.iter().map(|e| (&e.event_type, &e.payload)))
        {
            let payload = resolve_value(&Value::Object(template.clone()), &ctx);
            RunEventRepo::append(
                &self.pool,
                &AppendRunEvent {
                    run_id: run.id,
                    event_type: event_type.clone(),
                    step_id: Some(step_id.to_string()),
                    payload_json: payload,
                    idempotency_key: None,
                },
            )
            .await?;
        }

        Ok(())
    }

    fn snapshot(
        &self,
        run: RecorridoRun,
        definition: &RecorridoDefinition,
    ) -> Result<RunState, EngineError> {
        let current_step = if run.is_running() {
            match definition.steps.get(&run.current_step_id) {
                Some(Step::Screen(screen)) => Some(render_spec(&run, &run.current_step_id, screen)?),
                _ => None,
            }
        } else {
            None
        };
        Ok(RunState { run, current_step })
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    async fn load_owned_run(
        &self,
        user_id: &str,
        run_id: Uuid,
    ) -> Result<RecorridoRun, EngineError> {
        let run = RunRepo::find_by_id(&self.pool, run_id)
            .await?
            .ok_or(EngineError::RunNotFound(run_id))?;
        if run.user_id != user_id {
            return Err(EngineError::NotRunOwner);
        }
        Ok(run)
    }

    async fn load_definition(
        &self,
        recorrido_id: &str,
        version: i32,
    ) -> Result<RecorridoDefinition, EngineError> {
        let row = VersionRepo::find(&self.pool, recorrido_id, version)
            .await?
            .ok_or_else(|| EngineError::VersionNotFound {
                recorrido_id: recorrido_id.to_string(),
                version,
            })?;
        serde_json::from_value(row.definition_json)
            .map_err(|e| EngineError::CorruptDefinition(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Pure helpers
// ---------------------------------------------------------------------------

/// Where a transition ends up once motors are resolved.
enum Landing {
    /// Next screen step, with the context to persist.
    Screen(String, Map<String, Value>),
    /// The run completed, with the final context.
    Completed(Map<String, Value>),
}

/// Outcome of evaluating a step's outgoing edges.
#[derive(Debug)]
enum Transition<'a> {
    /// No outgoing edges at all: implicit completion.
    Terminal,
    /// The winning edge.
    Edge(&'a Edge),
    /// Edges exist but none matched.
    NoMatch,
}

/// Pick the outgoing edge to follow: descending priority (missing counts
/// as 0), declaration order on ties, first whose condition holds.
fn select_transition<'a>(
    definition: &'a RecorridoDefinition,
    step_id: &'a str,
    state: &Map<String, Value>,
    ambient: &Map<String, Value>,
) -> Transition<'a> {
    let mut outgoing: Vec<&Edge> = definition.outgoing_edges(step_id).collect();
    if outgoing.is_empty() {
        return Transition::Terminal;
    }

    // Stable sort keeps declaration order within equal priorities.
    outgoing.sort_by(|a, b| {
        b.priority
            .unwrap_or(0.0)
            .partial_cmp(&a.priority.unwrap_or(0.0))
            .unwrap_or(Ordering::Equal)
    });

    for edge in outgoing {
        let matches = match &edge.condition {
            None => true,
            Some(condition) => evaluate(condition, state, ambient),
        };
        if matches {
            return Transition::Edge(edge);
        }
    }

    Transition::NoMatch
}

/// The run's captured context as a map.
fn context_map(run: &RecorridoRun) -> Result<Map<String, Value>, EngineError> {
    match &run.context_json {
        Value::Object(map) => Ok(map.clone()),
        other => Err(EngineError::CorruptDefinition(format!(
            "contexto del run no es un objeto: {other}"
        ))),
    }
}

/// Ambient variables visible to edge conditions alongside the state.
fn ambient_context(run: &RecorridoRun, step_id: &str) -> Map<String, Value> {
    let mut ctx = Map::new();
    ctx.insert("user_id".to_string(), Value::from(run.user_id.clone()));
    ctx.insert("run_id".to_string(), Value::from(run.id.to_string()));
    ctx.insert("step_id".to_string(), Value::from(step_id.to_string()));
    ctx.insert(
        "recorrido_id".to_string(),
        Value::from(run.recorrido_id.clone()),
    );
    ctx
}

/// Resolve template placeholders in a motor step's declared inputs.
fn resolve_motor_inputs(
    inputs: Option<&Map<String, Value>>,
    run: &RecorridoRun,
    step_id: &str,
    state: &Map<String, Value>,
) -> Map<String, Value> {
    let Some(inputs) = inputs else {
        return Map::new();
    };
    let run_id = run.id.to_string();
    let ctx = TemplateContext {
        user_id: &run.user_id,
        run_id: &run_id,
        step_id,
        recorrido_id: &run.recorrido_id,
        state: Some(state),
    };
    match resolve_value(&Value::Object(inputs.clone()), &ctx) {
        Value::Object(resolved) => resolved,
        _ => Map::new(),
    }
}

/// Build the client-facing spec for a screen step, with template
/// placeholders in props resolved against the run context.
fn render_spec(
    run: &RecorridoRun,
    step_id: &str,
    screen: &ScreenStep,
) -> Result<RenderSpec, EngineError> {
    let state = context_map(run)?;
    let run_id = run.id.to_string();
    let ctx = TemplateContext {
        user_id: &run.user_id,
        run_id: &run_id,
        step_id,
        recorrido_id: &run.recorrido_id,
        state: Some(&state),
    };
    let props = match resolve_value(&Value::Object(screen.props.clone()), &ctx) {
        Value::Object(props) => props,
        _ => Map::new(),
    };

    Ok(RenderSpec {
        step_id: step_id.to_string(),
        screen_template_id: screen.screen_template_id.clone().unwrap_or_default(),
        step_type: screen.step_type.clone(),
        props,
        resource_id: screen.resource_id.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(value: serde_json::Value) -> RecorridoDefinition {
        serde_json::from_value(value).unwrap()
    }

    fn edge_target<'a>(t: &'a Transition<'a>) -> Option<&'a str> {
        match t {
            Transition::Edge(e) => Some(e.to_step_id.as_str()),
            _ => None,
        }
    }

    #[test]
    fn terminal_when_no_outgoing_edges() {
        let definition = def(serde_json::json!({
            "id": "demo",
            "entry_step_id": "a",
            "steps": {"a": {"screen_template_id": "t"}},
            "edges": [],
        }));
        let t = select_transition(&definition, "a", &Map::new(), &Map::new());
        assert!(matches!(t, Transition::Terminal));
    }

    #[test]
    fn higher_priority_wins_regardless_of_declaration_order() {
        let definition = def(serde_json::json!({
            "id": "demo",
            "entry_step_id": "a",
            "steps": {
                "a": {"screen_template_id": "t"},
                "b": {"screen_template_id": "t"},
                "c": {"screen_template_id": "t"},
            },
            "edges": [
                {"from_step_id": "a", "to_step_id": "b"},
                {"from_step_id": "a", "to_step_id": "c", "priority": 10},
            ],
        }));
        let t = select_transition(&definition, "a", &Map::new(), &Map::new());
        assert_eq!(edge_target(&t), Some("c"));
    }

    #[test]
    fn ties_fall_back_to_declaration_order() {
        let definition = def(serde_json::json!({
            "id": "demo",
            "entry_step_id": "a",
            "steps": {
                "a": {"screen_template_id": "t"},
                "b": {"screen_template_id": "t"},
                "c": {"screen_template_id": "t"},
            },
            "edges": [
                {"from_step_id": "a", "to_step_id": "b", "priority": 5},
                {"from_step_id": "a", "to_step_id": "c", "priority": 5},
            ],
        }));
        let t = select_transition(&definition, "a", &Map::new(), &Map::new());
        assert_eq!(edge_target(&t), Some("b"));
    }

    #[test]
    fn missing_priority_counts_as_zero() {
        let definition = def(serde_json::json!({
            "id": "demo",
            "entry_step_id": "a",
            "steps": {
                "a": {"screen_template_id": "t"},
                "b": {"screen_template_id": "t"},
                "c": {"screen_template_id": "t"},
            },
            "edges": [
                {"from_step_id": "a", "to_step_id": "b"},
                {"from_step_id": "a", "to_step_id": "c", "priority": -1},
            ],
        }));
        let t = select_transition(&definition, "a", &Map::new(), &Map::new());
        assert_eq!(edge_target(&t), Some("b"));
    }

    #[test]
    fn condition_gates_the_higher_priority_edge() {
        let definition = def(serde_json::json!({
            "id": "demo",
            "entry_step_id": "a",
            "steps": {
                "a": {"screen_template_id": "t"},
                "premium": {"screen_template_id": "t"},
                "normal": {"screen_template_id": "t"},
            },
            "edges": [
                {"from_step_id": "a", "to_step_id": "premium", "priority": 10,
                 "condition": {"type": "field_equals", "params": {"field": "plan", "value": "pro"}}},
                {"from_step_id": "a", "to_step_id": "normal"},
            ],
        }));

        let mut state = Map::new();
        state.insert("plan".to_string(), Value::from("pro"));
        let t = select_transition(&definition, "a", &state, &Map::new());
        assert_eq!(edge_target(&t), Some("premium"));

        state.insert("plan".to_string(), Value::from("free"));
        let t = select_transition(&definition, "a", &state, &Map::new());
        assert_eq!(edge_target(&t), Some("normal"));
    }

    #[test]
    fn no_match_when_every_condition_fails() {
        let definition = def(serde_json::json!({
            "id": "demo",
            "entry_step_id": "a",
            "steps": {
                "a": {"screen_template_id": "t"},
                "b": {"screen_template_id": "t"},
            },
            "edges": [
                {"from_step_id": "a", "to_step_id": "b",
                 "condition": {"type": "field_exists", "params": {"field": "nunca"}}},
            ],
        }));
        let t = select_transition(&definition, "a", &Map::new(), &Map::new());
        assert!(matches!(t, Transition::NoMatch));
    }
}

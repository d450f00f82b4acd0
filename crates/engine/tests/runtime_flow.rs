//! Integration tests for the step-graph runtime: starting, rendering,
//! submitting, motor chaining, and abandoning runs.

use std::sync::Arc;

use assert_matches::assert_matches;
use recorrido_core::definition::RecorridoDefinition;
use recorrido_db::models::run::{event_types, run_status};
use recorrido_db::repositories::RunEventRepo;
use recorrido_engine::lifecycle::CreateRecorridoInput;
use recorrido_engine::{
    EngineError, LifecycleService, MotorError, MotorRegistry, MotorTransform, Runtime,
};
use serde_json::{Map, Value};
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Test motors
// ---------------------------------------------------------------------------

/// Writes a fixed greeting into the context.
struct Saludo;

impl MotorTransform for Saludo {
    fn key(&self) -> &str {
        "saludo"
    }

    fn version(&self) -> i64 {
        1
    }

    fn execute(
        &self,
        inputs: &Map<String, Value>,
        _state: &Map<String, Value>,
    ) -> Result<Map<String, Value>, MotorError> {
        let nombre = inputs.get("nombre").and_then(Value::as_str).unwrap_or("?");
        let mut out = Map::new();
        out.insert("saludo".to_string(), Value::from(format!("Hola, {nombre}")));
        Ok(out)
    }
}

/// Sums the `puntos` field from state into a running `total`.
struct Sumar;

impl MotorTransform for Sumar {
    fn key(&self) -> &str {
        "sumar"
    }

    fn version(&self) -> i64 {
        1
    }

    fn execute(
        &self,
        _inputs: &Map<String, Value>,
        state: &Map<String, Value>,
    ) -> Result<Map<String, Value>, MotorError> {
        let puntos = state.get("puntos").and_then(Value::as_i64).unwrap_or(0);
        let total = state.get("total").and_then(Value::as_i64).unwrap_or(0);
        let mut out = Map::new();
        out.insert("total".to_string(), Value::from(total + puntos));
        Ok(out)
    }
}

/// Always fails.
struct Roto;

impl MotorTransform for Roto {
    fn key(&self) -> &str {
        "roto"
    }

    fn version(&self) -> i64 {
        1
    }

    fn execute(
        &self,
        _inputs: &Map<String, Value>,
        _state: &Map<String, Value>,
    ) -> Result<Map<String, Value>, MotorError> {
        Err(MotorError::new("explotó"))
    }
}

fn registry() -> Arc<MotorRegistry> {
    let mut registry = MotorRegistry::new();
    registry.register(Arc::new(Saludo));
    registry.register(Arc::new(Sumar));
    registry.register(Arc::new(Roto));
    Arc::new(registry)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn publish(pool: &PgPool, id: &str, definition: serde_json::Value) {
    let service = LifecycleService::new(pool.clone());
    let definition: RecorridoDefinition = serde_json::from_value(definition).unwrap();
    service
        .create_recorrido(
            &CreateRecorridoInput {
                id: id.to_string(),
                name: format!("Recorrido {id}"),
                description: None,
                definition: Some(definition),
            },
            "editor-1",
        )
        .await
        .unwrap();
    service.publish(id, None, "editor-1").await.unwrap();
}

fn linear_definition() -> serde_json::Value {
    serde_json::json!({
        "id": "lineal",
        "entry_step_id": "nombre",
        "steps": {
            "nombre": {
                "screen_template_id": "screen_form",
                "step_type": "experience",
                "capture": {"nombre": "nombre"},
            },
            "gracias": {
                "screen_template_id": "screen_text",
                "step_type": "experience",
                "props": {"titulo": "Gracias {{state.nombre}}"},
            },
        },
        "edges": [{"from_step_id": "nombre", "to_step_id": "gracias"}],
    })
}

fn input_map(value: serde_json::Value) -> Map<String, Value> {
    value.as_object().unwrap().clone()
}

// ---------------------------------------------------------------------------
// Linear flow
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_linear_run_to_completion(pool: PgPool) {
    publish(&pool, "lineal", linear_definition()).await;
    let runtime = Runtime::new(pool.clone(), registry());

    let started = runtime.start_run("alumno-1", "lineal").await.unwrap();
    let first = started.current_step.unwrap();
    assert_eq!(first.step_id, "nombre");
    assert_eq!(first.screen_template_id, "screen_form");

    let after = runtime
        .submit_step(
            "alumno-1",
            started.run.id,
            "nombre",
            &input_map(serde_json::json!({"nombre": "Ana", "ruido": "ignorado"})),
        )
        .await
        .unwrap();
    let second = after.current_step.unwrap();
    assert_eq!(second.step_id, "gracias");
    // Captured state reaches the next step's props via templates.
    assert_eq!(second.props["titulo"], serde_json::json!("Gracias Ana"));
    // Only declared fields are captured.
    assert_eq!(after.run.context_json, serde_json::json!({"nombre": "Ana"}));

    let done = runtime
        .submit_step("alumno-1", after.run.id, "gracias", &Map::new())
        .await
        .unwrap();
    assert_eq!(done.run.status, run_status::COMPLETED);
    assert!(done.current_step.is_none());

    let events = RunEventRepo::list_for_run(&pool, done.run.id).await.unwrap();
    let types: Vec<_> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types.first(), Some(&event_types::RECORRIDO_STARTED));
    assert_eq!(types.last(), Some(&event_types::RECORRIDO_COMPLETED));
    assert_eq!(
        types
            .iter()
            .filter(|t| **t == event_types::STEP_COMPLETED)
            .count(),
        2
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_start_resumes_an_active_run(pool: PgPool) {
    publish(&pool, "lineal", linear_definition()).await;
    let runtime = Runtime::new(pool, registry());

    let first = runtime.start_run("alumno-1", "lineal").await.unwrap();
    let second = runtime.start_run("alumno-1", "lineal").await.unwrap();
    assert_eq!(first.run.id, second.run.id);

    // A different user gets their own run.
    let other = runtime.start_run("alumno-2", "lineal").await.unwrap();
    assert_ne!(other.run.id, first.run.id);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_runs_stay_pinned_to_their_version(pool: PgPool) {
    publish(&pool, "lineal", linear_definition()).await;
    let runtime = Runtime::new(pool.clone(), registry());
    let started = runtime.start_run("alumno-1", "lineal").await.unwrap();
    assert_eq!(started.run.version, 1);

    // Publish a v2 that renames the entry step.
    let service = LifecycleService::new(pool.clone());
    let v2: RecorridoDefinition = serde_json::from_value(serde_json::json!({
        "id": "lineal",
        "entry_step_id": "otro",
        "steps": {"otro": {"screen_template_id": "screen_text"}},
        "edges": [],
    }))
    .unwrap();
    service.update_draft("lineal", &v2, "editor-1").await.unwrap();
    service.publish("lineal", None, "editor-1").await.unwrap();

    // The in-flight run still executes against v1.
    let current = runtime
        .get_current_step("alumno-1", started.run.id)
        .await
        .unwrap();
    assert_eq!(current.run.version, 1);
    assert_eq!(current.current_step.unwrap().step_id, "nombre");

    // A new user starts on v2.
    let fresh = runtime.start_run("alumno-2", "lineal").await.unwrap();
    assert_eq!(fresh.run.version, 2);
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_submit_for_the_wrong_step_is_rejected(pool: PgPool) {
    publish(&pool, "lineal", linear_definition()).await;
    let runtime = Runtime::new(pool, registry());
    let started = runtime.start_run("alumno-1", "lineal").await.unwrap();

    let err = runtime
        .submit_step("alumno-1", started.run.id, "gracias", &Map::new())
        .await
        .unwrap_err();
    assert_matches!(err, EngineError::WrongStep { ref expected, ref got }
        if expected == "nombre" && got == "gracias");

    // Run untouched.
    let current = runtime
        .get_current_step("alumno-1", started.run.id)
        .await
        .unwrap();
    assert_eq!(current.run.current_step_id, "nombre");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_runs_are_private_to_their_owner(pool: PgPool) {
    publish(&pool, "lineal", linear_definition()).await;
    let runtime = Runtime::new(pool, registry());
    let started = runtime.start_run("alumno-1", "lineal").await.unwrap();

    let err = runtime
        .get_current_step("alumno-2", started.run.id)
        .await
        .unwrap_err();
    assert_matches!(err, EngineError::NotRunOwner);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_dead_end_submit_leaves_run_in_place(pool: PgPool) {
    // The only outgoing edge requires a field the submit does not provide.
    publish(
        &pool,
        "callejon",
        serde_json::json!({
            "id": "callejon",
            "entry_step_id": "uno",
            "steps": {
                "uno": {"screen_template_id": "screen_form", "capture": ["dato"]},
                "dos": {"screen_template_id": "screen_text"},
            },
            "edges": [{
                "from_step_id": "uno", "to_step_id": "dos",
                "condition": {"type": "field_exists", "params": {"field": "dato"}},
            }],
        }),
    )
    .await;
    let runtime = Runtime::new(pool.clone(), registry());
    let started = runtime.start_run("alumno-1", "callejon").await.unwrap();

    let err = runtime
        .submit_step("alumno-1", started.run.id, "uno", &Map::new())
        .await
        .unwrap_err();
    assert_matches!(err, EngineError::NoMatchingEdge { ref step_id } if step_id == "uno");

    let current = runtime
        .get_current_step("alumno-1", started.run.id)
        .await
        .unwrap();
    assert_eq!(current.run.current_step_id, "uno");
    assert_eq!(current.run.status, run_status::RUNNING);

    // Providing the field unblocks the same submit.
    let after = runtime
        .submit_step(
            "alumno-1",
            started.run.id,
            "uno",
            &input_map(serde_json::json!({"dato": 1})),
        )
        .await
        .unwrap();
    assert_eq!(after.run.current_step_id, "dos");
}

// ---------------------------------------------------------------------------
// Motor chaining
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_entry_motor_chain_lands_on_first_screen(pool: PgPool) {
    publish(
        &pool,
        "motorizado",
        serde_json::json!({
            "id": "motorizado",
            "entry_step_id": "presentacion",
            "steps": {
                "presentacion": {
                    "type": "motor", "motor_key": "saludo", "motor_version": 1,
                    "inputs": {"nombre": "{{user_id}}"},
                },
                "bienvenida": {
                    "screen_template_id": "screen_text",
                    "props": {"titulo": "{{state.saludo}}"},
                },
            },
            "edges": [{"from_step_id": "presentacion", "to_step_id": "bienvenida"}],
        }),
    )
    .await;
    let runtime = Runtime::new(pool, registry());

    let started = runtime.start_run("alumno-1", "motorizado").await.unwrap();
    let step = started.current_step.unwrap();
    assert_eq!(step.step_id, "bienvenida");
    assert_eq!(step.props["titulo"], serde_json::json!("Hola, alumno-1"));
    assert_eq!(started.run.current_step_id, "bienvenida");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_motor_after_submit_merges_outputs_and_can_complete(pool: PgPool) {
    // Screen captures puntos, motor folds them into total, then terminal.
    publish(
        &pool,
        "puntaje",
        serde_json::json!({
            "id": "puntaje",
            "entry_step_id": "pregunta",
            "steps": {
                "pregunta": {"screen_template_id": "screen_form", "capture": ["puntos"]},
                "calculo": {"type": "motor", "motor_key": "sumar", "motor_version": 1},
            },
            "edges": [{"from_step_id": "pregunta", "to_step_id": "calculo"}],
        }),
    )
    .await;
    let runtime = Runtime::new(pool, registry());

    let started = runtime.start_run("alumno-1", "puntaje").await.unwrap();
    let done = runtime
        .submit_step(
            "alumno-1",
            started.run.id,
            "pregunta",
            &input_map(serde_json::json!({"puntos": 7})),
        )
        .await
        .unwrap();

    assert_eq!(done.run.status, run_status::COMPLETED);
    assert_eq!(done.run.context_json["total"], serde_json::json!(7));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_failing_motor_leaves_run_on_previous_step(pool: PgPool) {
    publish(
        &pool,
        "fragil",
        serde_json::json!({
            "id": "fragil",
            "entry_step_id": "uno",
            "steps": {
                "uno": {"screen_template_id": "screen_form"},
                "bomba": {"type": "motor", "motor_key": "roto", "motor_version": 1},
            },
            "edges": [{"from_step_id": "uno", "to_step_id": "bomba"}],
        }),
    )
    .await;
    let runtime = Runtime::new(pool, registry());
    let started = runtime.start_run("alumno-1", "fragil").await.unwrap();

    let err = runtime
        .submit_step("alumno-1", started.run.id, "uno", &Map::new())
        .await
        .unwrap_err();
    assert_matches!(err, EngineError::MotorFailed { ref key, .. } if key == "roto");

    let current = runtime
        .get_current_step("alumno-1", started.run.id)
        .await
        .unwrap();
    assert_eq!(current.run.current_step_id, "uno");
    assert_eq!(current.run.status, run_status::RUNNING);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_unregistered_motor_is_a_domain_error(pool: PgPool) {
    publish(
        &pool,
        "desconocido",
        serde_json::json!({
            "id": "desconocido",
            "entry_step_id": "uno",
            "steps": {
                "uno": {"screen_template_id": "screen_form"},
                // Registered key but a version nobody provides.
                "calculo": {"type": "motor", "motor_key": "sumar", "motor_version": 99},
            },
            "edges": [{"from_step_id": "uno", "to_step_id": "calculo"}],
        }),
    )
    .await;
    let runtime = Runtime::new(pool, registry());
    let started = runtime.start_run("alumno-1", "desconocido").await.unwrap();

    let err = runtime
        .submit_step("alumno-1", started.run.id, "uno", &Map::new())
        .await
        .unwrap_err();
    assert_matches!(err, EngineError::MotorNotRegistered { ref key, version }
        if key == "sumar" && version == 99);
}

// ---------------------------------------------------------------------------
// Abandon
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_abandon_is_terminal_and_idempotent(pool: PgPool) {
    publish(&pool, "lineal", linear_definition()).await;
    let runtime = Runtime::new(pool.clone(), registry());
    let started = runtime.start_run("alumno-1", "lineal").await.unwrap();

    let abandoned = runtime
        .abandon_run("alumno-1", started.run.id, Some("me aburrí"))
        .await
        .unwrap();
    assert_eq!(abandoned.status, run_status::ABANDONED);

    // Repeat abandon is a no-op, and only one event is recorded.
    let again = runtime
        .abandon_run("alumno-1", started.run.id, None)
        .await
        .unwrap();
    assert_eq!(again.status, run_status::ABANDONED);

    let events = RunEventRepo::list_for_run(&pool, started.run.id).await.unwrap();
    let abandons = events
        .iter()
        .filter(|e| e.event_type == event_types::RECORRIDO_ABANDONED)
        .count();
    assert_eq!(abandons, 1);

    // Submitting against an abandoned run fails.
    let err = runtime
        .submit_step("alumno-1", started.run.id, "nombre", &Map::new())
        .await
        .unwrap_err();
    assert_matches!(err, EngineError::RunNotActive);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_step_viewed_is_idempotent_per_step(pool: PgPool) {
    publish(&pool, "lineal", linear_definition()).await;
    let runtime = Runtime::new(pool.clone(), registry());
    let started = runtime.start_run("alumno-1", "lineal").await.unwrap();

    runtime.get_current_step("alumno-1", started.run.id).await.unwrap();
    runtime.get_current_step("alumno-1", started.run.id).await.unwrap();

    let events = RunEventRepo::list_for_run(&pool, started.run.id).await.unwrap();
    let views = events
        .iter()
        .filter(|e| e.event_type == event_types::STEP_VIEWED)
        .count();
    assert_eq!(views, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_emit_events_resolve_template_variables(pool: PgPool) {
    publish(
        &pool,
        "emisor",
        serde_json::json!({
            "id": "emisor",
            "entry_step_id": "uno",
            "steps": {
                "uno": {
                    "screen_template_id": "screen_form",
                    "capture": ["respuesta"],
                    "emit": [{
                        "event_type": "respuesta_registrada",
                        "payload_template": {
                            "usuario": "{{user_id}}",
                            "valor": "{{state.respuesta}}",
                        },
                    }],
                },
            },
            "edges": [],
        }),
    )
    .await;
    let runtime = Runtime::new(pool.clone(), registry());
    let started = runtime.start_run("alumno-1", "emisor").await.unwrap();

    runtime
        .submit_step(
            "alumno-1",
            started.run.id,
            "uno",
            &input_map(serde_json::json!({"respuesta": "si"})),
        )
        .await
        .unwrap();

    let events = RunEventRepo::list_for_run(&pool, started.run.id).await.unwrap();
    let emitted = events
        .iter()
        .find(|e| e.event_type == "respuesta_registrada")
        .unwrap();
    assert_eq!(
        emitted.payload_json,
        serde_json::json!({"usuario": "alumno-1", "valor": "si"})
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_start_requires_a_published_version(pool: PgPool) {
    let service = LifecycleService::new(pool.clone());
    service
        .create_recorrido(
            &CreateRecorridoInput {
                id: "borrador".to_string(),
                name: "Sólo borrador".to_string(),
                description: None,
                definition: None,
            },
            "editor-1",
        )
        .await
        .unwrap();

    let runtime = Runtime::new(pool, registry());
    let err = runtime.start_run("alumno-1", "borrador").await.unwrap_err();
    assert_matches!(err, EngineError::NotPublished(_));
}

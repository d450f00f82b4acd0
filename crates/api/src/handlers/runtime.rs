//! Handlers for the student-facing run endpoints.
//!
//! These follow the client app's contract rather than the admin one:
//! logical outcomes (wrong step, dead end, inactive run) come back as
//! HTTP 200 with an `{ error, message }` body the app renders in-flow.
//! Only a malformed request (400), an unexpected failure (500), or a
//! disabled runtime (503) use transport-level status codes.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use recorrido_engine::EngineError;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Body for POST /recorridos/runs/{run_id}/steps/{step_id}/submit.
#[derive(Debug, Default, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub input: Map<String, Value>,
}

/// Body for POST /recorridos/runs/{run_id}/abandon.
#[derive(Debug, Default, Deserialize)]
pub struct AbandonRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Pull the student identity from `X-User-Id`.
fn user_id(headers: &HeaderMap) -> Result<String, Response> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "missing_user",
                    "message": "falta el header X-User-Id",
                })),
            )
                .into_response()
        })
}

/// 503 guard for the runtime feature flag.
fn ensure_runtime_enabled(state: &AppState) -> Result<(), Response> {
    if state.config.runtime_enabled {
        return Ok(());
    }
    Err((
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "error": "runtime_disabled",
            "message": "el runtime de recorridos está deshabilitado",
        })),
    )
        .into_response())
}

/// Map a domain error onto the student wire contract.
fn error_response(err: EngineError) -> Response {
    let status = match &err {
        EngineError::InvalidSlug(_) => StatusCode::BAD_REQUEST,
        EngineError::Db(_) | EngineError::CorruptDefinition(_) => {
            tracing::error!(error = %err, "runtime request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::OK,
    };

    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        "error interno".to_string()
    } else {
        err.to_string()
    };

    (
        status,
        Json(json!({ "error": err.code(), "message": message })),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /recorridos/{recorrido_id}/start
pub async fn start_run(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(recorrido_id): Path<String>,
) -> Response {
    if let Err(resp) = ensure_runtime_enabled(&state) {
        return resp;
    }
    let user = match user_id(&headers) {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    match state.runtime.start_run(&user, &recorrido_id).await {
        Ok(run_state) => Json(json!({
            "run_id": run_state.run.id,
            "current_step": run_state.current_step,
        }))
        .into_response(),
        Err(err) => error_response(err),
    }
}

/// GET /recorridos/runs/{run_id}
pub async fn get_current_step(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(run_id): Path<Uuid>,
) -> Response {
    if let Err(resp) = ensure_runtime_enabled(&state) {
        return resp;
    }
    let user = match user_id(&headers) {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    match state.runtime.get_current_step(&user, run_id).await {
        Ok(run_state) => Json(json!({
            "run": run_state.run,
            "current_step": run_state.current_step,
        }))
        .into_response(),
        Err(err) => error_response(err),
    }
}

/// POST /recorridos/runs/{run_id}/steps/{step_id}/submit
pub async fn submit_step(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((run_id, step_id)): Path<(Uuid, String)>,
    Json(input): Json<SubmitRequest>,
) -> Response {
    if let Err(resp) = ensure_runtime_enabled(&state) {
        return resp;
    }
    let user = match user_id(&headers) {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    match state
        .runtime
        .submit_step(&user, run_id, &step_id, &input.input)
        .await
    {
        Ok(run_state) => match run_state.current_step {
            Some(next) => Json(json!({ "current_step": next })).into_response(),
            None => Json(json!({ "completed": true })).into_response(),
        },
        Err(err) => error_response(err),
    }
}

/// POST /recorridos/runs/{run_id}/abandon
pub async fn abandon_run(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(run_id): Path<Uuid>,
    Json(input): Json<AbandonRequest>,
) -> Response {
    if let Err(resp) = ensure_runtime_enabled(&state) {
        return resp;
    }
    let user = match user_id(&headers) {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    match state
        .runtime
        .abandon_run(&user, run_id, input.reason.as_deref())
        .await
    {
        Ok(_) => Json(json!({ "ok": true })).into_response(),
        Err(err) => error_response(err),
    }
}

//! Handlers for the recorrido registry admin surface.
//!
//! The acting user comes from the `X-User-Id` header and is recorded in the
//! audit trail; real authentication lives in front of this service.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use recorrido_core::definition::RecorridoDefinition;
use recorrido_db::models::draft::RecorridoDraft;
use recorrido_db::models::recorrido::Recorrido;
use recorrido_db::models::version::RecorridoVersion;
use recorrido_db::repositories::{AuditRepo, DraftRepo, RecorridoRepo, VersionRepo};
use recorrido_engine::{CreateRecorridoInput, EngineError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Query parameters for the registry listing.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
}

/// Body for POST /admin/recorridos.
#[derive(Debug, Deserialize)]
pub struct CreateRecorridoRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub definition: Option<RecorridoDefinition>,
}

/// Body for POST /admin/recorridos/{id}/validate. An empty object `{}`
/// validates the stored draft.
#[derive(Debug, Default, Deserialize)]
pub struct ValidateRequest {
    #[serde(default)]
    pub definition: Option<RecorridoDefinition>,
}

/// Body for POST /admin/recorridos/{id}/publish.
#[derive(Debug, Default, Deserialize)]
pub struct PublishRequest {
    #[serde(default)]
    pub release_notes: Option<String>,
}

/// Body for POST /admin/recorridos/{id}/duplicate.
#[derive(Debug, Deserialize)]
pub struct DuplicateRequest {
    pub new_id: String,
    pub new_name: String,
}

/// Body for POST /admin/recorridos/{id}/status.
///
/// `status` is `draft`, `published`, or `restored` (the last one restores a
/// soft-deleted recorrido).
#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: String,
}

/// Body for PUT /admin/recorridos/{id}/canvas.
#[derive(Debug, Deserialize)]
pub struct SaveCanvasRequest {
    pub draft_id: Uuid,
    pub canvas: serde_json::Value,
}

/// Registry row plus its editable and published companions.
#[derive(Debug, Serialize)]
pub struct RecorridoDetail {
    pub recorrido: Recorrido,
    pub draft: Option<RecorridoDraft>,
    pub latest_version: Option<RecorridoVersion>,
}

/// Created recorrido with its first draft.
#[derive(Debug, Serialize)]
pub struct CreatedRecorrido {
    pub recorrido: Recorrido,
    pub draft: RecorridoDraft,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The acting user, from `X-User-Id`. Admin tooling always sends it; the
/// fallback keeps audit rows non-empty for ad-hoc curl sessions.
fn actor(headers: &HeaderMap) -> String {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or("admin")
        .to_string()
}

// ---------------------------------------------------------------------------
// Registry CRUD
// ---------------------------------------------------------------------------

/// GET /admin/recorridos?status=draft|published|deleted
pub async fn list_recorridos(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<impl IntoResponse> {
    let recorridos = RecorridoRepo::list(&state.pool, params.status.as_deref()).await?;
    Ok(Json(DataResponse { data: recorridos }))
}

/// POST /admin/recorridos
pub async fn create_recorrido(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CreateRecorridoRequest>,
) -> AppResult<impl IntoResponse> {
    let (recorrido, draft) = state
        .lifecycle
        .create_recorrido(
            &CreateRecorridoInput {
                id: input.id,
                name: input.name,
                description: input.description,
                definition: input.definition,
            },
            &actor(&headers),
        )
        .await?;

    Ok(Json(DataResponse {
        data: CreatedRecorrido { recorrido, draft },
    }))
}

/// GET /admin/recorridos/{id}
///
/// Registry row (deleted included, this is the admin view) plus the current
/// draft and the latest published version.
pub async fn get_recorrido(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let recorrido = RecorridoRepo::find_by_id(&state.pool, &id)
        .await?
        .ok_or_else(|| AppError::Engine(EngineError::RecorridoNotFound(id.clone())))?;
    let draft = DraftRepo::find_current(&state.pool, &recorrido.id).await?;
    let latest_version = VersionRepo::find_latest(&state.pool, &recorrido.id).await?;

    Ok(Json(DataResponse {
        data: RecorridoDetail {
            recorrido,
            draft,
            latest_version,
        },
    }))
}

/// DELETE /admin/recorridos/{id}
pub async fn soft_delete_recorrido(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let recorrido = state.lifecycle.soft_delete(&id, &actor(&headers)).await?;
    Ok(Json(DataResponse { data: recorrido }))
}

// ---------------------------------------------------------------------------
// Draft editing
// ---------------------------------------------------------------------------

/// PUT /admin/recorridos/{id}/draft
///
/// Replace the current draft's definition. The body is the definition
/// itself; rejected definitions leave the stored draft untouched.
pub async fn update_draft(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(definition): Json<RecorridoDefinition>,
) -> AppResult<impl IntoResponse> {
    let draft = state
        .lifecycle
        .update_draft(&id, &definition, &actor(&headers))
        .await?;
    Ok(Json(DataResponse { data: draft }))
}

/// GET /admin/recorridos/{id}/canvas
pub async fn get_canvas(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let draft = DraftRepo::find_current(&state.pool, &id)
        .await?
        .ok_or_else(|| AppError::Engine(EngineError::DraftNotFound(id.clone())))?;

    Ok(Json(DataResponse {
        data: serde_json::json!({
            "draft_id": draft.id,
            "canvas": draft.canvas_json,
            "canvas_updated_at": draft.canvas_updated_at,
        }),
    }))
}

/// PUT /admin/recorridos/{id}/canvas
///
/// Autosave the editor canvas. A draft id that is no longer current comes
/// back as a 409 so the editor reloads instead of scribbling on a dead row.
pub async fn save_canvas(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<SaveCanvasRequest>,
) -> AppResult<impl IntoResponse> {
    state
        .lifecycle
        .save_canvas(&id, input.draft_id, &input.canvas, &actor(&headers))
        .await?;

    Ok(Json(DataResponse {
        data: serde_json::json!({ "draft_id": input.draft_id }),
    }))
}

// ---------------------------------------------------------------------------
// Validation / publish
// ---------------------------------------------------------------------------

/// POST /admin/recorridos/{id}/validate
///
/// Advisory publish-tier validation. Never fails on validation findings;
/// the report is the payload.
pub async fn validate_draft(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<ValidateRequest>,
) -> AppResult<impl IntoResponse> {
    let report = state
        .lifecycle
        .validate_draft(&id, input.definition.as_ref(), &actor(&headers))
        .await?;
    Ok(Json(DataResponse { data: report }))
}

/// POST /admin/recorridos/{id}/publish
pub async fn publish(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<PublishRequest>,
) -> AppResult<impl IntoResponse> {
    let version = state
        .lifecycle
        .publish(&id, input.release_notes.as_deref(), &actor(&headers))
        .await?;
    Ok(Json(DataResponse { data: version }))
}

/// POST /admin/recorridos/{id}/duplicate
pub async fn duplicate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<DuplicateRequest>,
) -> AppResult<impl IntoResponse> {
    let (recorrido, draft) = state
        .lifecycle
        .duplicate(&id, &input.new_id, &input.new_name, &actor(&headers))
        .await?;
    Ok(Json(DataResponse {
        data: CreatedRecorrido { recorrido, draft },
    }))
}

/// POST /admin/recorridos/{id}/status
pub async fn set_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<SetStatusRequest>,
) -> AppResult<impl IntoResponse> {
    let actor = actor(&headers);
    let recorrido = if input.status == "restored" {
        state.lifecycle.restore(&id, &actor).await?
    } else {
        state.lifecycle.set_status(&id, &input.status, &actor).await?
    };
    Ok(Json(DataResponse { data: recorrido }))
}

// ---------------------------------------------------------------------------
// Versions / audit
// ---------------------------------------------------------------------------

/// GET /admin/recorridos/{id}/versions
pub async fn list_versions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let versions = VersionRepo::list_for_recorrido(&state.pool, &id).await?;
    Ok(Json(DataResponse { data: versions }))
}

/// GET /admin/recorridos/{id}/versions/{version}
pub async fn get_version(
    State(state): State<AppState>,
    Path((id, version)): Path<(String, i32)>,
) -> AppResult<impl IntoResponse> {
    let found = VersionRepo::find(&state.pool, &id, version)
        .await?
        .ok_or_else(|| {
            AppError::Engine(EngineError::VersionNotFound {
                recorrido_id: id.clone(),
                version,
            })
        })?;
    Ok(Json(DataResponse { data: found }))
}

/// GET /admin/recorridos/{id}/audit
pub async fn list_audit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let entries = AuditRepo::list_for_recorrido(&state.pool, &id).await?;
    Ok(Json(DataResponse { data: entries }))
}

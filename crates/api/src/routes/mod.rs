pub mod admin_recorridos;
pub mod health;
pub mod runtime;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /recorridos/{recorrido_id}/start                 start a run (student)
/// /recorridos/runs/{run_id}                        current step (student)
/// /recorridos/runs/{run_id}/steps/{step_id}/submit submit a step (student)
/// /recorridos/runs/{run_id}/abandon                abandon a run (student)
///
/// /admin/recorridos                                list, create
/// /admin/recorridos/{id}                           get, soft-delete
/// /admin/recorridos/{id}/draft                     replace draft definition (PUT)
/// /admin/recorridos/{id}/validate                  advisory validation (POST)
/// /admin/recorridos/{id}/publish                   publish draft (POST)
/// /admin/recorridos/{id}/duplicate                 copy as new recorrido (POST)
/// /admin/recorridos/{id}/status                    set status / restore (POST)
/// /admin/recorridos/{id}/canvas                    get, autosave canvas (GET, PUT)
/// /admin/recorridos/{id}/versions                  list versions (GET)
/// /admin/recorridos/{id}/versions/{version}        get one version (GET)
/// /admin/recorridos/{id}/audit                     audit trail (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Student run surface.
        .nest("/recorridos", runtime::router())
        // Registry administration.
        .nest("/admin/recorridos", admin_recorridos::router())
}

//! Route definitions for the recorrido registry admin surface.

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::admin_recorridos;
use crate::state::AppState;

/// Admin routes mounted at `/admin/recorridos`.
///
/// ```text
/// GET    /                          -> list_recorridos (?status=)
/// POST   /                          -> create_recorrido
/// GET    /{id}                      -> get_recorrido (registry + draft + latest version)
/// DELETE /{id}                      -> soft_delete_recorrido
/// PUT    /{id}/draft                -> update_draft
/// POST   /{id}/validate             -> validate_draft
/// POST   /{id}/publish              -> publish
/// POST   /{id}/duplicate            -> duplicate
/// POST   /{id}/status               -> set_status (draft/published/restore)
/// GET    /{id}/canvas               -> get_canvas
/// PUT    /{id}/canvas               -> save_canvas
/// GET    /{id}/versions             -> list_versions
/// GET    /{id}/versions/{version}   -> get_version
/// GET    /{id}/audit                -> list_audit
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(admin_recorridos::list_recorridos).post(admin_recorridos::create_recorrido),
        )
        .route(
            "/{id}",
            get(admin_recorridos::get_recorrido).delete(admin_recorridos::soft_delete_recorrido),
        )
        .route("/{id}/draft", put(admin_recorridos::update_draft))
        .route("/{id}/validate", post(admin_recorridos::validate_draft))
        .route("/{id}/publish", post(admin_recorridos::publish))
        .route("/{id}/duplicate", post(admin_recorridos::duplicate))
        .route("/{id}/status", post(admin_recorridos::set_status))
        .route(
            "/{id}/canvas",
            get(admin_recorridos::get_canvas).put(admin_recorridos::save_canvas),
        )
        .route("/{id}/versions", get(admin_recorridos::list_versions))
        .route(
            "/{id}/versions/{version}",
            get(admin_recorridos::get_version),
        )
        .route("/{id}/audit", get(admin_recorridos::list_audit))
}

//! Route definitions for the student-facing run surface.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::runtime;
use crate::state::AppState;

/// Student routes mounted at `/recorridos`.
///
/// All routes identify the student via the `X-User-Id` header. Domain
/// errors come back as 200 with an `{ error, message }` body so the
/// client app renders them instead of treating them as transport failures.
///
/// ```text
/// POST /{recorrido_id}/start                    -> start_run
/// GET  /runs/{run_id}                           -> get_current_step
/// POST /runs/{run_id}/steps/{step_id}/submit    -> submit_step
/// POST /runs/{run_id}/abandon                   -> abandon_run
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{recorrido_id}/start", post(runtime::start_run))
        .route("/runs/{run_id}", get(runtime::get_current_step))
        .route(
            "/runs/{run_id}/steps/{step_id}/submit",
            post(runtime::submit_step),
        )
        .route("/runs/{run_id}/abandon", post(runtime::abandon_run))
}

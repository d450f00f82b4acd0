//! Run and run event entities.

use recorrido_core::types::{DbId, Timestamp, VersionNumber};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Run lifecycle states. `completed` and `abandoned` are terminal.
pub mod run_status {
    pub const RUNNING: &str = "running";
    pub const COMPLETED: &str = "completed";
    pub const ABANDONED: &str = "abandoned";
}

/// Run event types appended by the runtime. Domain events emitted by steps
/// use their declared `event_type` verbatim and are not listed here.
pub mod event_types {
    pub const RECORRIDO_STARTED: &str = "recorrido_started";
    pub const STEP_VIEWED: &str = "step_viewed";
    pub const STEP_COMPLETED: &str = "step_completed";
    pub const RECORRIDO_COMPLETED: &str = "recorrido_completed";
    pub const RECORRIDO_ABANDONED: &str = "recorrido_abandoned";
}

/// One run of a recorrido by one user, pinned to a published version.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RecorridoRun {
    pub id: Uuid,
    pub user_id: String,
    pub recorrido_id: String,
    pub version: VersionNumber,
    pub current_step_id: String,
    pub status: String,
    pub context_json: serde_json::Value,
    pub started_at: Timestamp,
    pub last_activity_at: Timestamp,
    pub finished_at: Option<Timestamp>,
}

impl RecorridoRun {
    pub fn is_running(&self) -> bool {
        self.status == run_status::RUNNING
    }
}

/// DTO for starting a run. The id is generated by the repository.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRun {
    pub user_id: String,
    pub recorrido_id: String,
    pub version: VersionNumber,
    pub current_step_id: String,
}

/// One append-only run event.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RecorridoRunEvent {
    pub id: DbId,
    pub run_id: Uuid,
    pub event_type: String,
    pub step_id: Option<String>,
    pub payload_json: serde_json::Value,
    pub idempotency_key: Option<String>,
    pub created_at: Timestamp,
}

/// DTO for appending a run event. A `Some` idempotency key makes the append
/// a no-op when an event with the same key already exists for the run.
#[derive(Debug, Clone, Deserialize)]
pub struct AppendRunEvent {
    pub run_id: Uuid,
    pub event_type: String,
    pub step_id: Option<String>,
    pub payload_json: serde_json::Value,
    pub idempotency_key: Option<String>,
}

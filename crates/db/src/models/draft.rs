//! Draft entity. The mutable working copy of a definition, distinct at the
//! type level from [`crate::models::version::RecorridoVersion`] so the
//! runtime can only ever be handed a published version.

use recorrido_core::types::Timestamp;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A mutable draft row. The id is a system-generated UUID, assigned in the
/// repository and immutable. `canvas_json` is editor layout (node
/// positions, zoom) and is saved independently of `definition_json`, with
/// its own timestamp.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RecorridoDraft {
    pub id: Uuid,
    pub recorrido_id: String,
    pub definition_json: serde_json::Value,
    pub canvas_json: Option<serde_json::Value>,
    pub canvas_updated_at: Option<Timestamp>,
    /// Actor of the last definition or canvas write.
    pub updated_by: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

//! Audit log entity and DTO. Entries are immutable once created (no
//! `updated_at`); the integrity hash is computed by the repository so
//! callers cannot break the chain.

use recorrido_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One audit log entry. `draft_id` is set on entries produced by draft
/// edits (create, update, autosave, duplicate) and null elsewhere.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RecorridoAuditEntry {
    pub id: DbId,
    pub recorrido_id: String,
    pub draft_id: Option<Uuid>,
    pub action: String,
    pub actor: String,
    pub detail_json: serde_json::Value,
    pub integrity_hash: String,
    pub created_at: Timestamp,
}

/// DTO for appending an audit entry. The hash is not part of the DTO.
#[derive(Debug, Clone, Deserialize)]
pub struct AppendAuditEntry {
    pub recorrido_id: String,
    pub draft_id: Option<Uuid>,
    pub action: String,
    pub actor: String,
    pub detail_json: serde_json::Value,
}

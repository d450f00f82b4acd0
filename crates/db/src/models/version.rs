//! Published version entity. Immutable once written.

use recorrido_core::types::{DbId, Timestamp, VersionNumber};
use serde::Serialize;
use sqlx::FromRow;

/// An immutable published version of a recorrido definition.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RecorridoVersion {
    pub id: DbId,
    pub recorrido_id: String,
    pub version: VersionNumber,
    pub definition_json: serde_json::Value,
    pub release_notes: Option<String>,
    pub published_by: String,
    pub published_at: Timestamp,
}

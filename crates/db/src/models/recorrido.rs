//! Journey registry entity and DTOs.

use recorrido_core::types::{Timestamp, VersionNumber};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Registry statuses. `deleted` is soft: the row stays, default listings
/// exclude it, and restore can bring it back.
pub mod status {
    pub const DRAFT: &str = "draft";
    pub const PUBLISHED: &str = "published";
    pub const DELETED: &str = "deleted";

    pub const ALL: &[&str] = &[DRAFT, PUBLISHED, DELETED];
}

/// A registered recorrido. The id is the journey's slug and doubles as the
/// `id` inside its definitions.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Recorrido {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub current_draft_id: Option<Uuid>,
    pub current_published_version: Option<VersionNumber>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for registering a new recorrido.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRecorrido {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

/// Partial patch for registry metadata. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRecorridoMeta {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub current_draft_id: Option<Uuid>,
    pub current_published_version: Option<VersionNumber>,
}

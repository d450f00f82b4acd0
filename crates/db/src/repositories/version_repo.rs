//! Repository for the `recorrido_versions` table.
//!
//! Append-only: this repository deliberately has no update or delete
//! method. The unique constraint on `(recorrido_id, version)` is the last
//! line of defence against two concurrent publishes minting the same
//! version number.

use recorrido_core::types::VersionNumber;
use sqlx::PgPool;

use crate::models::version::RecorridoVersion;

/// Column list for SELECT queries.
const COLUMNS: &str = "\
    id, recorrido_id, version, definition_json, release_notes, \
    published_by, published_at";

/// Provides append and lookup operations for published versions.
pub struct VersionRepo;

impl VersionRepo {
    /// Highest published version number for a recorrido, if any.
    pub async fn latest_version_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        recorrido_id: &str,
    ) -> Result<Option<VersionNumber>, sqlx::Error> {
        sqlx::query_scalar::<_, Option<VersionNumber>>(
            "SELECT MAX(version) FROM recorrido_versions WHERE recorrido_id = $1",
        )
        .bind(recorrido_id)
        .fetch_one(&mut **tx)
        .await
    }

    /// Append a new version inside the publish transaction.
    pub async fn create_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        recorrido_id: &str,
        version: VersionNumber,
        definition: &serde_json::Value,
        release_notes: Option<&str>,
        published_by: &str,
    ) -> Result<RecorridoVersion, sqlx::Error> {
        let query = format!(
            "INSERT INTO recorrido_versions \
             (recorrido_id, version, definition_json, release_notes, published_by) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RecorridoVersion>(&query)
            .bind(recorrido_id)
            .bind(version)
            .bind(definition)
            .bind(release_notes)
            .bind(published_by)
            .fetch_one(&mut **tx)
            .await
    }

    /// Fetch one specific version.
    pub async fn find(
        pool: &PgPool,
        recorrido_id: &str,
        version: VersionNumber,
    ) -> Result<Option<RecorridoVersion>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM recorrido_versions \
             WHERE recorrido_id = $1 AND version = $2"
        );
        sqlx::query_as::<_, RecorridoVersion>(&query)
            .bind(recorrido_id)
            .bind(version)
            .fetch_optional(pool)
            .await
    }

    /// Fetch the latest version for a recorrido.
    pub async fn find_latest(
        pool: &PgPool,
        recorrido_id: &str,
    ) -> Result<Option<RecorridoVersion>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM recorrido_versions \
             WHERE recorrido_id = $1 ORDER BY version DESC LIMIT 1"
        );
        sqlx::query_as::<_, RecorridoVersion>(&query)
            .bind(recorrido_id)
            .fetch_optional(pool)
            .await
    }

    /// List all versions of a recorrido, newest first.
    pub async fn list_for_recorrido(
        pool: &PgPool,
        recorrido_id: &str,
    ) -> Result<Vec<RecorridoVersion>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM recorrido_versions \
             WHERE recorrido_id = $1 ORDER BY version DESC"
        );
        sqlx::query_as::<_, RecorridoVersion>(&query)
            .bind(recorrido_id)
            .fetch_all(pool)
            .await
    }
}

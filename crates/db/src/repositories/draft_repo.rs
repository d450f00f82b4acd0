//! Repository for the `recorrido_drafts` table.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::draft::RecorridoDraft;

/// Column list for SELECT queries.
const COLUMNS: &str = "\
    id, recorrido_id, definition_json, canvas_json, canvas_updated_at, \
    updated_by, created_at, updated_at";

/// Provides draft operations: the mutable side of the draft/version split.
pub struct DraftRepo;

impl DraftRepo {
    /// Insert a fresh draft row for a recorrido. The id is generated here;
    /// it is never supplied by callers.
    pub async fn create(
        pool: &PgPool,
        recorrido_id: &str,
        definition: &serde_json::Value,
        actor: &str,
    ) -> Result<RecorridoDraft, sqlx::Error> {
        let query = format!(
            "INSERT INTO recorrido_drafts (id, recorrido_id, definition_json, updated_by) \
             VALUES ($1, $2, $3, $4) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RecorridoDraft>(&query)
            .bind(Uuid::new_v4())
            .bind(recorrido_id)
            .bind(definition)
            .bind(actor)
            .fetch_one(pool)
            .await
    }

    /// Same insert inside an open transaction (used by duplicate).
    pub async fn create_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        recorrido_id: &str,
        definition: &serde_json::Value,
        actor: &str,
    ) -> Result<RecorridoDraft, sqlx::Error> {
        let query = format!(
            "INSERT INTO recorrido_drafts (id, recorrido_id, definition_json, updated_by) \
             VALUES ($1, $2, $3, $4) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RecorridoDraft>(&query)
            .bind(Uuid::new_v4())
            .bind(recorrido_id)
            .bind(definition)
            .bind(actor)
            .fetch_one(&mut **tx)
            .await
    }

    /// Find a draft by its id.
    pub async fn find_by_id(
        pool: &PgPool,
        draft_id: Uuid,
    ) -> Result<Option<RecorridoDraft>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM recorrido_drafts WHERE id = $1");
        sqlx::query_as::<_, RecorridoDraft>(&query)
            .bind(draft_id)
            .fetch_optional(pool)
            .await
    }

    /// Find the most recently touched draft for a recorrido.
    pub async fn find_current(
        pool: &PgPool,
        recorrido_id: &str,
    ) -> Result<Option<RecorridoDraft>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM recorrido_drafts \
             WHERE recorrido_id = $1 ORDER BY updated_at DESC LIMIT 1"
        );
        sqlx::query_as::<_, RecorridoDraft>(&query)
            .bind(recorrido_id)
            .fetch_optional(pool)
            .await
    }

    /// Replace a draft's definition. Returns `None` if the id is unknown.
    pub async fn update_definition(
        pool: &PgPool,
        draft_id: Uuid,
        definition: &serde_json::Value,
        actor: &str,
    ) -> Result<Option<RecorridoDraft>, sqlx::Error> {
        let query = format!(
            "UPDATE recorrido_drafts \
             SET definition_json = $2, updated_by = $3, updated_at = now() \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RecorridoDraft>(&query)
            .bind(draft_id)
            .bind(definition)
            .bind(actor)
            .fetch_optional(pool)
            .await
    }

    /// Save the editor canvas against a specific draft row.
    ///
    /// Scoped to `(recorrido_id, draft_id)` and returns the affected row
    /// count: 0 means the draft id no longer belongs to the recorrido (for
    /// example after a duplicate swapped the current draft), which callers
    /// surface as a stale-draft conflict rather than silently writing to a
    /// dead row.
    pub async fn update_canvas(
        pool: &PgPool,
        recorrido_id: &str,
        draft_id: Uuid,
        canvas: &serde_json::Value,
        actor: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE recorrido_drafts \
             SET canvas_json = $3, canvas_updated_at = now(), updated_by = $4 \
             WHERE id = $2 AND recorrido_id = $1",
        )
        .bind(recorrido_id)
        .bind(draft_id)
        .bind(canvas)
        .bind(actor)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}

//! Repository for the `recorridos` registry table.

use recorrido_core::types::VersionNumber;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::recorrido::{status, CreateRecorrido, Recorrido, UpdateRecorridoMeta};

/// Column list for SELECT queries.
const COLUMNS: &str = "\
    id, name, description, status, current_draft_id, \
    current_published_version, created_at, updated_at";

/// Provides registry operations for recorridos.
pub struct RecorridoRepo;

impl RecorridoRepo {
    /// Register a new recorrido in `draft` status.
    pub async fn create(pool: &PgPool, dto: &CreateRecorrido) -> Result<Recorrido, sqlx::Error> {
        let query = format!(
            "INSERT INTO recorridos (id, name, description) \
             VALUES ($1, $2, $3) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Recorrido>(&query)
            .bind(&dto.id)
            .bind(&dto.name)
            .bind(&dto.description)
            .fetch_one(pool)
            .await
    }

    /// Same insert inside an open transaction (used by duplicate).
    pub async fn create_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        dto: &CreateRecorrido,
    ) -> Result<Recorrido, sqlx::Error> {
        let query = format!(
            "INSERT INTO recorridos (id, name, description) \
             VALUES ($1, $2, $3) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Recorrido>(&query)
            .bind(&dto.id)
            .bind(&dto.name)
            .bind(&dto.description)
            .fetch_one(&mut **tx)
            .await
    }

    /// Take a row lock on a recorrido for the rest of the transaction.
    ///
    /// Publish locks the registry row before computing the next version
    /// number, so concurrent publishes of the same recorrido serialize
    /// instead of racing MAX(version) into a unique violation.
    pub async fn lock_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT id FROM recorridos WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_one(&mut **tx)
            .await?;
        Ok(())
    }

    /// Find a recorrido by its slug id, soft-deleted rows included.
    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Recorrido>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM recorridos WHERE id = $1");
        sqlx::query_as::<_, Recorrido>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List recorridos, newest first.
    ///
    /// With a status filter, returns only that status; without one, returns
    /// everything except soft-deleted rows.
    pub async fn list(pool: &PgPool, status: Option<&str>) -> Result<Vec<Recorrido>, sqlx::Error> {
        match status {
            Some(s) => {
                let query = format!(
                    "SELECT {COLUMNS} FROM recorridos WHERE status = $1 ORDER BY created_at DESC"
                );
                sqlx::query_as::<_, Recorrido>(&query)
                    .bind(s)
                    .fetch_all(pool)
                    .await
            }
            None => {
                let query = format!(
                    "SELECT {COLUMNS} FROM recorridos WHERE status <> $1 ORDER BY created_at DESC"
                );
                sqlx::query_as::<_, Recorrido>(&query)
                    .bind(status::DELETED)
                    .fetch_all(pool)
                    .await
            }
        }
    }

    /// Apply a partial metadata patch. Returns `None` if the id is unknown.
    pub async fn update_meta(
        pool: &PgPool,
        id: &str,
        dto: &UpdateRecorridoMeta,
    ) -> Result<Option<Recorrido>, sqlx::Error> {
        let (query, binds) = match build_meta_update(dto) {
            Some(built) => built,
            None => return Self::find_by_id(pool, id).await,
        };
        bind_meta_values(sqlx::query_as::<_, Recorrido>(&query).bind(id), &binds)
            .fetch_optional(pool)
            .await
    }

    /// Same patch inside an open transaction.
    pub async fn update_meta_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: &str,
        dto: &UpdateRecorridoMeta,
    ) -> Result<Option<Recorrido>, sqlx::Error> {
        let (query, binds) = match build_meta_update(dto) {
            Some(built) => built,
            None => {
                let query = format!("SELECT {COLUMNS} FROM recorridos WHERE id = $1");
                return sqlx::query_as::<_, Recorrido>(&query)
                    .bind(id)
                    .fetch_optional(&mut **tx)
                    .await;
            }
        };
        bind_meta_values(sqlx::query_as::<_, Recorrido>(&query).bind(id), &binds)
            .fetch_optional(&mut **tx)
            .await
    }

    /// Soft-delete: flip status to `deleted`, keep every row.
    ///
    /// Returns the updated row, or `None` if the id is unknown or the
    /// recorrido is already deleted.
    pub async fn soft_delete(pool: &PgPool, id: &str) -> Result<Option<Recorrido>, sqlx::Error> {
        let query = format!(
            "UPDATE recorridos SET status = $2, updated_at = now() \
             WHERE id = $1 AND status <> $2 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Recorrido>(&query)
            .bind(id)
            .bind(status::DELETED)
            .fetch_optional(pool)
            .await
    }
}

// ---------------------------------------------------------------------------
// Internal helpers for the dynamic metadata patch
// ---------------------------------------------------------------------------

enum MetaBindValue {
    Text(String),
    Uuid(Uuid),
    Int(VersionNumber),
}

/// Build the UPDATE statement for the active fields of a patch.
///
/// Returns `None` when the patch is empty. `$1` is reserved for the id.
fn build_meta_update(dto: &UpdateRecorridoMeta) -> Option<(String, Vec<MetaBindValue>)> {
    let mut sets: Vec<String> = Vec::new();
    let mut bind_idx = 2u32;
    let mut binds: Vec<MetaBindValue> = Vec::new();

    if let Some(ref name) = dto.name {
        sets.push(format!("name = ${bind_idx}"));
        bind_idx += 1;
        binds.push(MetaBindValue::Text(name.clone()));
    }

    if let Some(ref description) = dto.description {
        sets.push(format!("description = ${bind_idx}"));
        bind_idx += 1;
        binds.push(MetaBindValue::Text(description.clone()));
    }

    if let Some(ref status) = dto.status {
        sets.push(format!("status = ${bind_idx}"));
        bind_idx += 1;
        binds.push(MetaBindValue::Text(status.clone()));
    }

    if let Some(draft_id) = dto.current_draft_id {
        sets.push(format!("current_draft_id = ${bind_idx}"));
        bind_idx += 1;
        binds.push(MetaBindValue::Uuid(draft_id));
    }

    if let Some(version) = dto.current_published_version {
        sets.push(format!("current_published_version = ${bind_idx}"));
        let _ = bind_idx;
        binds.push(MetaBindValue::Int(version));
    }

    if sets.is_empty() {
        return None;
    }

    let query = format!(
        "UPDATE recorridos SET {}, updated_at = now() WHERE id = $1 RETURNING {COLUMNS}",
        sets.join(", ")
    );
    Some((query, binds))
}

fn bind_meta_values<'q>(
    mut q: sqlx::query::QueryAs<'q, sqlx::Postgres, Recorrido, sqlx::postgres::PgArguments>,
    binds: &'q [MetaBindValue],
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, Recorrido, sqlx::postgres::PgArguments> {
    for val in binds {
        match val {
            MetaBindValue::Text(v) => q = q.bind(v.as_str()),
            MetaBindValue::Uuid(v) => q = q.bind(*v),
            MetaBindValue::Int(v) => q = q.bind(*v),
        }
    }
    q
}

//! Repository for the `recorrido_audit_log` table.
//!
//! Write-once read-many: append and list, nothing else. The repository
//! computes each entry's integrity hash itself, chaining over the previous
//! entry for the same recorrido, so callers cannot produce an unchained row.

use recorrido_core::audit::chain_hash;
use sqlx::PgPool;

use crate::models::audit::{AppendAuditEntry, RecorridoAuditEntry};

/// Column list for SELECT queries.
const COLUMNS: &str = "\
    id, recorrido_id, draft_id, action, actor, detail_json, integrity_hash, \
    created_at";

/// Provides append and query operations for the audit trail.
pub struct AuditRepo;

impl AuditRepo {
    /// Append an entry in its own transaction.
    pub async fn append(
        pool: &PgPool,
        dto: &AppendAuditEntry,
    ) -> Result<RecorridoAuditEntry, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let entry = Self::append_in_tx(&mut tx, dto).await?;
        tx.commit().await?;
        Ok(entry)
    }

    /// Append an entry inside an open transaction.
    ///
    /// The previous hash is read with `FOR UPDATE` on the latest row so two
    /// concurrent appends for the same recorrido serialise instead of both
    /// chaining over the same predecessor.
    pub async fn append_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        dto: &AppendAuditEntry,
    ) -> Result<RecorridoAuditEntry, sqlx::Error> {
        let prev_hash = sqlx::query_scalar::<_, String>(
            "SELECT integrity_hash FROM recorrido_audit_log \
             WHERE recorrido_id = $1 ORDER BY id DESC LIMIT 1 FOR UPDATE",
        )
        .bind(&dto.recorrido_id)
        .fetch_optional(&mut **tx)
        .await?;

        let hash = chain_hash(
            prev_hash.as_deref(),
            &dto.recorrido_id,
            &dto.action,
            &dto.actor,
            &dto.detail_json,
        );

        let query = format!(
            "INSERT INTO recorrido_audit_log \
             (recorrido_id, draft_id, action, actor, detail_json, integrity_hash) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RecorridoAuditEntry>(&query)
            .bind(&dto.recorrido_id)
            .bind(dto.draft_id)
            .bind(&dto.action)
            .bind(&dto.actor)
            .bind(&dto.detail_json)
            .bind(&hash)
            .fetch_one(&mut **tx)
            .await
    }

    /// List a recorrido's audit trail in insertion order.
    pub async fn list_for_recorrido(
        pool: &PgPool,
        recorrido_id: &str,
    ) -> Result<Vec<RecorridoAuditEntry>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM recorrido_audit_log \
             WHERE recorrido_id = $1 ORDER BY id ASC"
        );
        sqlx::query_as::<_, RecorridoAuditEntry>(&query)
            .bind(recorrido_id)
            .fetch_all(pool)
            .await
    }
}

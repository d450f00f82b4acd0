//! Repository for the `recorrido_run_events` table. Append-only.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::run::{AppendRunEvent, RecorridoRunEvent};

/// Column list for SELECT queries.
const COLUMNS: &str = "\
    id, run_id, event_type, step_id, payload_json, idempotency_key, created_at";

/// Provides append and query operations for run events.
pub struct RunEventRepo;

impl RunEventRepo {
    /// Append an event.
    ///
    /// With an idempotency key, a repeat append for the same `(run_id,
    /// key)` is swallowed by `ON CONFLICT DO NOTHING` and returns `None`.
    pub async fn append(
        pool: &PgPool,
        dto: &AppendRunEvent,
    ) -> Result<Option<RecorridoRunEvent>, sqlx::Error> {
        let query = format!(
            "INSERT INTO recorrido_run_events \
             (run_id, event_type, step_id, payload_json, idempotency_key) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (run_id, idempotency_key) WHERE idempotency_key IS NOT NULL \
             DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RecorridoRunEvent>(&query)
            .bind(dto.run_id)
            .bind(&dto.event_type)
            .bind(&dto.step_id)
            .bind(&dto.payload_json)
            .bind(&dto.idempotency_key)
            .fetch_optional(pool)
            .await
    }

    /// List a run's events in insertion order.
    pub async fn list_for_run(
        pool: &PgPool,
        run_id: Uuid,
    ) -> Result<Vec<RecorridoRunEvent>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM recorrido_run_events \
             WHERE run_id = $1 ORDER BY id ASC"
        );
        sqlx::query_as::<_, RecorridoRunEvent>(&query)
            .bind(run_id)
            .fetch_all(pool)
            .await
    }
}

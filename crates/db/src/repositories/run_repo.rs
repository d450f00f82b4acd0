//! Repository for the `recorrido_runs` table.
//!
//! State transitions are guarded UPDATEs: each one re-checks the expected
//! current state in its WHERE clause and reports via affected-row count or
//! RETURNING, so concurrent submits against the same run cannot both win.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::run::{run_status, CreateRun, RecorridoRun};

/// Column list for SELECT queries.
const COLUMNS: &str = "\
    id, user_id, recorrido_id, version, current_step_id, status, \
    context_json, started_at, last_activity_at, finished_at";

/// Provides run state operations.
pub struct RunRepo;

impl RunRepo {
    /// Start a run at the given step with an empty context.
    pub async fn create(pool: &PgPool, dto: &CreateRun) -> Result<RecorridoRun, sqlx::Error> {
        let query = format!(
            "INSERT INTO recorrido_runs (id, user_id, recorrido_id, version, current_step_id) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RecorridoRun>(&query)
            .bind(Uuid::new_v4())
            .bind(&dto.user_id)
            .bind(&dto.recorrido_id)
            .bind(dto.version)
            .bind(&dto.current_step_id)
            .fetch_one(pool)
            .await
    }

    /// Find a run by id.
    pub async fn find_by_id(
        pool: &PgPool,
        run_id: Uuid,
    ) -> Result<Option<RecorridoRun>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM recorrido_runs WHERE id = $1");
        sqlx::query_as::<_, RecorridoRun>(&query)
            .bind(run_id)
            .fetch_optional(pool)
            .await
    }

    /// Find a user's active run for a recorrido, if one exists.
    pub async fn find_active_for_user(
        pool: &PgPool,
        user_id: &str,
        recorrido_id: &str,
    ) -> Result<Option<RecorridoRun>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM recorrido_runs \
             WHERE user_id = $1 AND recorrido_id = $2 AND status = $3 \
             ORDER BY started_at DESC LIMIT 1"
        );
        sqlx::query_as::<_, RecorridoRun>(&query)
            .bind(user_id)
            .bind(recorrido_id)
            .bind(run_status::RUNNING)
            .fetch_optional(pool)
            .await
    }

    /// Advance a running run from `expected_step_id` to `next_step_id`,
    /// replacing the context.
    ///
    /// The WHERE clause pins the step the caller computed the transition
    /// from; `None` means the run has moved on (or finished) in the
    /// meantime and the caller must treat the submit as a conflict.
    pub async fn advance(
        pool: &PgPool,
        run_id: Uuid,
        expected_step_id: &str,
        next_step_id: &str,
        context: &serde_json::Value,
    ) -> Result<Option<RecorridoRun>, sqlx::Error> {
        let query = format!(
            "UPDATE recorrido_runs \
             SET current_step_id = $3, context_json = $4, last_activity_at = now() \
             WHERE id = $1 AND current_step_id = $2 AND status = $5 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RecorridoRun>(&query)
            .bind(run_id)
            .bind(expected_step_id)
            .bind(next_step_id)
            .bind(context)
            .bind(run_status::RUNNING)
            .fetch_optional(pool)
            .await
    }

    /// Complete a running run at `expected_step_id`. Same guard as
    /// [`Self::advance`].
    pub async fn complete(
        pool: &PgPool,
        run_id: Uuid,
        expected_step_id: &str,
        context: &serde_json::Value,
    ) -> Result<Option<RecorridoRun>, sqlx::Error> {
        let query = format!(
            "UPDATE recorrido_runs \
             SET status = $4, context_json = $3, last_activity_at = now(), finished_at = now() \
             WHERE id = $1 AND current_step_id = $2 AND status = $5 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RecorridoRun>(&query)
            .bind(run_id)
            .bind(expected_step_id)
            .bind(context)
            .bind(run_status::COMPLETED)
            .bind(run_status::RUNNING)
            .fetch_optional(pool)
            .await
    }

    /// Abandon a running run. `None` means the run was not running, which
    /// callers treat as the idempotent repeat case.
    pub async fn abandon(
        pool: &PgPool,
        run_id: Uuid,
    ) -> Result<Option<RecorridoRun>, sqlx::Error> {
        let query = format!(
            "UPDATE recorrido_runs \
             SET status = $2, last_activity_at = now(), finished_at = now() \
             WHERE id = $1 AND status = $3 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RecorridoRun>(&query)
            .bind(run_id)
            .bind(run_status::ABANDONED)
            .bind(run_status::RUNNING)
            .fetch_optional(pool)
            .await
    }

    /// Bump `last_activity_at` on a read.
    pub async fn touch(pool: &PgPool, run_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE recorrido_runs SET last_activity_at = now() WHERE id = $1")
            .bind(run_id)
            .execute(pool)
            .await
            .map(|_| ())
    }
}

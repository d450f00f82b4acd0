use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use recorrido_engine::EngineError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`EngineError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
///
/// Student runtime handlers do NOT route domain errors through this type:
/// they answer 200 with an `{ error, message }` body instead (see
/// `handlers::runtime`). This type serves the admin surface, where the
/// editor expects real HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `recorrido_engine`.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Validation failures carry their error lists alongside the message.
        let details = match &self {
            AppError::Engine(EngineError::DraftInvalid { errors }) => {
                Some(json!({ "errors": errors }))
            }
            AppError::Engine(EngineError::PublishBlocked { errors, warnings }) => {
                Some(json!({ "errors": errors, "warnings": warnings }))
            }
            _ => None,
        };

        let (status, code, message) = match &self {
            AppError::Engine(engine) => classify_engine_error(engine),
            AppError::Database(err) => classify_sqlx_error(err),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let mut body = json!({
            "error": message,
            "code": code,
        });
        if let Some(details) = details {
            body["details"] = details;
        }

        (status, axum::Json(body)).into_response()
    }
}

/// Map a domain error to an HTTP status, error code, and message.
fn classify_engine_error(err: &EngineError) -> (StatusCode, &'static str, String) {
    let status = match err {
        EngineError::RecorridoNotFound(_)
        | EngineError::DraftNotFound(_)
        | EngineError::VersionNotFound { .. }
        | EngineError::RunNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::AlreadyExists(_)
        | EngineError::StaleDraft
        | EngineError::InvalidStatus(_)
        | EngineError::SubmitConflict => StatusCode::CONFLICT,
        EngineError::InvalidSlug(_)
        | EngineError::DraftInvalid { .. }
        | EngineError::PublishBlocked { .. }
        | EngineError::NotPublished(_) => StatusCode::BAD_REQUEST,
        EngineError::NotRunOwner => StatusCode::FORBIDDEN,
        EngineError::RunNotActive
        | EngineError::WrongStep { .. }
        | EngineError::NoMatchingEdge { .. } => StatusCode::CONFLICT,
        EngineError::MotorNotRegistered { .. }
        | EngineError::MotorFailed { .. }
        | EngineError::MotorChainTooLong { .. }
        | EngineError::CorruptDefinition(_) => StatusCode::INTERNAL_SERVER_ERROR,
        EngineError::Db(inner) => return classify_sqlx_error(inner),
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %err, "Engine error");
    }

    (status, err.code(), err.to_string())
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Unique constraint violations (constraint name starting with `uq_`) map to 409.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        sqlx::Error::Database(db_err) => {
            // PostgreSQL unique constraint violation: error code 23505
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                if constraint.starts_with("uq_") {
                    return (
                        StatusCode::CONFLICT,
                        "CONFLICT",
                        format!("Duplicate value violates unique constraint: {constraint}"),
                    );
                }
            }
            tracing::error!(error = %db_err, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
        other => {
            tracing::error!(error = %other, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}

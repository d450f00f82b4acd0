//! Engine error taxonomy.
//!
//! Lifecycle and runtime failures are distinct variants rather than strings
//! so the API layer can map each one to its own wire code. `code()` is that
//! wire code; `Display` is the human message.

use recorrido_core::types::VersionNumber;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // --- lookups ---
    #[error("recorrido \"{0}\" no encontrado")]
    RecorridoNotFound(String),

    #[error("recorrido \"{0}\" no tiene draft")]
    DraftNotFound(String),

    #[error("recorrido \"{recorrido_id}\" no tiene versión {version}")]
    VersionNotFound {
        recorrido_id: String,
        version: VersionNumber,
    },

    #[error("run {0} no encontrado")]
    RunNotFound(Uuid),

    // --- lifecycle ---
    #[error("el recorrido \"{0}\" ya existe")]
    AlreadyExists(String),

    #[error("{0}")]
    InvalidSlug(String),

    #[error("la definición no pasa la validación de draft")]
    DraftInvalid { errors: Vec<String> },

    #[error("la definición no pasa la validación de publicación")]
    PublishBlocked {
        errors: Vec<String>,
        warnings: Vec<String>,
    },

    #[error("recorrido \"{0}\" no tiene ninguna versión publicada")]
    NotPublished(String),

    #[error("el draft ya no es el actual")]
    StaleDraft,

    #[error("transición de estado inválida: {0}")]
    InvalidStatus(String),

    // --- runtime ---
    #[error("el run pertenece a otro usuario")]
    NotRunOwner,

    #[error("el run ya no está activo")]
    RunNotActive,

    #[error("step incorrecto: el run está en \"{expected}\", se envió \"{got}\"")]
    WrongStep { expected: String, got: String },

    #[error("ninguna arista saliente de \"{step_id}\" aplica")]
    NoMatchingEdge { step_id: String },

    #[error("motor \"{key}\" v{version} no está registrado")]
    MotorNotRegistered { key: String, version: i64 },

    #[error("motor \"{key}\" falló: {message}")]
    MotorFailed { key: String, message: String },

    #[error("la cadena de motores supera el límite de {limit} pasos")]
    MotorChainTooLong { limit: usize },

    #[error("el run avanzó de forma concurrente")]
    SubmitConflict,

    // --- plumbing ---
    #[error("definición corrupta: {0}")]
    CorruptDefinition(String),

    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl EngineError {
    /// Stable machine-readable code for wire responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RecorridoNotFound(_) => "recorrido_not_found",
            Self::DraftNotFound(_) => "draft_not_found",
            Self::VersionNotFound { .. } => "version_not_found",
            Self::RunNotFound(_) => "run_not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::InvalidSlug(_) => "invalid_slug",
            Self::DraftInvalid { .. } => "draft_invalid",
            Self::PublishBlocked { .. } => "publish_blocked",
            Self::NotPublished(_) => "not_published",
            Self::StaleDraft => "stale_draft",
            Self::InvalidStatus(_) => "invalid_status",
            Self::NotRunOwner => "not_run_owner",
            Self::RunNotActive => "run_not_active",
            Self::WrongStep { .. } => "wrong_step",
            Self::NoMatchingEdge { .. } => "no_matching_edge",
            Self::MotorNotRegistered { .. } => "motor_not_registered",
            Self::MotorFailed { .. } => "motor_failed",
            Self::MotorChainTooLong { .. } => "motor_chain_too_long",
            Self::SubmitConflict => "submit_conflict",
            Self::CorruptDefinition(_) => "corrupt_definition",
            Self::Db(_) => "database_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_snake_case_and_distinct() {
        let errors = [
            EngineError::RecorridoNotFound("x".into()),
            EngineError::StaleDraft,
            EngineError::SubmitConflict,
            EngineError::WrongStep {
                expected: "a".into(),
                got: "b".into(),
            },
        ];
        let codes: Vec<_> = errors.iter().map(EngineError::code).collect();
        for code in &codes {
            assert!(code.chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
        let mut unique = codes.clone();
        unique.dedup();
        assert_eq!(codes, unique);
    }
}

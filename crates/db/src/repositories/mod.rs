//! Repositories, one per table group.

pub mod audit_repo;
pub mod draft_repo;
pub mod recorrido_repo;
pub mod run_event_repo;
pub mod run_repo;
pub mod version_repo;

pub use audit_repo::AuditRepo;
pub use draft_repo::DraftRepo;
pub use recorrido_repo::RecorridoRepo;
pub use run_event_repo::RunEventRepo;
pub use run_repo::RunRepo;
pub use version_repo::VersionRepo;

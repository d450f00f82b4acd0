use std::sync::Arc;

use recorrido_engine::{LifecycleService, Runtime};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: recorrido_db::DbPool,
    /// Server configuration (accessed by middleware and handlers).
    pub config: Arc<ServerConfig>,
    /// Registry lifecycle service (drafts, versions, audit).
    pub lifecycle: LifecycleService,
    /// Step-graph runtime (runs, submissions, motor chains).
    pub runtime: Runtime,
}

//! Entity models and DTOs, one module per table group.

pub mod audit;
pub mod draft;
pub mod recorrido;
pub mod run;
pub mod version;

//! Pure domain logic for the Recorrido Engine.
//!
//! This crate has zero internal dependencies so it can be used by the
//! repository layer, the engine, and any future CLI or worker tooling.
//! It contains the versioned definition model, the normalizer, the
//! two-tier (draft/publish) validator, and the pure evaluation helpers
//! the runtime relies on (conditions, capture, payload templates).

pub mod audit;
pub mod capture;
pub mod condition;
pub mod definition;
pub mod error;
pub mod hashing;
pub mod normalize;
pub mod slug;
pub mod template;
pub mod types;
pub mod validate;

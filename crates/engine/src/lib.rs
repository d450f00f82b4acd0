//! Engine layer: the definition lifecycle service and the step-graph
//! runtime, built on the repositories in `recorrido-db`.
//!
//! Both services are constructed once at startup with an injected pool
//! (and, for the runtime, a motor registry) and shared behind the API
//! state. There are no globals.

pub mod error;
pub mod lifecycle;
pub mod motor;
pub mod runtime;

pub use error::EngineError;
pub use lifecycle::{CreateRecorridoInput, LifecycleService};
pub use motor::{MotorError, MotorRegistry, MotorTransform};
pub use runtime::{RenderSpec, RunState, Runtime};

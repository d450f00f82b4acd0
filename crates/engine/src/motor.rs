//! Motor transforms and their registry.
//!
//! A motor is a synchronous server-side computation pinned by exact
//! `(key, version)`. Definitions reference motors by that pair; the
//! registry is populated at startup and injected into the runtime, so a
//! definition referencing an unknown motor fails at execution with a
//! domain error rather than at publish.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

/// Failure raised by a motor implementation.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct MotorError(pub String);

impl MotorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A pure server-side step computation.
///
/// `execute` receives the resolved inputs from the step definition and a
/// read-only view of the run context; its outputs are merged into the
/// context by the runtime. Implementations must not hold mutable state
/// across calls.
pub trait MotorTransform: Send + Sync {
    fn key(&self) -> &str;
    fn version(&self) -> i64;
    fn execute(
        &self,
        inputs: &Map<String, Value>,
        state: &Map<String, Value>,
    ) -> Result<Map<String, Value>, MotorError>;
}

/// Registry of motor transforms keyed by exact `(key, version)`.
///
/// No fallback resolution: `("score", 2)` does not serve a step pinned to
/// `("score", 1)`.
#[derive(Default)]
pub struct MotorRegistry {
    motors: HashMap<(String, i64), Arc<dyn MotorTransform>>,
}

impl MotorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transform. A repeat registration for the same
    /// `(key, version)` replaces the previous one.
    pub fn register(&mut self, motor: Arc<dyn MotorTransform>) {
        self.motors
            .insert((motor.key().to_string(), motor.version()), motor);
    }

    pub fn get(&self, key: &str, version: i64) -> Option<&Arc<dyn MotorTransform>> {
        self.motors.get(&(key.to_string(), version))
    }

    pub fn len(&self) -> usize {
        self.motors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.motors.is_empty()
    }
}

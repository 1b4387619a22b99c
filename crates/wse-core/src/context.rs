//! Engine context
//!
//! Owns the operation registry and the job store. One context is shared
//! (behind an `Arc`) by the task queue, its workers and any other part of
//! the process that wants to register operations.

use crate::builtins::{register_builtins, ScriptSettings};
use crate::jobs::JobStore;
use crate::registry::{Operation, OperationRegistry};

/// Shared registry and job records
#[derive(Debug, Default)]
pub struct EngineContext {
    pub registry: OperationRegistry,
    pub jobs: JobStore,
}

impl EngineContext {
    /// Context with no operations registered
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Context with the built-in operations registered
    #[must_use]
    pub fn with_builtins(settings: ScriptSettings) -> Self {
        let ctx = Self::new();
        register_builtins(&ctx.registry, settings);
        ctx
    }

    /// Register an operation, replacing any previous one of that name
    pub fn register(&self, name: impl Into<String>, op: Operation) {
        let name = name.into();
        if self.registry.register(name.clone(), op).is_some() {
            tracing::debug!("Operation {name} replaced");
        }
    }
}

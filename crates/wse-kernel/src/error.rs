//! Kernel error types

use wse_reconcile::ReconcileError;

/// Invalid engine configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Variable present but unusable
    #[error("invalid {var}={value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(var: &'static str, value: &str, reason: impl ToString) -> Self {
        Self::Invalid {
            var,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Failure of one pipeline step
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// Any other step failure
    #[error("{step} failed: {message}")]
    Step { step: &'static str, message: String },
}

impl PipelineError {
    /// Step failure with a message
    pub fn step(step: &'static str, message: impl Into<String>) -> Self {
        Self::Step {
            step,
            message: message.into(),
        }
    }
}

/// Scheduler lifecycle errors
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Background thread could not be spawned
    #[error("failed to spawn scheduler thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// Background thread still running after the join timeout
    #[error("scheduler did not stop within {timeout_ms}ms")]
    JoinTimeout { timeout_ms: u64 },
}

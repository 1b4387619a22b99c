//! Workspace operations for the task queue
//!
//! `workspace_apply` and `workspace_doctor` run one pass on a blocking thread
//! through the shared [`ReconcilePipeline`], so they are serialized with the
//! scheduler's own passes.

use crate::pipeline::ReconcilePipeline;
use serde_json::{json, Value};
use std::sync::Arc;
use wse_core::{EngineContext, Operation, OperationError};

/// Register `workspace_apply` and `workspace_doctor`
pub fn register_workspace_operations(ctx: &EngineContext, pipeline: &Arc<ReconcilePipeline>) {
    let p = Arc::clone(pipeline);
    ctx.register(
        "workspace_apply",
        Operation::no_args(move || {
            let p = Arc::clone(&p);
            async move { blocking(move || apply_summary(&p)).await }
        }),
    );

    let p = Arc::clone(pipeline);
    ctx.register(
        "workspace_doctor",
        Operation::no_args(move || {
            let p = Arc::clone(&p);
            async move { blocking(move || doctor_summary(&p)).await }
        }),
    );
}

async fn blocking<F>(f: F) -> Result<Value, OperationError>
where
    F: FnOnce() -> Result<Value, OperationError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) => Err(OperationError::Panicked(e.to_string())),
    }
}

fn apply_summary(pipeline: &ReconcilePipeline) -> Result<Value, OperationError> {
    let outcome = pipeline
        .apply_pass()
        .map_err(|e| OperationError::failed(e.to_string()))?;
    Ok(json!({
        "manifest_path": outcome.manifest_path.display().to_string(),
        "files": outcome.manifest.files.len(),
        "skipped_protected": outcome.manifest.skipped_protected,
    }))
}

fn doctor_summary(pipeline: &ReconcilePipeline) -> Result<Value, OperationError> {
    let outcome = pipeline
        .doctor_pass()
        .map_err(|e| OperationError::failed(e.to_string()))?;
    Ok(json!({
        "ok": outcome.report.ok,
        "issue_count": outcome.report.issue_count,
        "issues": outcome.report.issues,
        "json_path": outcome.json_path.display().to_string(),
        "gz_path": outcome.gz_path.display().to_string(),
    }))
}

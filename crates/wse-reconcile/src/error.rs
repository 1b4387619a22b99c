//! Error types for the reconciliation engine
//!
//! Integrity findings (missing canonical files, hash mismatches) are never
//! errors: they are reported through the doctor report. Errors here abort
//! the pass that raised them.

use std::path::PathBuf;
use wse_artifact::ArtifactError;

/// Errors raised by apply, doctor and report viewing
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Directory scan failed
    #[error("failed to scan {}: {source}", path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading or writing an artifact failed
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

impl ReconcileError {
    /// Create scan error for path
    pub fn scan(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Scan {
            path: path.into(),
            source,
        }
    }
}

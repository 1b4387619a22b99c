//! Reconciliation pipeline
//!
//! A pipeline run is `sync -> apply -> doctor`, strictly in that order, so
//! the audit always sees what the preceding apply left behind. The scheduler
//! drives it through the [`Pipeline`] trait; tests substitute counting fakes.

use crate::error::PipelineError;
use parking_lot::Mutex;
use wse_reconcile::{ApplyOutcome, DoctorOutcome, ReconcileError, Reconciler};

/// Steps the scheduler can run
pub trait Pipeline: Send + Sync {
    /// Pull external changes before applying (no-op by default)
    ///
    /// # Errors
    /// Step-specific
    fn sync(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Apply mirrors onto canonical files
    ///
    /// # Errors
    /// Step-specific
    fn apply(&self) -> Result<(), PipelineError>;

    /// Audit mirror/canonical pairs
    ///
    /// # Errors
    /// Step-specific
    fn doctor(&self) -> Result<(), PipelineError>;

    /// Full run; stops at the first failing step
    ///
    /// # Errors
    /// The first step error
    fn run(&self) -> Result<(), PipelineError> {
        self.sync()?;
        self.apply()?;
        self.doctor()
    }
}

/// Pipeline backed by a [`Reconciler`]
///
/// Passes are serialized with an internal lock, so a pass requested through
/// the task queue never overlaps one started by the scheduler.
#[derive(Debug)]
pub struct ReconcilePipeline {
    reconciler: Reconciler,
    pass_lock: Mutex<()>,
}

impl ReconcilePipeline {
    #[must_use]
    pub fn new(reconciler: Reconciler) -> Self {
        Self {
            reconciler,
            pass_lock: Mutex::new(()),
        }
    }

    #[inline]
    #[must_use]
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// One apply pass, logged
    ///
    /// # Errors
    /// Propagates [`ReconcileError`] from the pass
    pub fn apply_pass(&self) -> Result<ApplyOutcome, ReconcileError> {
        let _pass = self.pass_lock.lock();
        let outcome = self.reconciler.apply()?;
        tracing::info!(
            files = outcome.manifest.files.len(),
            skipped_protected = outcome.manifest.skipped_protected.len(),
            manifest = %outcome.manifest_path.display(),
            "Apply pass complete"
        );
        Ok(outcome)
    }

    /// One doctor pass, logged
    ///
    /// # Errors
    /// Propagates [`ReconcileError`] from the pass
    pub fn doctor_pass(&self) -> Result<DoctorOutcome, ReconcileError> {
        let _pass = self.pass_lock.lock();
        let outcome = self.reconciler.doctor()?;
        let report = &outcome.report;
        if report.ok {
            tracing::info!(
                files = report.files.len(),
                report = %outcome.gz_path.display(),
                "Doctor pass clean"
            );
        } else {
            tracing::warn!(
                issues = report.issue_count,
                files = report.files.len(),
                report = %outcome.gz_path.display(),
                "Doctor pass found drift"
            );
            for issue in &report.issues {
                tracing::debug!("{:?} {}", issue.kind, issue.canonical);
            }
        }
        Ok(outcome)
    }
}

impl Pipeline for ReconcilePipeline {
    fn apply(&self) -> Result<(), PipelineError> {
        self.apply_pass().map(drop).map_err(PipelineError::from)
    }

    fn doctor(&self) -> Result<(), PipelineError> {
        self.doctor_pass().map(drop).map_err(PipelineError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        steps: Mutex<Vec<&'static str>>,
        fail_apply: bool,
    }

    impl Pipeline for Recorder {
        fn sync(&self) -> Result<(), PipelineError> {
            self.steps.lock().push("sync");
            Ok(())
        }

        fn apply(&self) -> Result<(), PipelineError> {
            self.steps.lock().push("apply");
            if self.fail_apply {
                return Err(PipelineError::step("apply", "disk full"));
            }
            Ok(())
        }

        fn doctor(&self) -> Result<(), PipelineError> {
            self.steps.lock().push("doctor");
            Ok(())
        }
    }

    #[test]
    fn run_is_sync_apply_doctor() {
        let recorder = Recorder::default();
        recorder.run().unwrap();
        assert_eq!(*recorder.steps.lock(), vec!["sync", "apply", "doctor"]);
    }

    #[test]
    fn failed_apply_skips_doctor() {
        let recorder = Recorder {
            fail_apply: true,
            ..Recorder::default()
        };
        let err = recorder.run().unwrap_err();
        assert_eq!(err.to_string(), "apply failed: disk full");
        assert_eq!(*recorder.steps.lock(), vec!["sync", "apply"]);
    }
}

//! WSE Reconciliation Engine
//!
//! Keeps canonical working files in sync with their editable mirrors:
//! - **Apply**: overwrite canonical files with mirror bytes, skipping the
//!   protected set, and record an append-only manifest
//! - **Doctor**: hash both sides of every pair and persist a JSON report plus
//!   a gzip duplicate
//! - **Viewer**: page through persisted doctor reports
//!
//! # Example
//!
//! ```rust,ignore
//! use wse_reconcile::{Reconciler, WorkspaceLayout};
//!
//! let reconciler = Reconciler::new(WorkspaceLayout::new("/mnt/data"), "A_FAST");
//! let applied = reconciler.apply()?;
//! let audit = reconciler.doctor()?;
//! assert!(audit.report.ok);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod apply;
pub mod doctor;
pub mod error;
pub mod layout;
pub mod viewer;

pub use apply::{ApplyEntry, ApplyManifest, ApplyOutcome, ApplyStatus, Decision, Reconciler};
pub use doctor::{DoctorIssue, DoctorOutcome, DoctorReport, FileAudit, IssueKind};
pub use error::ReconcileError;
pub use layout::{
    canonical_name, is_protected, MirrorPair, WorkspaceLayout, MIRROR_PREFIX, PROTECTED_CANONICAL,
};
pub use viewer::{find_reports, load_report, view, ViewPayload, ViewRequest};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

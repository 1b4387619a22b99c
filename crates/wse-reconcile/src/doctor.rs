//! Doctor: audit mirror/canonical pairs for drift
//!
//! A doctor pass is read-only with respect to the workspace. It hashes both
//! sides of every pair and persists the report twice: indented JSON and a
//! gzip-compressed copy of the same bytes with `.gz` appended to the name.

use crate::apply::Reconciler;
use crate::error::ReconcileError;
use crate::layout::MirrorPair;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use wse_artifact::{
    ensure_dir, file_stamp, hash_file, iso_stamp, to_pretty_json, unique_artifact_path,
    with_suffix, write_atomic, write_gzip, ContentHash,
};

/// Kind of integrity issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueKind {
    CanonicalMissing,
    ShaMismatch,
}

/// One integrity issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorIssue {
    /// Affected canonical path
    pub canonical: String,
    pub kind: IssueKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror_sha256: Option<ContentHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_sha256: Option<ContentHash>,
}

/// Per-file audit detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAudit {
    pub mirror: String,
    pub canonical: String,
    /// Canonical content equals mirror content
    pub ok: bool,
    /// Canonical name is in the protected set
    pub protected: bool,
    pub mirror_bytes: u64,
    pub canonical_bytes: Option<u64>,
    pub mirror_sha256: ContentHash,
    pub canonical_sha256: Option<ContentHash>,
}

/// Record of one audit pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorReport {
    pub ts: String,
    pub base_dir: String,
    /// True iff `issues` is empty
    pub ok: bool,
    pub issue_count: usize,
    pub issues: Vec<DoctorIssue>,
    /// Per-file detail keyed by canonical path
    pub files: BTreeMap<String, FileAudit>,
}

/// A persisted doctor pass
#[derive(Debug, Clone)]
pub struct DoctorOutcome {
    pub report: DoctorReport,
    pub json_path: PathBuf,
    pub gz_path: PathBuf,
}

impl Reconciler {
    /// Audit every pair and persist the report
    ///
    /// # Errors
    /// Returns an error if the workspace cannot be scanned, a file cannot be
    /// read, or the report cannot be written. Drift is never an error.
    pub fn doctor(&self) -> Result<DoctorOutcome, ReconcileError> {
        let report = self.audit()?;

        let doctor_dir = self.layout().doctor_dir();
        ensure_dir(&doctor_dir)?;
        let stamp = file_stamp(Utc::now());
        let json_path = unique_artifact_path(&doctor_dir, "doctor", &stamp, "json");
        let gz_path = with_suffix(&json_path, ".gz");

        let bytes = to_pretty_json(&json_path, &report)?;
        write_atomic(&json_path, &bytes)?;
        write_gzip(&gz_path, &bytes)?;

        if report.ok {
            tracing::info!(
                "Doctor ok: {} files match ({})",
                report.files.len(),
                json_path.display()
            );
        } else {
            tracing::warn!(
                "Doctor found {} issues across {} files ({})",
                report.issue_count,
                report.files.len(),
                json_path.display()
            );
        }

        Ok(DoctorOutcome {
            report,
            json_path,
            gz_path,
        })
    }

    /// Compare every pair without persisting anything
    ///
    /// # Errors
    /// Returns an error if the workspace cannot be scanned or a present file
    /// cannot be read
    pub fn audit(&self) -> Result<DoctorReport, ReconcileError> {
        let at = Utc::now();
        let mut issues = Vec::new();
        let mut files = BTreeMap::new();

        for pair in self.layout().discover()? {
            let Some(audit) = audit_pair(&pair, &mut issues)? else {
                continue;
            };
            files.insert(pair.key(), audit);
        }

        Ok(DoctorReport {
            ts: iso_stamp(at),
            base_dir: self.layout().root().display().to_string(),
            ok: issues.is_empty(),
            issue_count: issues.len(),
            issues,
            files,
        })
    }
}

fn audit_pair(
    pair: &MirrorPair,
    issues: &mut Vec<DoctorIssue>,
) -> Result<Option<FileAudit>, ReconcileError> {
    let (mirror_sha256, mirror_bytes) = match hash_file(&pair.mirror) {
        Ok(found) => found,
        // Removed by an editor between discovery and read.
        Err(e) if e.is_not_found() => {
            tracing::debug!("Mirror vanished during audit: {}", pair.mirror.display());
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let canonical = match hash_file(&pair.canonical) {
        Ok(found) => Some(found),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e.into()),
    };

    let key = pair.key();
    let ok = match canonical {
        None => {
            tracing::warn!("Canonical missing: {key}");
            issues.push(DoctorIssue {
                canonical: key.clone(),
                kind: IssueKind::CanonicalMissing,
                mirror_sha256: None,
                canonical_sha256: None,
            });
            false
        }
        Some((canonical_sha256, _)) if canonical_sha256 != mirror_sha256 => {
            tracing::warn!(
                "Hash mismatch on {key}: mirror {} canonical {}",
                mirror_sha256.short(),
                canonical_sha256.short()
            );
            issues.push(DoctorIssue {
                canonical: key.clone(),
                kind: IssueKind::ShaMismatch,
                mirror_sha256: Some(mirror_sha256),
                canonical_sha256: Some(canonical_sha256),
            });
            false
        }
        Some(_) => true,
    };

    Ok(Some(FileAudit {
        mirror: pair.mirror.display().to_string(),
        canonical: key,
        ok,
        protected: pair.is_protected(),
        mirror_bytes,
        canonical_bytes: canonical.map(|(_, len)| len),
        mirror_sha256,
        canonical_sha256: canonical.map(|(hash, _)| hash),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::WorkspaceLayout;
    use std::fs;

    #[test]
    fn empty_workspace_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let report = Reconciler::new(WorkspaceLayout::new(dir.path()), "A_FAST")
            .audit()
            .unwrap();
        assert!(report.ok);
        assert_eq!(report.issue_count, 0);
        assert!(report.files.is_empty());
    }

    #[test]
    fn missing_issue_omits_hash_fields() {
        let issue = DoctorIssue {
            canonical: "/x/a.md".to_string(),
            kind: IssueKind::CanonicalMissing,
            mirror_sha256: None,
            canonical_sha256: None,
        };
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json, serde_json::json!({"canonical": "/x/a.md", "kind": "CANONICAL_MISSING"}));
    }

    #[test]
    fn audit_does_not_touch_workspace() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("mirror_mnt_data_a.md"), "a").unwrap();
        let reconciler = Reconciler::new(WorkspaceLayout::new(dir.path()), "A_FAST");

        let report = reconciler.audit().unwrap();
        assert!(!report.ok);
        assert!(!dir.path().join("a.md").exists());
        assert!(!dir.path().join("_out").exists());
    }
}

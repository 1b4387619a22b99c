//! Apply: overwrite canonical files with their mirrors
//!
//! One apply pass writes every non-protected canonical file and records the
//! result in an append-only manifest named by UTC stamp.
//!
//! # Failure atomicity
//!
//! Before the first canonical write a journal `apply-<stamp>.json.pending`
//! lists the planned entries. The final manifest is only written once every
//! canonical write succeeded, after which the journal is removed. A pass that
//! fails mid-way leaves no manifest, but its journal remains on disk.

use crate::error::ReconcileError;
use crate::layout::{MirrorPair, WorkspaceLayout};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use wse_artifact::{
    ensure_dir, file_stamp, iso_stamp, read_bytes, unique_artifact_path, with_suffix,
    write_atomic, write_json_pretty, ContentHash,
};

/// Per-file status in an apply manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplyStatus {
    /// Planned but not written yet (journal only)
    Pending,
    /// Canonical file (re)created from its mirror
    Created,
}

/// Outcome marker of an apply pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Proceed,
}

/// One canonical file written by apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyEntry {
    pub status: ApplyStatus,
    pub content_hash: ContentHash,
    pub byte_length: u64,
}

/// Record of one apply pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyManifest {
    /// UTC timestamp of the pass
    pub ts: String,
    /// Mode tag the pass ran under
    pub mode: String,
    pub decision: Decision,
    /// Written canonical files keyed by canonical path
    pub files: BTreeMap<String, ApplyEntry>,
    /// Protected canonical names that were skipped
    pub skipped_protected: BTreeSet<String>,
}

/// A persisted apply pass
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub manifest: ApplyManifest,
    pub manifest_path: PathBuf,
}

/// Runs apply and doctor passes over one workspace
#[derive(Debug, Clone)]
pub struct Reconciler {
    layout: WorkspaceLayout,
    mode: String,
}

impl Reconciler {
    /// Create a reconciler for `layout`, tagging manifests with `mode`
    #[inline]
    #[must_use]
    pub fn new(layout: WorkspaceLayout, mode: impl Into<String>) -> Self {
        Self {
            layout,
            mode: mode.into(),
        }
    }

    /// Workspace this reconciler operates on
    #[inline]
    #[must_use]
    pub fn layout(&self) -> &WorkspaceLayout {
        &self.layout
    }

    /// Mode tag written into manifests
    #[inline]
    #[must_use]
    pub fn mode(&self) -> &str {
        &self.mode
    }

    /// Copy every non-protected mirror onto its canonical path
    ///
    /// # Errors
    /// Any IO failure aborts the pass. Canonical files written before the
    /// failure keep their new content; no manifest is written.
    pub fn apply(&self) -> Result<ApplyOutcome, ReconcileError> {
        let at = Utc::now();
        let pairs = self.layout.discover()?;

        let mut manifest = ApplyManifest {
            ts: iso_stamp(at),
            mode: self.mode.clone(),
            decision: Decision::Proceed,
            files: BTreeMap::new(),
            skipped_protected: BTreeSet::new(),
        };

        let mut planned: Vec<(MirrorPair, Vec<u8>)> = Vec::with_capacity(pairs.len());
        for pair in pairs {
            if pair.is_protected() {
                tracing::debug!("Skipping protected canonical {}", pair.canonical_name);
                manifest.skipped_protected.insert(pair.canonical_name);
                continue;
            }
            let bytes = read_bytes(&pair.mirror)?;
            manifest.files.insert(
                pair.key(),
                ApplyEntry {
                    status: ApplyStatus::Pending,
                    content_hash: ContentHash::compute(&bytes),
                    byte_length: bytes.len() as u64,
                },
            );
            planned.push((pair, bytes));
        }

        let apply_dir = self.layout.apply_dir();
        ensure_dir(&apply_dir)?;
        let manifest_path = unique_artifact_path(&apply_dir, "apply", &file_stamp(at), "json");
        let journal_path = with_suffix(&manifest_path, ".pending");
        write_json_pretty(&journal_path, &manifest)?;

        for (pair, bytes) in &planned {
            write_atomic(&pair.canonical, bytes)?;
            if let Some(entry) = manifest.files.get_mut(&pair.key()) {
                entry.status = ApplyStatus::Created;
            }
            tracing::debug!(
                "Applied {} -> {} ({} bytes)",
                pair.mirror.display(),
                pair.canonical.display(),
                bytes.len()
            );
        }

        write_json_pretty(&manifest_path, &manifest)?;
        if let Err(e) = std::fs::remove_file(&journal_path) {
            tracing::warn!("Could not remove apply journal {}: {}", journal_path.display(), e);
        }

        tracing::info!(
            "Apply wrote {} files, skipped {} protected ({})",
            manifest.files.len(),
            manifest.skipped_protected.len(),
            manifest_path.display()
        );
        Ok(ApplyOutcome {
            manifest,
            manifest_path,
        })
    }
}

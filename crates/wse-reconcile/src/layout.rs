//! Workspace layout and mirror discovery
//!
//! Mirror files live alongside their canonical counterparts under one watched
//! root. A mirror is any regular file whose name starts with [`MIRROR_PREFIX`];
//! the canonical name is the mirror name with the first occurrence of the
//! prefix removed.

use crate::error::ReconcileError;
use std::fs;
use std::path::{Path, PathBuf};

/// File-name prefix marking a mirror file
pub const MIRROR_PREFIX: &str = "mirror_mnt_data_";

/// Canonical names that apply never overwrites
pub const PROTECTED_CANONICAL: [&str; 2] = ["tool.md", "run_manifest_schema.json"];

/// Artifacts directory under the root
pub const OUT_DIR: &str = "_out";

/// Engine log directory under the root
pub const LOGS_DIR: &str = "_logs";

/// Canonical name for a mirror file name
///
/// Returns `None` for names that are not mirrors or that consist of the
/// prefix alone.
#[must_use]
pub fn canonical_name(file_name: &str) -> Option<String> {
    if !file_name.starts_with(MIRROR_PREFIX) {
        return None;
    }
    let name = file_name.replacen(MIRROR_PREFIX, "", 1);
    (!name.is_empty()).then_some(name)
}

/// Whether a canonical file name is in the protected set
#[inline]
#[must_use]
pub fn is_protected(canonical_name: &str) -> bool {
    PROTECTED_CANONICAL.contains(&canonical_name)
}

/// A mirror file and the canonical path it maps to
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MirrorPair {
    /// Mirror path (editable source of truth)
    pub mirror: PathBuf,
    /// Canonical path (engine-managed)
    pub canonical: PathBuf,
    /// Canonical file name
    pub canonical_name: String,
}

impl MirrorPair {
    /// Whether apply must skip this pair
    #[inline]
    #[must_use]
    pub fn is_protected(&self) -> bool {
        is_protected(&self.canonical_name)
    }

    /// Key used for this pair in manifests and reports
    #[must_use]
    pub fn key(&self) -> String {
        self.canonical.display().to_string()
    }
}

/// Directory layout of one watched workspace root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    /// Layout rooted at `root`
    #[inline]
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Watched root
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/_out`
    #[must_use]
    pub fn out_dir(&self) -> PathBuf {
        self.root.join(OUT_DIR)
    }

    /// `<root>/_out/apply`
    #[must_use]
    pub fn apply_dir(&self) -> PathBuf {
        self.out_dir().join("apply")
    }

    /// `<root>/_out/doctor`
    #[must_use]
    pub fn doctor_dir(&self) -> PathBuf {
        self.out_dir().join("doctor")
    }

    /// `<root>/_logs`
    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    /// Enumerate every mirror/canonical pair under the root, sorted by path
    ///
    /// Subdirectories are walked recursively. Hidden directories and the
    /// engine's own `_out` / `_logs` directories are skipped, as are symlinks.
    ///
    /// # Errors
    /// Returns [`ReconcileError::Scan`] if a directory cannot be read
    pub fn discover(&self) -> Result<Vec<MirrorPair>, ReconcileError> {
        let mut pairs = Vec::new();
        self.walk(&self.root, &mut pairs)?;
        pairs.sort();
        Ok(pairs)
    }

    fn walk(&self, dir: &Path, pairs: &mut Vec<MirrorPair>) -> Result<(), ReconcileError> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            // A root that does not exist yet simply holds no mirrors.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && dir == self.root => {
                return Ok(())
            }
            Err(e) => return Err(ReconcileError::scan(dir, e)),
        };

        for entry in entries {
            let entry = entry.map_err(|e| ReconcileError::scan(dir, e))?;
            let file_type = entry
                .file_type()
                .map_err(|e| ReconcileError::scan(entry.path(), e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };

            if file_type.is_dir() {
                if name.starts_with('.') || (dir == self.root && (name == OUT_DIR || name == LOGS_DIR)) {
                    continue;
                }
                self.walk(&entry.path(), pairs)?;
            } else if file_type.is_file() {
                if let Some(canonical_name) = canonical_name(name) {
                    pairs.push(MirrorPair {
                        mirror: entry.path(),
                        canonical: dir.join(&canonical_name),
                        canonical_name,
                    });
                }
            }
        }
        Ok(())
    }
}

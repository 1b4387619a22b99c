//! Testing utilities for WSE workspace
//!
//! Shared fixtures: a throwaway workspace root with mirror and canonical files.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use wse_reconcile::{Reconciler, WorkspaceLayout, MIRROR_PREFIX};

/// A workspace root in a temporary directory, removed on drop
#[derive(Debug)]
pub struct TempWorkspace {
    dir: TempDir,
}

impl TempWorkspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp workspace"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn layout(&self) -> WorkspaceLayout {
        WorkspaceLayout::new(self.root())
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.layout(), "A_FAST")
    }

    /// Write `<root>/<rel_dir>/mirror_mnt_data_<name>` and return its path
    pub fn write_mirror(&self, name: &str, content: &str) -> PathBuf {
        let rel = Path::new(name);
        let file_name = rel
            .file_name()
            .and_then(|n| n.to_str())
            .expect("mirror name has a file name");
        let dir = rel
            .parent()
            .map_or_else(|| self.root().to_path_buf(), |p| self.root().join(p));
        fs::create_dir_all(&dir).expect("create mirror dir");
        let path = dir.join(format!("{MIRROR_PREFIX}{file_name}"));
        fs::write(&path, content).expect("write mirror");
        path
    }

    /// Write a canonical file at `<root>/<name>` and return its path
    pub fn write_canonical(&self, name: &str, content: &str) -> PathBuf {
        let path = self.root().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create canonical dir");
        }
        fs::write(&path, content).expect("write canonical");
        path
    }

    pub fn read(&self, name: &str) -> Option<String> {
        fs::read_to_string(self.root().join(name)).ok()
    }

    /// File names in `<root>/<rel_dir>`, sorted
    pub fn list(&self, rel_dir: &str) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.root().join(rel_dir))
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Key used for `name` in manifests and reports
    pub fn key(&self, name: &str) -> String {
        self.root().join(name).display().to_string()
    }
}

impl Default for TempWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

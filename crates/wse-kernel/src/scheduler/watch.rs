//! Modification-time change detection

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::SystemTime;
use wse_reconcile::WorkspaceLayout;

/// Snapshot of mirror modification times
///
/// The watched set is re-discovered on every poll, so a mirror that appears
/// or disappears counts as a change too.
#[derive(Debug)]
pub struct MtimeWatcher {
    layout: WorkspaceLayout,
    snapshot: BTreeMap<PathBuf, Option<SystemTime>>,
}

impl MtimeWatcher {
    /// Watcher primed with the current state of `layout`
    #[must_use]
    pub fn new(layout: WorkspaceLayout) -> Self {
        let snapshot = take_snapshot(&layout);
        Self { layout, snapshot }
    }

    /// Number of watched mirrors
    #[must_use]
    pub fn watched(&self) -> usize {
        self.snapshot.len()
    }

    /// Re-scan; `true` if anything differs from the previous scan
    pub fn poll(&mut self) -> bool {
        let current = take_snapshot(&self.layout);
        if current == self.snapshot {
            return false;
        }
        tracing::debug!(
            before = self.snapshot.len(),
            after = current.len(),
            "Mirror change detected"
        );
        self.snapshot = current;
        true
    }
}

fn take_snapshot(layout: &WorkspaceLayout) -> BTreeMap<PathBuf, Option<SystemTime>> {
    match layout.discover() {
        Ok(pairs) => pairs
            .into_iter()
            .map(|pair| {
                let mtime = std::fs::metadata(&pair.mirror)
                    .and_then(|m| m.modified())
                    .ok();
                (pair.mirror, mtime)
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Change scan failed: {e}");
            BTreeMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    fn touch_later(path: &std::path::Path, content: &str) {
        fs::write(path, content).unwrap();
        let later = SystemTime::now() + Duration::from_secs(5);
        fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(later)
            .unwrap();
    }

    #[test]
    fn quiet_tree_reports_no_change() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("mirror_mnt_data_a.md"), "a").unwrap();
        let mut watcher = MtimeWatcher::new(WorkspaceLayout::new(dir.path()));

        assert_eq!(watcher.watched(), 1);
        assert!(!watcher.poll());
    }

    #[test]
    fn new_and_modified_mirrors_are_changes() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = dir.path().join("mirror_mnt_data_a.md");
        fs::write(&mirror, "a").unwrap();
        let mut watcher = MtimeWatcher::new(WorkspaceLayout::new(dir.path()));

        fs::write(dir.path().join("mirror_mnt_data_b.md"), "b").unwrap();
        assert!(watcher.poll());
        assert!(!watcher.poll());

        touch_later(&mirror, "a2");
        assert!(watcher.poll());
    }

    #[test]
    fn canonical_edits_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("mirror_mnt_data_a.md"), "a").unwrap();
        let mut watcher = MtimeWatcher::new(WorkspaceLayout::new(dir.path()));

        fs::write(dir.path().join("a.md"), "edited").unwrap();
        assert!(!watcher.poll());
    }
}

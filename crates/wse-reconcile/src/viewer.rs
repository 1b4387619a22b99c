//! Paged viewing of persisted doctor reports
//!
//! Reports are read as loose JSON so that older or hand-edited reports can
//! still be paged through.

use crate::error::ReconcileError;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use wse_artifact::read_json;

/// All `doctor-*.json` and `doctor-*.json.gz` files in `dir`, sorted by name
///
/// A missing directory yields an empty list.
///
/// # Errors
/// Returns [`ReconcileError::Scan`] if the directory exists but cannot be read
pub fn find_reports(dir: &Path) -> Result<Vec<PathBuf>, ReconcileError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ReconcileError::scan(dir, e)),
    };

    let mut reports = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ReconcileError::scan(dir, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("doctor-") && (name.ends_with(".json") || name.ends_with(".json.gz")) {
            reports.push(entry.path());
        }
    }
    reports.sort();
    Ok(reports)
}

/// Load a report, decompressing `.gz` files
///
/// # Errors
/// Returns an error if the file cannot be read or is not valid JSON
pub fn load_report(path: &Path) -> Result<Value, ReconcileError> {
    Ok(read_json(path)?)
}

/// Items on a 1-based page; page and page size are clamped to at least 1
#[must_use]
pub fn page_items<T: Clone>(items: &[T], page: usize, page_size: usize) -> Vec<T> {
    let page = page.max(1);
    let page_size = page_size.max(1);
    let start = (page - 1).saturating_mul(page_size);
    items.iter().skip(start).take(page_size).cloned().collect()
}

/// What to view
#[derive(Debug, Clone)]
pub struct ViewRequest {
    /// Explicit report file; otherwise the latest report in `dir`
    pub file: Option<PathBuf>,
    pub dir: PathBuf,
    pub page: usize,
    pub page_size: usize,
    /// Treat an empty report directory as success
    pub ok_if_empty: bool,
}

impl ViewRequest {
    /// View the latest report in `dir`
    #[must_use]
    pub fn latest(dir: impl Into<PathBuf>) -> Self {
        Self {
            file: None,
            dir: dir.into(),
            page: 1,
            page_size: 50,
            ok_if_empty: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Counts {
    pub issues_total: usize,
    pub files_total: usize,
}

/// Result of a view request, serialized as the printed payload
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ViewPayload {
    /// One page of a loaded report
    Page {
        ok: bool,
        file: String,
        ts: Value,
        base_dir: Value,
        counts: Counts,
        issues: Vec<Value>,
        files: Vec<Value>,
    },
    /// No report to load
    Empty {
        ok: bool,
        empty: bool,
        reason: String,
        dir: String,
        files: Vec<Value>,
    },
    /// The selected report could not be loaded
    Failed {
        ok: bool,
        error: String,
        file: String,
    },
}

impl ViewPayload {
    /// Whether the view succeeded
    #[must_use]
    pub fn ok(&self) -> bool {
        match self {
            Self::Page { ok, .. } | Self::Empty { ok, .. } | Self::Failed { ok, .. } => *ok,
        }
    }

    /// Process exit code for this payload
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.ok())
    }
}

/// Resolve, load and page a report
///
/// # Errors
/// Only a failure to scan the report directory is an error; load failures
/// are reported in the payload.
pub fn view(request: &ViewRequest) -> Result<ViewPayload, ReconcileError> {
    let source = match &request.file {
        Some(file) => Some(file.clone()),
        None => find_reports(&request.dir)?.pop(),
    };

    let Some(source) = source else {
        return Ok(ViewPayload::Empty {
            ok: request.ok_if_empty,
            empty: true,
            reason: "no report files found".to_string(),
            dir: request.dir.display().to_string(),
            files: Vec::new(),
        });
    };

    let file = source.display().to_string();
    if !source.exists() {
        return Ok(ViewPayload::Failed {
            ok: false,
            error: "Selected report path does not exist".to_string(),
            file,
        });
    }

    let data = match load_report(&source) {
        Ok(data) => data,
        Err(e) => {
            return Ok(ViewPayload::Failed {
                ok: false,
                error: format!("Failed to load report: {e}"),
                file,
            })
        }
    };

    let issues = as_items(data.get("issues"));
    let files = as_items(data.get("files"));
    Ok(ViewPayload::Page {
        ok: true,
        file,
        ts: data.get("ts").cloned().unwrap_or(Value::Null),
        base_dir: data.get("base_dir").cloned().unwrap_or(Value::Null),
        counts: Counts {
            issues_total: issues.len(),
            files_total: files.len(),
        },
        issues: page_items(&issues, request.page, request.page_size),
        files: page_items(&files, request.page, request.page_size),
    })
}

// Reports store files as a map keyed by canonical path; older ones use a list.
fn as_items(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Object(map)) => map.values().cloned().collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_items_clamps_and_slices() {
        let items: Vec<u32> = (1..=5).collect();
        assert_eq!(page_items(&items, 1, 2), vec![1, 2]);
        assert_eq!(page_items(&items, 3, 2), vec![5]);
        assert_eq!(page_items(&items, 0, 0), vec![1]);
        assert!(page_items(&items, 9, 2).is_empty());
    }

    #[test]
    fn empty_dir_respects_ok_if_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut request = ViewRequest::latest(dir.path());
        assert_eq!(view(&request).unwrap().exit_code(), 1);

        request.ok_if_empty = true;
        let payload = view(&request).unwrap();
        assert_eq!(payload.exit_code(), 0);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["empty"], true);
    }

    #[test]
    fn corrupt_report_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("doctor-2000-01-01T00-00-00Z.json");
        fs::write(&bad, "{not json}").unwrap();

        let request = ViewRequest {
            file: Some(bad),
            ..ViewRequest::latest(dir.path())
        };
        let payload = view(&request).unwrap();
        assert_eq!(payload.exit_code(), 1);
        assert!(matches!(payload, ViewPayload::Failed { .. }));
    }

    #[test]
    fn find_reports_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "doctor-2000-01-02T00-00-00.000Z.json",
            "doctor-2000-01-01T00-00-00.000Z.json.gz",
            "apply-2000-01-01T00-00-00.000Z.json",
            "notes.txt",
        ] {
            fs::write(dir.path().join(name), "{}").unwrap();
        }
        let names: Vec<_> = find_reports(dir.path())
            .unwrap()
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "doctor-2000-01-01T00-00-00.000Z.json.gz",
                "doctor-2000-01-02T00-00-00.000Z.json"
            ]
        );
    }
}

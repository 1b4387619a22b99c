//! Atomic file primitives
//!
//! Every artifact the engine persists goes through [`write_atomic`]: bytes land
//! in a temporary sibling first and are renamed over the target, so readers
//! never observe a half-written canonical file, manifest or report.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::hash::ContentHash;

/// Errors raised by artifact IO
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// Filesystem failure on a specific path
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON encode/decode failure on a specific path
    #[error("json error on {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ArtifactError {
    /// Wrap an IO error with the path it concerns
    #[inline]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Path the error concerns
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Io { path, .. } | Self::Json { path, .. } => path,
        }
    }

    /// Whether the underlying cause is a missing file
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Read a whole file
///
/// # Errors
/// Returns [`ArtifactError::Io`] if the file cannot be read
pub fn read_bytes(path: &Path) -> Result<Vec<u8>, ArtifactError> {
    fs::read(path).map_err(|e| ArtifactError::io(path, e))
}

/// Read a file and hash its content
///
/// Returns the hash together with the byte length.
///
/// # Errors
/// Returns [`ArtifactError::Io`] if the file cannot be read
pub fn hash_file(path: &Path) -> Result<(ContentHash, u64), ArtifactError> {
    let bytes = read_bytes(path)?;
    Ok((ContentHash::compute(&bytes), bytes.len() as u64))
}

/// Create a directory and all of its parents
///
/// # Errors
/// Returns [`ArtifactError::Io`] on failure
pub fn ensure_dir(dir: &Path) -> Result<(), ArtifactError> {
    fs::create_dir_all(dir).map_err(|e| ArtifactError::io(dir, e))
}

/// Atomically replace `path` with `data`
///
/// Missing parent directories are created. The temporary file lives in the
/// target directory so the final rename never crosses filesystems.
///
/// # Errors
/// Returns [`ArtifactError::Io`] if any step fails; the target is untouched
/// in that case
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<(), ArtifactError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    ensure_dir(parent)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".wse-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|e| ArtifactError::io(parent, e))?;
    tmp.write_all(data).map_err(|e| ArtifactError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| ArtifactError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| ArtifactError::io(path, e.error))?;
    Ok(())
}

/// Serialize `value` as indented JSON
///
/// # Errors
/// Returns [`ArtifactError::Json`] if serialization fails
pub fn to_pretty_json<T: Serialize>(path: &Path, value: &T) -> Result<Vec<u8>, ArtifactError> {
    serde_json::to_vec_pretty(value).map_err(|e| ArtifactError::Json {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Atomically write `value` as indented JSON
///
/// # Errors
/// Returns an error if serialization or the write fails
pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<(), ArtifactError> {
    let bytes = to_pretty_json(path, value)?;
    write_atomic(path, &bytes)
}

/// Atomically write `data` gzip-compressed
///
/// # Errors
/// Returns [`ArtifactError::Io`] if compression or the write fails
pub fn write_gzip(path: &Path, data: &[u8]) -> Result<(), ArtifactError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| ArtifactError::io(path, e))?;
    let compressed = encoder.finish().map_err(|e| ArtifactError::io(path, e))?;
    write_atomic(path, &compressed)
}

/// Read a JSON document, transparently decompressing `.gz` files
///
/// # Errors
/// Returns an error if the file cannot be read, decompressed or parsed
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let raw = read_bytes(path)?;
    let bytes = if is_gzip_path(path) {
        let mut out = Vec::new();
        GzDecoder::new(raw.as_slice())
            .read_to_end(&mut out)
            .map_err(|e| ArtifactError::io(path, e))?;
        out
    } else {
        raw
    };
    serde_json::from_slice(&bytes).map_err(|e| ArtifactError::Json {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Append one line to a text file, creating it if needed
///
/// # Errors
/// Returns [`ArtifactError::Io`] on failure
pub fn append_line(path: &Path, line: &str) -> Result<(), ArtifactError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ArtifactError::io(path, e))?;
    writeln!(file, "{line}").map_err(|e| ArtifactError::io(path, e))
}

/// Pick a path `<dir>/<prefix>-<stamp>.<ext>` that does not exist yet
///
/// Two passes within the same millisecond get `_1`, `_2`, ... appended to
/// the stamp, which keeps lexical order equal to creation order.
#[must_use]
pub fn unique_artifact_path(dir: &Path, prefix: &str, stamp: &str, ext: &str) -> PathBuf {
    let candidate = dir.join(format!("{prefix}-{stamp}.{ext}"));
    if !candidate.exists() {
        return candidate;
    }
    (1u32..)
        .map(|n| dir.join(format!("{prefix}-{stamp}_{n}.{ext}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Path with `suffix` appended to the full file name (`a.json` -> `a.json.gz`)
#[must_use]
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn is_gzip_path(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn write_atomic_creates_parents_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a/b/c.txt");

        write_atomic(&target, b"one").unwrap();
        write_atomic(&target, b"two").unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"two");
        let leftovers: Vec<_> = fs::read_dir(target.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn gzip_and_plain_json_decode_to_same_value() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("r.json");
        let value = json!({"ok": true, "issues": [1, 2, 3]});

        let bytes = to_pretty_json(&plain, &value).unwrap();
        write_atomic(&plain, &bytes).unwrap();
        let gz = with_suffix(&plain, ".gz");
        write_gzip(&gz, &bytes).unwrap();

        let a: serde_json::Value = read_json(&plain).unwrap();
        let b: serde_json::Value = read_json(&gz).unwrap();
        assert_eq!(a, b);
        assert_eq!(gz.file_name().unwrap(), "r.json.gz");
    }

    #[test]
    fn read_json_reports_path_on_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{not json}").unwrap();

        let err = read_json::<serde_json::Value>(&bad).unwrap_err();
        assert!(matches!(err, ArtifactError::Json { .. }));
        assert_eq!(err.path(), bad.as_path());
    }

    #[test]
    fn unique_artifact_path_suffixes_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let first = unique_artifact_path(dir.path(), "apply", "2024-01-01T00-00-00.000Z", "json");
        fs::write(&first, "{}").unwrap();
        let second = unique_artifact_path(dir.path(), "apply", "2024-01-01T00-00-00.000Z", "json");

        assert_ne!(first, second);
        assert!(second
            .to_string_lossy()
            .ends_with("apply-2024-01-01T00-00-00.000Z_1.json"));
        assert!(first.file_name().unwrap() < second.file_name().unwrap());
    }

    #[test]
    fn append_line_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("_logs/events.jsonl");
        append_line(&log, "a").unwrap();
        append_line(&log, "b").unwrap();
        assert_eq!(fs::read_to_string(&log).unwrap(), "a\nb\n");
    }
}

//! WSE Artifact Primitives
//!
//! Hashing and file IO shared by the reconciliation engine and the doctor.
//!
//! # Core Concepts
//!
//! - [`ContentHash`]: SHA-256 digest used to compare mirror and canonical files
//! - [`write_atomic`]: temp-file-then-rename replacement of a target path
//! - [`write_gzip`] / [`read_json`]: compressed report persistence and reading
//! - [`file_stamp`]: filesystem-safe UTC stamps used in artifact names
//!
//! # Example
//!
//! ```rust,ignore
//! use wse_artifact::{hash_file, write_atomic};
//!
//! write_atomic(&canonical, &mirror_bytes)?;
//! let (hash, len) = hash_file(&canonical)?;
//! println!("{hash} ({len} bytes)");
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod fsio;
mod hash;
mod stamp;

pub use fsio::{
    append_line, ensure_dir, hash_file, read_bytes, read_json, to_pretty_json,
    unique_artifact_path, with_suffix, write_atomic, write_gzip, write_json_pretty,
    ArtifactError,
};
pub use hash::{ContentHash, HashError};
pub use stamp::{file_stamp, iso_stamp};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Artifact loader: upload acceptance, staging, and directory scans.
//!
//! Uploaded artifacts are checked against the extension allowlist and size
//! bound, sanitized to a flat filename, written to a temporary file and
//! parsed before they replace anything in the upload directory. Built-in
//! ruleset files are read from a separate directory at startup.

mod core;
mod error;
mod sanitize;


pub use self::core::{ArtifactLoader, StagedArtifact};
pub use self::error::{LoadError, LoadResult, LoadStatus, Result};
pub use self::sanitize::secure_filename;

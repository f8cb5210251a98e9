//! Error types and load result structures for the artifact loader.

use std::path::PathBuf;

use crate::schema::RulesetDefinition;

/// Errors that can occur while accepting, staging, or reading an artifact.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Filesystem I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML/JSON parse error.
    #[error("parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The request carried no artifact, or one with an empty filename.
    #[error("no artifact was uploaded")]
    MissingArtifact,

    /// The filename's extension is not on the allowlist.
    #[error("artifact '{0}' has an unsupported extension")]
    UnsupportedArtifact(String),

    /// Nothing safe is left of the filename after sanitizing.
    #[error("artifact filename '{0}' is not safe to store")]
    UnsafeFilename(String),

    /// The artifact exceeds the configured size bound.
    #[error("artifact is {size} bytes (limit {limit})")]
    TooLarge { size: usize, limit: usize },

    /// Parsed document failed validation (kind, version, names, limits).
    #[error("validation error: {0}")]
    Validation(String),
}

impl LoadError {
    /// True when the artifact itself was readable but its content was rejected.
    pub fn is_content_error(&self) -> bool {
        matches!(self, LoadError::Parse(_) | LoadError::Validation(_))
    }
}

/// Result alias for loader operations.
pub type Result<T> = std::result::Result<T, LoadError>;

/// Outcome of loading a single file during a directory scan.
#[derive(Debug)]
pub struct LoadResult {
    /// Path to the file that was considered.
    pub path: PathBuf,
    /// Status of the load attempt.
    pub status: LoadStatus,
}

/// Status of a single file load attempt.
#[derive(Debug)]
pub enum LoadStatus {
    /// File parsed into one or more rulesets.
    Loaded { definitions: Vec<RulesetDefinition> },
    /// File was skipped (dotfile, wrong extension, etc.).
    Skipped { reason: String },
    /// Parse or validation error occurred.
    Failed { error: String },
}

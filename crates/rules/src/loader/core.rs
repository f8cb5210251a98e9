//! Core [`ArtifactLoader`] struct: upload checks, staging, and directory scans.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::schema::{DefinitionEnvelope, RegistrationLimits, RulesetDefinition};

use super::error::{LoadError, LoadResult, LoadStatus, Result};
use super::sanitize::secure_filename;

/// Filesystem-backed artifact loader.
///
/// Owns the upload directory. Every accepted artifact is stored there under
/// its sanitized filename; nothing is written outside it.
#[derive(Debug, Clone)]
pub struct ArtifactLoader {
    upload_dir: PathBuf,
    /// Lowercase extensions without the leading dot.
    allowed_extensions: Vec<String>,
    max_bytes: usize,
    limits: RegistrationLimits,
}

/// An artifact written to a temporary file and parsed, not yet in place.
///
/// Call [`commit`](StagedArtifact::commit) to move it over the stored file,
/// or [`discard`](StagedArtifact::discard) to drop it.
#[derive(Debug)]
pub struct StagedArtifact {
    pub filename: String,
    pub definitions: Vec<RulesetDefinition>,
    tmp_path: PathBuf,
    final_path: PathBuf,
}

impl StagedArtifact {
    /// Ruleset names the artifact defines, in document order.
    pub fn names(&self) -> Vec<String> {
        self.definitions.iter().map(|d| d.name.clone()).collect()
    }

    pub fn commit(self) -> Result<(String, Vec<RulesetDefinition>)> {
        fs::rename(&self.tmp_path, &self.final_path)?;
        info!(filename = %self.filename, path = %self.final_path.display(), "stored artifact");
        Ok((self.filename, self.definitions))
    }

    pub fn discard(self) {
        if let Err(e) = fs::remove_file(&self.tmp_path) {
            warn!(path = %self.tmp_path.display(), error = %e, "failed to remove staged artifact");
        }
    }
}

impl ArtifactLoader {
    /// Create a loader for `upload_dir`, creating the directory if needed.
    ///
    /// Fails if the directory cannot be created (for example when the path
    /// is an existing file).
    pub fn new(
        upload_dir: PathBuf,
        allowed_extensions: Vec<String>,
        max_bytes: usize,
    ) -> Result<Self> {
        fs::create_dir_all(&upload_dir)?;
        Ok(Self {
            upload_dir,
            allowed_extensions,
            max_bytes,
            limits: RegistrationLimits::default(),
        })
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// True if `filename` has an extension on the allowlist (case-insensitive).
    pub fn is_allowed(&self, filename: &str) -> bool {
        match filename.rsplit_once('.') {
            Some((_, ext)) => {
                let ext = ext.to_ascii_lowercase();
                self.allowed_extensions.iter().any(|allowed| *allowed == ext)
            }
            None => false,
        }
    }

    /// Validate an upload's filename and size; returns the sanitized filename.
    pub fn check(&self, filename: Option<&str>, size: usize) -> Result<String> {
        let raw = filename
            .filter(|f| !f.is_empty())
            .ok_or(LoadError::MissingArtifact)?;
        if !self.is_allowed(raw) {
            return Err(LoadError::UnsupportedArtifact(raw.to_string()));
        }
        let safe = secure_filename(raw)
            .filter(|safe| self.is_allowed(safe))
            .ok_or_else(|| LoadError::UnsafeFilename(raw.to_string()))?;
        if size > self.max_bytes {
            return Err(LoadError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        Ok(safe)
    }

    /// Check, write to a temp file beside the destination, and parse.
    ///
    /// On any failure the temp file is removed and the stored artifact (if
    /// any) is left untouched.
    pub fn stage(&self, filename: Option<&str>, bytes: &[u8]) -> Result<StagedArtifact> {
        let filename = self.check(filename, bytes.len())?;
        let final_path = self.upload_dir.join(&filename);
        let tmp_path = self.upload_dir.join(format!(".{}.tmp", filename));

        fs::write(&tmp_path, bytes)?;
        let staged = StagedArtifact {
            filename,
            definitions: Vec::new(),
            tmp_path,
            final_path,
        };
        match self.parse_bytes(bytes) {
            Ok(definitions) => Ok(StagedArtifact {
                definitions,
                ..staged
            }),
            Err(e) => {
                staged.discard();
                Err(e)
            }
        }
    }

    /// Parse a document into rulesets via two-pass deserialization.
    ///
    /// First pass reads the envelope (`apiVersion`, `kind`); second pass
    /// deserializes the kind-specific body and validates it.
    pub fn parse(&self, text: &str) -> Result<Vec<RulesetDefinition>> {
        let envelope: DefinitionEnvelope = serde_yaml::from_str(text)?;
        envelope
            .parse_full(&self.limits)
            .map_err(LoadError::Validation)
    }

    fn parse_bytes(&self, bytes: &[u8]) -> Result<Vec<RulesetDefinition>> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| LoadError::Validation("artifact is not valid UTF-8".to_string()))?;
        self.parse(text)
    }

    /// Read and parse one file, enforcing the size bound.
    pub fn load_file(&self, path: &Path) -> Result<Vec<RulesetDefinition>> {
        let bytes = fs::read(path)?;
        if bytes.len() > self.max_bytes {
            return Err(LoadError::TooLarge {
                size: bytes.len(),
                limit: self.max_bytes,
            });
        }
        self.parse_bytes(&bytes)
    }

    /// Recursively scan `dir` for `*.yml` / `*.yaml` built-in definitions.
    ///
    /// Dotfiles and other extensions are skipped. Parse errors are reported
    /// per-file but do not abort the scan. A missing directory yields no results.
    pub fn load_builtins(&self, dir: &Path) -> Result<Vec<LoadResult>> {
        let mut results = Vec::new();
        if dir.exists() {
            self.scan_dir_recursive(dir, &mut results)?;
        }
        Ok(results)
    }

    fn scan_dir_recursive(&self, dir: &Path, results: &mut Vec<LoadResult>) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "failed to read directory");
                return Ok(());
            }
        };

        let mut paths = entries
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        paths.sort();

        for path in paths {
            if is_dotfile(&path) {
                if path.is_file() {
                    results.push(skipped(path, "dotfile"));
                }
                continue;
            }

            if path.is_dir() {
                self.scan_dir_recursive(&path, results)?;
                continue;
            }

            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e == "yml" || e == "yaml")
                .unwrap_or(false);
            if !is_yaml {
                results.push(skipped(path, "not a YAML file"));
                continue;
            }

            results.push(self.load_entry(path, "built-in"));
        }
        Ok(())
    }

    /// Re-read every stored artifact in the upload directory, in filename order.
    pub fn replay_uploads(&self) -> Result<Vec<LoadResult>> {
        let mut results = Vec::new();
        if !self.upload_dir.exists() {
            return Ok(results);
        }

        let mut paths = fs::read_dir(&self.upload_dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        paths.sort();

        for path in paths {
            if !path.is_file() {
                continue;
            }
            if is_dotfile(&path) {
                results.push(skipped(path, "dotfile"));
                continue;
            }
            let allowed = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| self.is_allowed(n))
                .unwrap_or(false);
            if !allowed {
                results.push(skipped(path, "extension not allowed"));
                continue;
            }
            results.push(self.load_entry(path, "stored"));
        }
        Ok(results)
    }

    fn load_entry(&self, path: PathBuf, origin: &str) -> LoadResult {
        match self.load_file(&path) {
            Ok(definitions) => {
                let names: Vec<&str> = definitions.iter().map(|d| d.name.as_str()).collect();
                info!(origin, rulesets = ?names, path = %path.display(), "loaded definitions");
                LoadResult {
                    path,
                    status: LoadStatus::Loaded { definitions },
                }
            }
            Err(e) => {
                warn!(origin, path = %path.display(), error = %e, "failed to load definition file");
                LoadResult {
                    path,
                    status: LoadStatus::Failed {
                        error: e.to_string(),
                    },
                }
            }
        }
    }
}

fn is_dotfile(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

fn skipped(path: PathBuf, reason: &str) -> LoadResult {
    LoadResult {
        path,
        status: LoadStatus::Skipped {
            reason: reason.to_string(),
        },
    }
}

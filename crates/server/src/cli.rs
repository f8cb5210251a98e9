//! CLI argument parsing.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use rulegate_rules::ArtifactLoader;

/// HTTP gateway for a stateful ruleset host.
#[derive(Parser, Debug)]
#[command(name = "rulegate", version, about = "HTTP gateway for a stateful ruleset host")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server (default)
    Serve {
        /// Bind address override
        #[arg(long)]
        host: Option<String>,

        /// Port override
        #[arg(long)]
        port: Option<u16>,
    },
    /// Validate an artifact offline and print the rulesets it would register
    Check {
        artifact: PathBuf,
    },
}

/// Parse `artifact` with the configured size bound; returns the ruleset names.
pub fn check(config: &rulegate_core::Config, artifact: &Path) -> anyhow::Result<Vec<String>> {
    let dir = artifact
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let loader = ArtifactLoader::new(
        dir.to_path_buf(),
        config.rules.allowed_extensions.clone(),
        config.rules.max_artifact_bytes,
    )?;

    let definitions = loader
        .load_file(artifact)
        .with_context(|| format!("{} is not a valid artifact", artifact.display()))?;
    Ok(definitions.into_iter().map(|d| d.name).collect())
}

//! Server startup: definition loading and shared state initialization.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use rulegate_rules::loader::{LoadResult, LoadStatus};
use rulegate_rules::{ArtifactLoader, DefinitionRegistry, RulesetBridge, StartHook, StateStore};

use crate::auth::UserStore;
use crate::state::AppState;

/// Build `AppState`: built-in definitions, optional upload replay, startup
/// hooks, the initial host and the user store.
pub fn build_app_state(
    config: &rulegate_core::Config,
    hooks: Vec<StartHook>,
) -> anyhow::Result<Arc<AppState>> {
    let rules = &config.rules;
    let loader = ArtifactLoader::new(
        rules.upload_dir.clone(),
        rules.allowed_extensions.clone(),
        rules.max_artifact_bytes,
    )
    .with_context(|| format!("cannot create upload directory {}", rules.upload_dir.display()))?;

    let mut registry = DefinitionRegistry::new();

    let builtins = loader.load_builtins(&rules.builtin_dir)?;
    report("built-in", &builtins);
    for result in builtins {
        if let LoadStatus::Loaded { definitions } = result.status {
            for definition in definitions {
                registry.add_builtin(definition);
            }
        }
    }

    if rules.replay_uploads {
        let uploads = loader.replay_uploads()?;
        report("stored", &uploads);
        for result in uploads {
            let Some(filename) = result.path.file_name().and_then(|n| n.to_str()).map(str::to_string)
            else {
                continue;
            };
            if let LoadStatus::Loaded { definitions } = result.status {
                registry.register_artifact(&filename, definitions);
            }
        }
    }

    for hook in hooks {
        registry.add_hook(hook);
    }

    let store = StateStore::shared(config.engine.state_cache_size);
    let bridge = RulesetBridge::new(registry, loader, store)?;
    info!(rulesets = ?bridge.list_rulesets(), "host started");

    let users = UserStore::new().with_user(&config.auth.admin_user, &config.auth.admin_password);

    Ok(Arc::new(AppState {
        bridge: Arc::new(bridge),
        users,
        max_artifact_bytes: rules.max_artifact_bytes,
        cors_origin: config.server.cors_origin.clone(),
    }))
}

fn report(origin: &str, results: &[LoadResult]) {
    let mut loaded = 0;
    let mut failed = 0;
    for result in results {
        match &result.status {
            LoadStatus::Loaded { .. } => loaded += 1,
            LoadStatus::Failed { error } => {
                failed += 1;
                warn!(origin, path = %result.path.display(), error = %error, "definition file not loaded");
            }
            LoadStatus::Skipped { .. } => {}
        }
    }
    info!(origin, loaded, failed, "definition files scanned");
}

//! Ruleset registry bridge: the single handle the gateway holds.
//!
//! Reads take a lock-free snapshot of the current [`Host`]. Registry changes
//! (artifact loads, deletes) are serialized by a mutex, build a brand-new
//! host off to the side and swap it in only once it is fully running. A
//! failed rebuild leaves the previous host, registry and stored artifact
//! untouched.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use tracing::{info, warn};

use crate::host::Host;
use crate::loader::{ArtifactLoader, LoadError};
use crate::registry::DefinitionRegistry;
use crate::store::SharedStateStore;

/// Which precondition a definition load enforces on the path name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Only proceed if the name is not registered yet.
    Create,
    /// Only proceed if the name is already registered.
    Update,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The artifact was stored and the host rebuilt; names it registered.
    Registered(Vec<String>),
    /// Create was a no-op: the name already exists.
    AlreadyExists(String),
    /// Update was a no-op: the name does not exist.
    NotFound(String),
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The upload was rejected before interpretation (or could not be stored).
    #[error(transparent)]
    Artifact(LoadError),

    /// Interpreting the artifact or starting the new host failed.
    #[error("reload failed: {0}")]
    Reload(String),

    #[error("unknown ruleset '{0}'")]
    UnknownRuleset(String),
}

impl From<LoadError> for BridgeError {
    fn from(e: LoadError) -> Self {
        if e.is_content_error() {
            BridgeError::Reload(e.to_string())
        } else {
            BridgeError::Artifact(e)
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

pub struct RulesetBridge {
    host: ArcSwap<Host>,
    registry: Mutex<DefinitionRegistry>,
    loader: ArtifactLoader,
    store: SharedStateStore,
    generation: AtomicU64,
}

impl RulesetBridge {
    /// Build and start the initial host from `registry`.
    pub fn new(
        registry: DefinitionRegistry,
        loader: ArtifactLoader,
        store: SharedStateStore,
    ) -> Result<Self> {
        let host = start_host(&registry, &store)?;
        Ok(Self {
            host: ArcSwap::new(host),
            registry: Mutex::new(registry),
            loader,
            store,
            generation: AtomicU64::new(0),
        })
    }

    /// Snapshot of the live host. Stays valid (if stale) across swaps.
    pub fn current(&self) -> Arc<Host> {
        self.host.load_full()
    }

    pub fn list_rulesets(&self) -> Vec<String> {
        self.host.load().list_rulesets()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.host.load().get_ruleset(name).is_some()
    }

    /// Number of host swaps since startup.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn loader(&self) -> &ArtifactLoader {
        &self.loader
    }

    /// Stage, interpret and register an uploaded artifact, then swap hosts.
    ///
    /// The create/update precondition on `name` is checked under the
    /// registry lock, so it cannot race another load or delete.
    pub fn load_definition(
        &self,
        mode: LoadMode,
        name: &str,
        filename: Option<&str>,
        bytes: &[u8],
    ) -> Result<LoadOutcome> {
        let mut registry = self.registry.lock().expect("registry lock poisoned");

        match (mode, registry.contains(name)) {
            (LoadMode::Create, true) => return Ok(LoadOutcome::AlreadyExists(name.to_string())),
            (LoadMode::Update, false) => return Ok(LoadOutcome::NotFound(name.to_string())),
            _ => {}
        }

        let staged = self.loader.stage(filename, bytes).map_err(|e| {
            warn!(ruleset = %name, error = %e, "artifact rejected");
            BridgeError::from(e)
        })?;
        let names = staged.names();

        let mut next = registry.clone();
        next.register_artifact(&staged.filename, staged.definitions.clone());
        let host = match start_host(&next, &self.store) {
            Ok(host) => host,
            Err(e) => {
                warn!(ruleset = %name, error = %e, "reload aborted, keeping current host");
                staged.discard();
                return Err(e);
            }
        };

        staged.commit().map_err(BridgeError::Artifact)?;
        *registry = next;
        self.swap(host);
        info!(ruleset = %name, ?mode, registered = ?names, "definition loaded");
        Ok(LoadOutcome::Registered(names))
    }

    /// Remove `name` and rebuild from the remaining definitions.
    ///
    /// The stored artifact is kept on disk. Returns the new listing.
    pub fn delete_ruleset(&self, name: &str) -> Result<Vec<String>> {
        let mut registry = self.registry.lock().expect("registry lock poisoned");

        let mut next = registry.clone();
        if !next.remove(name) {
            return Err(BridgeError::UnknownRuleset(name.to_string()));
        }
        let host = start_host(&next, &self.store)?;

        *registry = next;
        let listing = host.list_rulesets();
        self.swap(host);
        info!(ruleset = %name, "ruleset deleted");
        Ok(listing)
    }

    fn swap(&self, host: Arc<Host>) {
        let rulesets = host.list_rulesets().len();
        let old = self.host.swap(host);
        old.deactivate();
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        info!(generation, rulesets, "host swapped");
    }
}

fn start_host(registry: &DefinitionRegistry, store: &SharedStateStore) -> Result<Arc<Host>> {
    let host = Host::new(registry.resolve(), Arc::clone(store));
    host.run(registry.hooks())
        .map_err(|e| BridgeError::Reload(e.to_string()))?;
    Ok(Arc::new(host))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::thread;

    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::error::EngineError;
    use crate::host::StartHook;
    use crate::schema::RulesetDefinition;
    use crate::store::StateStore;

    const T1: &str = "apiVersion: v1\nkind: Ruleset\nname: t1\nrules:\n  - name: on_k\n    when: { k: 1 }\n    then: { set: { seen_k: true } }\n";
    const T1_V2: &str = "apiVersion: v1\nkind: Ruleset\nname: t1\ndescription: second\n";

    fn base() -> RulesetDefinition {
        RulesetDefinition {
            name: "base".into(),
            description: None,
            rules: Vec::new(),
            startup: None,
        }
    }

    fn bridge_with(registry: DefinitionRegistry) -> (TempDir, RulesetBridge) {
        let dir = TempDir::new().expect("create tempdir");
        let loader = ArtifactLoader::new(dir.path().join("rules"), vec!["py".into()], 4096).unwrap();
        let bridge = RulesetBridge::new(registry, loader, StateStore::shared(16)).unwrap();
        (dir, bridge)
    }

    fn bridge() -> (TempDir, RulesetBridge) {
        let mut registry = DefinitionRegistry::new();
        registry.add_builtin(base());
        bridge_with(registry)
    }

    #[test]
    fn create_registers_and_swaps() {
        let (_dir, bridge) = bridge();
        let before = bridge.current();
        assert!(before.is_active());

        let outcome = bridge
            .load_definition(LoadMode::Create, "t1", Some("t1.py"), T1.as_bytes())
            .unwrap();
        assert_eq!(outcome, LoadOutcome::Registered(vec!["t1".into()]));
        assert_eq!(bridge.list_rulesets(), vec!["base", "t1"]);
        assert_eq!(bridge.generation(), 1);
        assert!(!before.is_active());
        assert!(bridge.current().is_active());
        assert!(bridge.loader().upload_dir().join("t1.py").exists());
    }

    #[test]
    fn create_and_update_preconditions_are_no_ops() {
        let (_dir, bridge) = bridge();
        let outcome = bridge
            .load_definition(LoadMode::Create, "base", Some("x.py"), T1.as_bytes())
            .unwrap();
        assert_eq!(outcome, LoadOutcome::AlreadyExists("base".into()));

        let outcome = bridge
            .load_definition(LoadMode::Update, "t1", Some("t1.py"), T1.as_bytes())
            .unwrap();
        assert_eq!(outcome, LoadOutcome::NotFound("t1".into()));

        assert_eq!(bridge.list_rulesets(), vec!["base"]);
        assert_eq!(bridge.generation(), 0);
        assert_eq!(fs::read_dir(bridge.loader().upload_dir()).unwrap().count(), 0);
    }

    #[test]
    fn update_replaces_the_definition() {
        let (_dir, bridge) = bridge();
        bridge
            .load_definition(LoadMode::Create, "t1", Some("t1.py"), T1.as_bytes())
            .unwrap();
        bridge
            .load_definition(LoadMode::Update, "t1", Some("t1.py"), T1_V2.as_bytes())
            .unwrap();

        let host = bridge.current();
        let t1 = host.get_ruleset("t1").unwrap();
        assert_eq!(t1.description.as_deref(), Some("second"));
        assert!(t1.rules.is_empty());
    }

    #[test]
    fn failed_interpretation_keeps_everything() {
        let (_dir, bridge) = bridge();
        bridge
            .load_definition(LoadMode::Create, "t1", Some("t1.py"), T1.as_bytes())
            .unwrap();
        let host = bridge.current();

        let err = bridge
            .load_definition(LoadMode::Update, "t1", Some("t1.py"), b"apiVersion: v1\nkind: Ruleset\n")
            .unwrap_err();
        assert!(matches!(err, BridgeError::Reload(_)), "{}", err);

        assert!(Arc::ptr_eq(&host, &bridge.current()));
        assert!(host.is_active());
        let stored = fs::read_to_string(bridge.loader().upload_dir().join("t1.py")).unwrap();
        assert_eq!(stored, T1);
    }

    #[test]
    fn rejected_uploads_are_artifact_errors() {
        let (_dir, bridge) = bridge();
        let err = bridge
            .load_definition(LoadMode::Create, "t1", Some("t1.txt"), T1.as_bytes())
            .unwrap_err();
        assert!(matches!(err, BridgeError::Artifact(LoadError::UnsupportedArtifact(_))));

        let err = bridge
            .load_definition(LoadMode::Create, "t1", None, T1.as_bytes())
            .unwrap_err();
        assert!(matches!(err, BridgeError::Artifact(LoadError::MissingArtifact)));
    }

    #[test]
    fn failing_hook_aborts_reload() {
        let mut registry = DefinitionRegistry::new();
        registry.add_builtin(base());
        let hook: StartHook = Arc::new(|host: &Host| {
            if host.get_ruleset("t1").is_some() {
                Err(EngineError::Startup("t1 not allowed".into()))
            } else {
                Ok(())
            }
        });
        registry.add_hook(hook);
        let (_dir, bridge) = bridge_with(registry);

        let err = bridge
            .load_definition(LoadMode::Create, "t1", Some("t1.py"), T1.as_bytes())
            .unwrap_err();
        assert!(err.to_string().contains("t1 not allowed"), "{}", err);
        assert_eq!(bridge.list_rulesets(), vec!["base"]);
        assert!(!bridge.loader().upload_dir().join("t1.py").exists());
    }

    #[test]
    fn failed_reload_leaves_session_state_alone() {
        let mut registry = DefinitionRegistry::new();
        registry.add_builtin(base());
        let hook: StartHook = Arc::new(|host: &Host| {
            if host.get_ruleset("z").is_some() {
                Err(EngineError::Startup("z not allowed".into()))
            } else {
                Ok(())
            }
        });
        registry.add_hook(hook);
        let (_dir, bridge) = bridge_with(registry);
        bridge
            .load_definition(LoadMode::Create, "t1", Some("t1.py"), T1.as_bytes())
            .unwrap();
        let state = || bridge.current().get_state("t1", None).unwrap().to_json().unwrap();
        let before = state();

        let bundle = "apiVersion: v1\nkind: RulesetBundle\nrulesets:\n  - name: t1\n    startup:\n      state: { mode: evil }\n  - name: z\n";
        let err = bridge
            .load_definition(LoadMode::Update, "t1", Some("t1.py"), bundle.as_bytes())
            .unwrap_err();
        assert!(matches!(err, BridgeError::Reload(_)), "{}", err);
        assert_eq!(state(), before);
        assert_eq!(bridge.list_rulesets(), vec!["base", "t1"]);
    }

    #[test]
    fn delete_removes_only_that_name() {
        let (_dir, bridge) = bridge();
        bridge
            .load_definition(LoadMode::Create, "t1", Some("t1.py"), T1.as_bytes())
            .unwrap();

        let listing = bridge.delete_ruleset("t1").unwrap();
        assert_eq!(listing, vec!["base"]);
        assert_eq!(bridge.list_rulesets(), vec!["base"]);
        assert!(matches!(
            bridge.delete_ruleset("t1"),
            Err(BridgeError::UnknownRuleset(_))
        ));

        // Creating again after a delete is allowed.
        let outcome = bridge
            .load_definition(LoadMode::Create, "t1", Some("t1.py"), T1.as_bytes())
            .unwrap();
        assert_eq!(outcome, LoadOutcome::Registered(vec!["t1".into()]));
    }

    #[test]
    fn session_state_survives_reload() {
        let (_dir, bridge) = bridge();
        bridge
            .load_definition(LoadMode::Create, "t1", Some("t1.py"), T1.as_bytes())
            .unwrap();
        bridge.current().post("t1", json!({"sid": "s", "k": 1})).unwrap();

        bridge
            .load_definition(LoadMode::Update, "t1", Some("t1.py"), T1.as_bytes())
            .unwrap();
        let state = bridge.current().get_state("t1", Some("s")).unwrap();
        assert_eq!(state.to_json().unwrap(), json!({"sid": "s", "seen_k": true}));
    }

    #[test]
    fn readers_never_see_a_partial_host() {
        let (_dir, bridge) = bridge();

        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..200 {
                        let host = bridge.current();
                        let names = host.list_rulesets();
                        assert!(
                            names == ["base"] || names == ["base", "t1"],
                            "unexpected listing {:?}",
                            names
                        );
                        for name in &names {
                            assert!(host.get_ruleset(name).is_some());
                        }
                    }
                });
            }

            for _ in 0..20 {
                bridge
                    .load_definition(LoadMode::Create, "t1", Some("t1.py"), T1.as_bytes())
                    .unwrap();
                bridge.delete_ruleset("t1").unwrap();
            }
        });

        assert_eq!(bridge.generation(), 40);
        assert_eq!(bridge.list_rulesets(), vec!["base"]);
    }
}

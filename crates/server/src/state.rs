use std::sync::Arc;

use rulegate_rules::RulesetBridge;

use crate::auth::UserStore;

/// Shared handler state. The bridge is the only path to the live host.
pub struct AppState {
    pub bridge: Arc<RulesetBridge>,
    pub users: UserStore,
    pub max_artifact_bytes: usize,
    pub cors_origin: String,
}

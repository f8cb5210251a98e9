//! HTTP router construction.
//!
//! Assembles the gateway's single route table and middleware into a `Router`.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::api;
use crate::state::AppState;

/// Headroom on top of the artifact bound for multipart framing.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the complete application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.max_artifact_bytes.saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/health", get(api::health))
        // /rulesets/events MUST stay static so "rulesets" is never captured as {name}
        .route("/rulesets", get(api::list_rulesets))
        .route("/rulesets/events", post(api::broadcast_event))
        .route(
            "/{name}/definition",
            get(api::get_definition)
                .post(api::create_definition)
                .patch(api::update_definition)
                .delete(api::delete_definition)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        // {name} is the user name here; one parameter name per segment keeps the table unambiguous
        .route("/{name}/password", post(api::change_password))
        .route("/{name}/state", get(api::get_state).post(api::patch_state))
        .route(
            "/{name}/state/{sid}",
            get(api::get_session_state).post(api::patch_session_state),
        )
        .route("/{name}/events", post(api::post_event))
        .route("/{name}/events/{sid}", post(api::post_session_event))
        .route("/{name}/facts", post(api::assert_fact))
        .route("/{name}/facts/{sid}", post(api::assert_session_fact))
        .layer(cors_layer(&state.cors_origin))
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    if origin == "*" {
        return CorsLayer::permissive();
    }
    match HeaderValue::from_str(origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any),
        Err(e) => {
            warn!(origin, error = %e, "invalid CORS origin, cross-origin requests disabled");
            CorsLayer::new()
        }
    }
}

//! Ruleset definition endpoints: read, create, update, delete.
//!
//! Create, update and delete are gated. The reload itself (artifact write,
//! interpretation, host rebuild) runs on a blocking worker.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use rulegate_rules::{LoadError, LoadMode, LoadOutcome};

use crate::auth::Authorized;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// GET /{name}/definition
pub async fn get_definition(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let host = state.bridge.current();
    let definition = host
        .get_ruleset(&name)
        .ok_or_else(|| ApiError::NotFound(format!("ruleset '{}' not found", name)))?;
    Ok(Json(definition.get_definition().to_json()?))
}

/// POST /{name}/definition: no-op if `name` already exists.
pub async fn create_definition(
    _auth: Authorized,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Value>> {
    load(&state, LoadMode::Create, name, multipart).await
}

/// PATCH /{name}/definition: no-op if `name` does not exist.
pub async fn update_definition(
    _auth: Authorized,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Value>> {
    load(&state, LoadMode::Update, name, multipart).await
}

/// DELETE /{name}/definition
pub async fn delete_definition(
    _auth: Authorized,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let bridge = Arc::clone(&state.bridge);
    let listing = tokio::task::spawn_blocking(move || bridge.delete_ruleset(&name))
        .await
        .map_err(|e| ApiError::Internal(format!("delete task failed: {}", e)))??;
    Ok(Json(json!({ "registered_rulesets": listing })))
}

async fn load(
    state: &AppState,
    mode: LoadMode,
    name: String,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Value>> {
    // Checked before the upload is read; the bridge repeats it under its lock.
    if let Some(outcome) = precondition(mode, &name, state.bridge.contains(&name)) {
        return Ok(Json(outcome_body(outcome, state.bridge.list_rulesets())));
    }

    let mut multipart = multipart.map_err(|_| ApiError::Artifact(LoadError::MissingArtifact))?;
    let (filename, bytes) = read_artifact(&mut multipart).await?;

    let bridge = Arc::clone(&state.bridge);
    let outcome = tokio::task::spawn_blocking(move || {
        bridge.load_definition(mode, &name, filename.as_deref(), &bytes)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("reload task failed: {}", e)))??;

    Ok(Json(outcome_body(outcome, state.bridge.list_rulesets())))
}

fn precondition(mode: LoadMode, name: &str, exists: bool) -> Option<LoadOutcome> {
    match (mode, exists) {
        (LoadMode::Create, true) => Some(LoadOutcome::AlreadyExists(name.to_string())),
        (LoadMode::Update, false) => Some(LoadOutcome::NotFound(name.to_string())),
        _ => None,
    }
}

fn outcome_body(outcome: LoadOutcome, listing: Vec<String>) -> Value {
    match outcome {
        LoadOutcome::Registered(_) => json!({ "registered_rulesets": listing }),
        LoadOutcome::AlreadyExists(name) => json!({
            "message": format!("Ruleset {} already exists", name),
            "registered_rulesets": listing,
        }),
        LoadOutcome::NotFound(name) => json!({
            "message": format!("Ruleset {} does not exist", name),
            "registered_rulesets": listing,
        }),
    }
}

/// Read the `file` part. Other parts are skipped.
async fn read_artifact(multipart: &mut Multipart) -> ApiResult<(Option<String>, Bytes)> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?;
        return Ok((filename, bytes));
    }
    Ok((None, Bytes::new()))
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::BadRequest(format!("multipart error: {}", e.body_text()))
    }
}

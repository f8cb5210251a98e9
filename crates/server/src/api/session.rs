//! Session-scoped state, event and fact endpoints.
//!
//! Routes without a `{sid}` segment address the session named in the body
//! (or the default session). Routes with one force it onto the body.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use serde_json::Value;

use crate::error::ApiResult;
use crate::state::AppState;

use super::{engine_json, inject_sid, parse_body};

// ── State ────────────────────────────────────────────────────────

pub async fn get_state(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    engine_json(state.bridge.current().get_state(&name, None))
}

pub async fn patch_state(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let message = parse_body(&body)?;
    engine_json(state.bridge.current().patch_state(&name, message))
}

pub async fn get_session_state(
    State(state): State<Arc<AppState>>,
    Path((name, sid)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    engine_json(state.bridge.current().get_state(&name, Some(&sid)))
}

pub async fn patch_session_state(
    State(state): State<Arc<AppState>>,
    Path((name, sid)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let message = inject_sid(parse_body(&body)?, &sid)?;
    engine_json(state.bridge.current().patch_state(&name, message))
}

// ── Events ───────────────────────────────────────────────────────

pub async fn post_event(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let message = parse_body(&body)?;
    engine_json(state.bridge.current().post(&name, message))
}

pub async fn post_session_event(
    State(state): State<Arc<AppState>>,
    Path((name, sid)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let message = inject_sid(parse_body(&body)?, &sid)?;
    engine_json(state.bridge.current().post(&name, message))
}

// ── Facts ────────────────────────────────────────────────────────

pub async fn assert_fact(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let message = parse_body(&body)?;
    engine_json(state.bridge.current().assert_fact(&name, message))
}

pub async fn assert_session_fact(
    State(state): State<Arc<AppState>>,
    Path((name, sid)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let message = inject_sid(parse_body(&body)?, &sid)?;
    engine_json(state.bridge.current().assert_fact(&name, message))
}

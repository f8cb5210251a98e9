//! Registry-wide endpoints: listing and broadcast.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde_json::Value;

use rulegate_rules::{validate_message, EngineValue};

use crate::error::ApiResult;
use crate::state::AppState;

use super::parse_body;

/// GET /rulesets
pub async fn list_rulesets(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.bridge.list_rulesets())
}

/// POST /rulesets/events: post one event to every ruleset.
///
/// Returns one result per ruleset, in listing order, all from the same host.
/// The message is checked once up front, so it reaches every ruleset or none.
pub async fn broadcast_event(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let message = parse_body(&body)?;
    validate_message(&message)?;
    let host = state.bridge.current();

    let results = host
        .list_rulesets()
        .iter()
        .map(|name| host.post(name, message.clone()))
        .collect::<Result<Vec<_>, _>>()?;
    let results = results
        .iter()
        .map(EngineValue::to_json)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(Value::Array(results)))
}

//! Domain-focused API endpoint modules.
//!
//! Each sub-module owns a single responsibility area.
//! Shared body handling lives here in mod.rs.

mod definition;
mod health;
mod rulesets;
mod session;
mod users;

use axum::body::Bytes;
use axum::Json;
use serde_json::Value;

use rulegate_rules::{EngineError, EngineValue};

use crate::error::{ApiError, ApiResult};

// ── Body handling ────────────────────────────────────────────────

/// Parse a request body as a single JSON value. Empty bodies are rejected.
pub(crate) fn parse_body(body: &Bytes) -> ApiResult<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::BadRequest("request body must be JSON".to_string()));
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("malformed JSON body: {}", e)))
}

/// Overwrite the body's `sid` with the one from the path.
///
/// Objects get the field set; batches get it on every element.
pub(crate) fn inject_sid(message: Value, sid: &str) -> ApiResult<Value> {
    match message {
        Value::Object(mut fields) => {
            fields.insert("sid".to_string(), Value::String(sid.to_string()));
            Ok(Value::Object(fields))
        }
        Value::Array(items) => items
            .into_iter()
            .map(|item| inject_sid_item(item, sid))
            .collect::<ApiResult<Vec<_>>>()
            .map(Value::Array),
        _ => Err(ApiError::BadRequest(
            "body must be a JSON object or an array of objects".to_string(),
        )),
    }
}

fn inject_sid_item(item: Value, sid: &str) -> ApiResult<Value> {
    match item {
        Value::Object(mut fields) => {
            fields.insert("sid".to_string(), Value::String(sid.to_string()));
            Ok(Value::Object(fields))
        }
        _ => Err(ApiError::BadRequest(
            "batch elements must be JSON objects".to_string(),
        )),
    }
}

/// Encode a host result, rendering callables and promises as `"function"`.
pub(crate) fn engine_json(result: Result<EngineValue, EngineError>) -> ApiResult<Json<Value>> {
    Ok(Json(result?.to_json()?))
}

// ── Re-exports ───────────────────────────────────────────────────
// Flat `api::foo` paths used by router.rs route registration.

pub use definition::{create_definition, delete_definition, get_definition, update_definition};
pub use health::health;
pub use rulesets::{broadcast_event, list_rulesets};
pub use session::{
    assert_fact, assert_session_fact, get_session_state, get_state, patch_session_state,
    patch_state, post_event, post_session_event,
};
pub use users::change_password;

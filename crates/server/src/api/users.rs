//! Password change endpoint.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde_json::Value;
use tracing::{info, warn};

use crate::auth::Authorized;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

use super::parse_body;

/// POST /{user}/password: self-service only.
pub async fn change_password(
    Authorized(credential): Authorized,
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    if credential.username != user {
        warn!(user = %credential.username, target = %user, "password change for another user rejected");
        return Err(ApiError::Forbidden);
    }

    let payload = parse_body(&body)?;
    let password = payload
        .get("password")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::BadRequest("body must carry a string 'password'".to_string()))?;

    if !state.users.set_password(&user, password) {
        return Err(ApiError::Forbidden);
    }
    info!(user = %user, "password changed");
    Ok(StatusCode::OK)
}

//! HTTP error type shared by every handler.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

use rulegate_rules::{BridgeError, EncodeError, EngineError, LoadError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Authorization failed. Carries no detail.
    #[error("forbidden")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    /// Malformed JSON, bad body shape, missing fields.
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error(transparent)]
    Artifact(LoadError),

    /// Artifact interpretation or host startup failed; previous host kept.
    #[error("{0}")]
    Reload(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// An engine value had no JSON form.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("{0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Artifact(LoadError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Artifact(LoadError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Artifact(_) => StatusCode::BAD_REQUEST,
            ApiError::Reload(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Engine(EngineError::UnknownRuleset(_)) => StatusCode::NOT_FOUND,
            ApiError::Engine(EngineError::InvalidMessage(_)) => StatusCode::BAD_REQUEST,
            ApiError::Engine(EngineError::Startup(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Encode(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<BridgeError> for ApiError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::Artifact(e) => ApiError::Artifact(e),
            BridgeError::Reload(message) => ApiError::Reload(message),
            BridgeError::UnknownRuleset(name) => {
                ApiError::NotFound(format!("ruleset '{}' not found", name))
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            ApiError::Artifact(LoadError::Io(_)) | ApiError::Internal(_) => {
                error!(error = %self, "request failed");
                "internal server error".to_string()
            }
            _ if status.is_server_error() => {
                error!(error = %self, "request failed");
                self.to_string()
            }
            ApiError::Forbidden => self.to_string(),
            _ => {
                warn!(status = status.as_u16(), error = %self, "request rejected");
                self.to_string()
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_error_table() {
        assert_eq!(ApiError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::Artifact(LoadError::MissingArtifact).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Artifact(LoadError::TooLarge { size: 2, limit: 1 }).status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::Reload("bad".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::from(EngineError::UnknownRuleset("x".into())).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(BridgeError::UnknownRuleset("x".into())).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(EncodeError("<x>".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

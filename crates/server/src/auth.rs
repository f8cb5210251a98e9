//! Authorization gate: HTTP Basic credentials checked against the user store.
//!
//! Only registry mutations and password changes take the [`Authorized`]
//! extractor. State, event, fact and definition-read routes stay open.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

/// Username and password taken from a Basic `Authorization` header.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Process-wide username -> password map. Not persisted.
#[derive(Default)]
pub struct UserStore {
    users: RwLock<HashMap<String, String>>,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.add_user(username, password);
        self
    }

    /// Add a user, replacing any existing password.
    pub fn add_user(&self, username: impl Into<String>, password: impl Into<String>) {
        self.users
            .write()
            .expect("users lock poisoned")
            .insert(username.into(), password.into());
    }

    pub fn verify(&self, credential: &Credential) -> bool {
        self.users
            .read()
            .expect("users lock poisoned")
            .get(&credential.username)
            .is_some_and(|password| *password == credential.password)
    }

    /// Replace the password of an existing user. Returns false for unknown users.
    pub fn set_password(&self, username: &str, password: &str) -> bool {
        let mut users = self.users.write().expect("users lock poisoned");
        match users.get_mut(username) {
            Some(current) => {
                *current = password.to_string();
                true
            }
            None => false,
        }
    }
}

/// Parse `Basic <base64(user:password)>`. Anything else yields `None`.
pub fn parse_basic(header: &str) -> Option<Credential> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (username, password) = text.split_once(':')?;
    Some(Credential {
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// Extractor that rejects with 403 unless the request carries valid credentials.
///
/// Missing, malformed and wrong credentials are indistinguishable to the caller.
#[derive(Debug)]
pub struct Authorized(pub Credential);

impl FromRequestParts<Arc<AppState>> for Authorized {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let credential = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_basic);

        match credential {
            Some(credential) if state.users.verify(&credential) => Ok(Authorized(credential)),
            _ => {
                warn!(method = %parts.method, path = %parts.uri.path(), "authorization rejected");
                Err(ApiError::Forbidden)
            }
        }
    }
}

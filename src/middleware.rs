//! Bearer-token validation for protected routes.
//!
//! Implemented as an `axum` extractor plus a `from_fn` wrapper rather than
//! a `tower::Layer`, since every route in this crate is `axum`-native and
//! an extractor lets handlers declare "I need an authenticated context" in
//! their signature instead of reaching into request extensions by hand.

use std::sync::Arc;

use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::crypto;
use crate::model::UpstreamCredentials;
use crate::state::AppState;

const MIN_TOKEN_LEN: usize = 10;
const MAX_TOKEN_LEN: usize = 10_000;

/// The authenticated context attached to a request once its bearer token
/// has been validated and its upstream credentials decrypted.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub grant_id: String,
    pub client_id: String,
    pub scope: Vec<String>,
    pub credentials: UpstreamCredentials,
}

impl AuthContext {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scope.iter().any(|s| s == scope)
    }
}

impl FromRequestParts<Arc<AppState>> for AuthContext {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or_else(|| unauthorized(state, None, "invalid_token", "Missing bearer token"))
    }
}

/// `axum::middleware::from_fn_with_state` entry point: validates the
/// bearer token and inserts an [`AuthContext`] into request extensions
/// for downstream extractors/handlers.
pub async fn require_bearer_token(
    State(state): State<Arc<AppState>>,
    mut request: axum::extract::Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let token = match header.and_then(extract_from_header) {
        Some(token) => token,
        None => {
            return unauthorized(
                &state,
                None,
                "invalid_request",
                "Authorization: Bearer <token> header is required",
            );
        }
    };

    if validate_format(&token).is_err() {
        return unauthorized(&state, None, "invalid_token", "Malformed bearer token");
    }

    let (user_id, grant_id, _secret) = match parse_compound_token(&token) {
        Some(parts) => parts,
        None => return unauthorized(&state, None, "invalid_token", "Malformed bearer token"),
    };

    let token_id = crypto::hash_secret(&token);
    let record = match state.storage.get_token(&user_id, &grant_id, &token_id).await {
        Ok(Some(record)) => record,
        Ok(None) => return unauthorized(&state, None, "invalid_token", "Unknown or expired token"),
        Err(_) => return unauthorized(&state, None, "invalid_token", "Unknown or expired token"),
    };

    if record.is_expired(now()) {
        return unauthorized(&state, None, "invalid_token", "Unknown or expired token");
    }

    let aead_key = match crypto::unwrap_key(&record.wrapped_encryption_key, &token) {
        Ok(key) => key,
        Err(_) => return unauthorized(&state, None, "invalid_token", "Unknown or expired token"),
    };
    let credentials = match crypto::decrypt_props(&record.encrypted_props, &aead_key) {
        Ok(creds) => creds,
        Err(_) => return unauthorized(&state, None, "invalid_token", "Unknown or expired token"),
    };

    request.extensions_mut().insert(AuthContext {
        user_id: record.user_id,
        grant_id: record.grant_id,
        client_id: record.client_id,
        scope: record.scope,
        credentials,
    });

    next.run(request).await
}

/// Wraps a handler that additionally requires every scope in `required` to
/// be present on the caller's [`AuthContext`].
pub fn require_scope(auth: &AuthContext, required: &[&str], state: &AppState) -> Result<(), Response> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|s| !auth.has_scope(s))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(forbidden(state, &missing.join(" ")))
}

fn extract_from_header(header: &str) -> Option<String> {
    let parts: Vec<&str> = header.split_whitespace().collect();
    if parts.len() != 2 || !parts[0].eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(parts[1].to_string())
}

fn validate_format(token: &str) -> Result<(), ()> {
    if token.is_empty() || token.len() < MIN_TOKEN_LEN || token.len() > MAX_TOKEN_LEN {
        return Err(());
    }
    Ok(())
}

/// Exactly three non-empty parts; a fourth colon-delimited segment is
/// rejected rather than folded into the secret.
fn parse_compound_token(value: &str) -> Option<(String, String, String)> {
    let mut parts = value.split(':');
    let user_id = parts.next()?.to_string();
    let grant_id = parts.next()?.to_string();
    let secret = parts.next()?.to_string();
    if parts.next().is_some() {
        return None;
    }
    if user_id.is_empty() || grant_id.is_empty() || secret.is_empty() {
        return None;
    }
    Some((user_id, grant_id, secret))
}

fn unauthorized(state: &AppState, scope: Option<&str>, error: &str, description: &str) -> Response {
    let header = www_authenticate(state, scope, Some((error, description)));
    let mut response = (
        StatusCode::UNAUTHORIZED,
        axum::Json(crate::well_known::unauthorized_body(description)),
    )
        .into_response();
    response
        .headers_mut()
        .insert(axum::http::header::WWW_AUTHENTICATE, header);
    response
}

fn forbidden(state: &AppState, required_scope: &str) -> Response {
    let header = www_authenticate(state, Some(required_scope), Some(("insufficient_scope", "")));
    let mut response = (
        StatusCode::FORBIDDEN,
        axum::Json(crate::well_known::unauthorized_body("Insufficient scope")),
    )
        .into_response();
    response
        .headers_mut()
        .insert(axum::http::header::WWW_AUTHENTICATE, header);
    response
}

fn www_authenticate(
    state: &AppState,
    scope: Option<&str>,
    error: Option<(&str, &str)>,
) -> HeaderValue {
    let mut parts = vec![format!(
        "Bearer resource_metadata=\"{}/.well-known/oauth-protected-resource\"",
        state.config.issuer
    )];
    if let Some(scope) = scope {
        parts.push(format!("scope=\"{scope}\""));
    }
    if let Some((error, description)) = error {
        parts.push(format!("error=\"{error}\""));
        if !description.is_empty() {
            parts.push(format!("error_description=\"{description}\""));
        }
    }
    HeaderValue::from_str(&parts.join(", ")).unwrap_or_else(|_| HeaderValue::from_static("Bearer"))
}

fn now() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bearer_token_case_insensitively() {
        assert_eq!(
            extract_from_header("bearer sometoken123").as_deref(),
            Some("sometoken123")
        );
        assert_eq!(
            extract_from_header("Bearer sometoken123").as_deref(),
            Some("sometoken123")
        );
    }

    #[test]
    fn rejects_malformed_header() {
        assert!(extract_from_header("sometoken123").is_none());
        assert!(extract_from_header("Bearer a b").is_none());
    }

    #[test]
    fn validates_token_length_bounds() {
        assert!(validate_format("short").is_err());
        assert!(validate_format(&"a".repeat(10_001)).is_err());
        assert!(validate_format("a-valid-enough-token").is_ok());
    }
}

//! Shared test harness: a mock upstream (Sentry) token endpoint plus
//! helpers for building an `AppState` and seeding clients against it.

use std::sync::Arc;

use secrecy::SecretString;
use sentry_mcp_auth::config::{Config, UpstreamConfig};
use sentry_mcp_auth::crypto;
use sentry_mcp_auth::model::{Client, TokenEndpointAuthMethod};
use sentry_mcp_auth::state::AppState;
use sentry_mcp_auth::storage::MemoryStorage;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Wraps a `wiremock` server standing in for Sentry's OAuth token endpoint.
pub struct MockUpstream {
    pub server: MockServer,
}

impl MockUpstream {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn token_url(&self) -> String {
        format!("{}/oauth/token/", self.server.uri())
    }

    pub fn authorize_url(&self) -> String {
        format!("{}/oauth/authorize/", self.server.uri())
    }

    /// Answers any `authorization_code` exchange with a fixed token pair.
    pub async fn mock_code_exchange(&self, access_token: &str, refresh_token: &str, expires_in: i64) {
        Mock::given(method("POST"))
            .and(path("/oauth/token/"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": access_token,
                "refresh_token": refresh_token,
                "expires_in": expires_in,
            })))
            .mount(&self.server)
            .await;
    }

    /// Answers any `refresh_token` grant with a fixed (rotated) token pair.
    pub async fn mock_refresh(&self, access_token: &str, refresh_token: &str, expires_in: i64) {
        Mock::given(method("POST"))
            .and(path("/oauth/token/"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": access_token,
                "refresh_token": refresh_token,
                "expires_in": expires_in,
            })))
            .mount(&self.server)
            .await;
    }

    /// Upstream rejects every request, as if the code/token were invalid.
    pub async fn mock_rejection(&self) {
        Mock::given(method("POST"))
            .and(path("/oauth/token/"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
            })))
            .mount(&self.server)
            .await;
    }
}

pub fn test_config(upstream: &MockUpstream) -> Config {
    Config {
        issuer: "https://mcp.example.com".to_string(),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        upstream: UpstreamConfig {
            client_id: "downstream-facing-upstream-client".to_string(),
            client_secret: SecretString::new("upstream-secret".into()),
            authorize_url: upstream.authorize_url(),
            token_url: upstream.token_url(),
        },
        cookie_signing_secret: SecretString::new("test-cookie-signing-secret".into()),
        supported_scopes: vec!["org:read".to_string(), "org:admin".to_string()],
        upstream_timeout_secs: 5,
        log_filter: "info".to_string(),
    }
}

pub fn build_state(upstream: &MockUpstream) -> Arc<AppState> {
    let storage = Arc::new(MemoryStorage::new());
    Arc::new(AppState::new(test_config(upstream), storage).expect("valid test config"))
}

/// Seeds a confidential client with one redirect_uri and returns
/// `(client_id, client_secret)`.
pub async fn seed_confidential_client(state: &AppState, redirect_uri: &str) -> (String, String) {
    let client_id = crypto::random_string(16);
    let client_secret = crypto::random_string(32);
    let client = Client {
        client_id: client_id.clone(),
        client_secret_hash: Some(crypto::hash_secret(&client_secret)),
        redirect_uris: vec![redirect_uri.to_string()],
        client_name: Some("Test Client".to_string()),
        client_uri: None,
        logo_uri: None,
        policy_uri: None,
        tos_uri: None,
        contacts: vec![],
        token_endpoint_auth_method: TokenEndpointAuthMethod::ClientSecretPost,
        grant_types: vec!["authorization_code".to_string(), "refresh_token".to_string()],
        response_types: vec!["code".to_string()],
        registration_date: 0,
    };
    state.storage.save_client(client).await.unwrap();
    (client_id, client_secret)
}

/// Seeds a public client (no secret, PKCE is its only defense) with one
/// redirect_uri and returns its `client_id`.
pub async fn seed_public_client(state: &AppState, redirect_uri: &str) -> String {
    let client_id = crypto::random_string(16);
    let client = Client {
        client_id: client_id.clone(),
        client_secret_hash: None,
        redirect_uris: vec![redirect_uri.to_string()],
        client_name: Some("Test Public Client".to_string()),
        client_uri: None,
        logo_uri: None,
        policy_uri: None,
        tos_uri: None,
        contacts: vec![],
        token_endpoint_auth_method: TokenEndpointAuthMethod::None,
        grant_types: vec!["authorization_code".to_string(), "refresh_token".to_string()],
        response_types: vec!["code".to_string()],
        registration_date: 0,
    };
    state.storage.save_client(client).await.unwrap();
    client_id
}

/// A fixed PKCE pair (`S256`) usable across tests: verifier plus the
/// challenge it hashes to.
pub fn pkce_pair() -> (&'static str, &'static str) {
    (
        "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk",
        "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM",
    )
}

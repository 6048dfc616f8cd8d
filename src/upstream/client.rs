//! Raw form-encoded calls to the upstream token endpoint.
//!
//! Deliberately does not wrap a general-purpose OAuth client library:
//! the server only ever needs two calls, both against one endpoint, and
//! must never let an upstream response body leak to the downstream
//! caller unparsed.

use serde::Deserialize;

use crate::config::Config;
use crate::error::{Error, Result};

/// The subset of a Sentry token-endpoint response this server consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamTokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    #[allow(dead_code)]
    pub scope: Option<String>,
}

const USER_AGENT: &str = concat!("sentry-mcp-auth/", env!("CARGO_PKG_VERSION"));

pub struct UpstreamClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: secrecy::SecretString,
    token_url: String,
}

impl UpstreamClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.upstream_timeout())
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::server_error(format!("failed to build upstream HTTP client: {e}")))?;

        Ok(Self {
            http,
            client_id: config.upstream.client_id.clone(),
            client_secret: config.upstream.client_secret.clone(),
            token_url: config.upstream.token_url().to_string(),
        })
    }

    /// `authorization_code` grant against the upstream token endpoint.
    pub async fn exchange_code_for_access_token(
        &self,
        code: &str,
        redirect_uri: Option<&str>,
    ) -> Result<UpstreamTokenResponse> {
        let mut params = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("client_id", self.client_id.clone()),
            (
                "client_secret",
                secrecy::ExposeSecret::expose_secret(&self.client_secret).to_string(),
            ),
        ];
        if let Some(redirect_uri) = redirect_uri {
            params.push(("redirect_uri", redirect_uri.to_string()));
        }
        self.post_form(&params).await
    }

    /// `refresh_token` grant against the upstream token endpoint.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<UpstreamTokenResponse> {
        let params = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
            ("client_id", self.client_id.clone()),
            (
                "client_secret",
                secrecy::ExposeSecret::expose_secret(&self.client_secret).to_string(),
            ),
        ];
        self.post_form(&params).await
    }

    async fn post_form(&self, params: &[(&str, String)]) -> Result<UpstreamTokenResponse> {
        let response = self
            .http
            .post(&self.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::server_error("upstream request timed out")
                } else {
                    Error::server_error(format!("upstream request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return if status.is_client_error() {
                Err(Error::upstream_rejected(
                    status,
                    "Upstream identity provider rejected the request",
                ))
            } else {
                Err(Error::server_error(format!(
                    "upstream returned server error: {status}"
                )))
            };
        }

        response
            .json::<UpstreamTokenResponse>()
            .await
            .map_err(|_| Error::server_error("failed to parse upstream token response"))
    }
}

impl std::fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("client_id", &self.client_id)
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}

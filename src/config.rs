//! Process-wide configuration.
//!
//! `Config` is built once at startup (from environment variables in
//! production, or directly in tests) and handed by reference to every
//! service. There are no setters: to change configuration, build a new
//! `Config`.

use std::net::SocketAddr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// This server's own canonical issuer URI, used to populate
    /// `.well-known` metadata and to validate `resource` indicators.
    pub issuer: String,
    /// Address the HTTP listener binds to.
    pub bind_addr: SocketAddr,
    /// Upstream (Sentry) OAuth configuration.
    pub upstream: UpstreamConfig,
    /// Key used to sign the redirect-state envelope and the approval
    /// cookie (§4.9). Rotate by deploying a new `Config`; there is no
    /// online rotation mechanism.
    #[serde(
        serialize_with = "serialize_secret",
        deserialize_with = "deserialize_secret"
    )]
    pub cookie_signing_secret: SecretString,
    /// Scopes this server will advertise and accept.
    pub supported_scopes: Vec<String>,
    /// Seconds to wait before aborting a call to the upstream provider.
    pub upstream_timeout_secs: u64,
    /// `tracing-subscriber` filter directive, e.g. `"info"` or
    /// `"sentry_mcp_auth=debug,tower_http=info"`.
    pub log_filter: String,
}

impl Config {
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}

/// Upstream identity provider (Sentry) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub client_id: String,
    #[serde(
        serialize_with = "serialize_secret",
        deserialize_with = "deserialize_secret"
    )]
    pub client_secret: SecretString,
    /// Full authorization endpoint URL. Defaults to Sentry's, but is
    /// independently configurable so tests can point it at a mock server.
    pub authorize_url: String,
    /// Full token endpoint URL. See `authorize_url`.
    pub token_url: String,
}

fn default_upstream_host() -> String {
    "sentry.io".to_string()
}

impl UpstreamConfig {
    pub fn authorize_url(&self) -> &str {
        &self.authorize_url
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }
}

impl Config {
    /// Build configuration from environment variables.
    ///
    /// Required: `UPSTREAM_CLIENT_ID`, `UPSTREAM_CLIENT_SECRET`,
    /// `COOKIE_SIGNING_SECRET`, `ISSUER`. Optional: `UPSTREAM_HOST`
    /// (default `sentry.io`), `UPSTREAM_AUTHORIZE_URL`/`UPSTREAM_TOKEN_URL`
    /// (override the URLs derived from `UPSTREAM_HOST`, e.g. to point at a
    /// mock server in a test deployment), `BIND_ADDR` (default
    /// `0.0.0.0:8080`), `SUPPORTED_SCOPES` (space-separated, default
    /// `"org:read"`), `UPSTREAM_TIMEOUT_SECS` (default 10), `LOG_FILTER`
    /// (default `"info"`).
    pub fn from_env() -> Result<Self> {
        let client_id = require_env("UPSTREAM_CLIENT_ID")?;
        let client_secret = SecretString::new(require_env("UPSTREAM_CLIENT_SECRET")?.into());
        let cookie_signing_secret =
            SecretString::new(require_env("COOKIE_SIGNING_SECRET")?.into());
        let issuer = require_env("ISSUER")?;

        let host = std::env::var("UPSTREAM_HOST").unwrap_or_else(|_| default_upstream_host());
        let authorize_url = std::env::var("UPSTREAM_AUTHORIZE_URL")
            .unwrap_or_else(|_| format!("https://{host}/oauth/authorize/"));
        let token_url = std::env::var("UPSTREAM_TOKEN_URL")
            .unwrap_or_else(|_| format!("https://{host}/oauth/token/"));
        let bind_addr = std::env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|e| Error::server_error(format!("invalid BIND_ADDR: {e}")))?;
        let supported_scopes = std::env::var("SUPPORTED_SCOPES")
            .unwrap_or_else(|_| "org:read".to_string())
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let upstream_timeout_secs = std::env::var("UPSTREAM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);
        let log_filter = std::env::var("LOG_FILTER").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            issuer,
            bind_addr,
            upstream: UpstreamConfig {
                client_id,
                client_secret,
                authorize_url,
                token_url,
            },
            cookie_signing_secret,
            supported_scopes,
            upstream_timeout_secs,
            log_filter,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| Error::server_error(format!("missing environment variable {key}")))
}

fn serialize_secret<S>(secret: &SecretString, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(secret.expose_secret())
}

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<SecretString, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = serde::Deserialize::deserialize(deserializer)?;
    Ok(SecretString::new(s))
}

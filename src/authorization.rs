//! Parses and validates authorization requests, and completes them into a
//! grant + single-use authorization code after the user approves.

use std::sync::Arc;

use url::Url;

use crate::crypto;
use crate::error::{Error, Result};
use crate::model::{AuthCodeBinding, Grant, UpstreamCredentials};
use crate::storage::Storage;

const GRANT_TTL_SECS: u64 = 600;

/// A parsed, not-yet-validated-against-a-client authorization request.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AuthRequest {
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: Option<String>,
    pub scope: Vec<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: String,
    pub resource: Vec<String>,
}

/// Everything `complete_authorization` needs beyond the original request:
/// the user that approved it and the upstream credentials to bind.
pub struct Approval {
    pub user_id: String,
    pub credentials: UpstreamCredentials,
}

pub struct AuthorizationService {
    storage: Arc<dyn Storage>,
}

impl AuthorizationService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Parses raw query parameters into an [`AuthRequest`] and validates
    /// everything that doesn't require a user decision yet (§4.4).
    pub async fn parse_auth_request(
        &self,
        response_type: &str,
        client_id: &str,
        redirect_uri: Option<&str>,
        scope: Option<&str>,
        state: Option<&str>,
        code_challenge: Option<&str>,
        code_challenge_method: Option<&str>,
        resource: &[String],
        request_url: &Url,
    ) -> Result<AuthRequest> {
        // Rule 1: redirect_uri, if present, must be an absolute http/https URL.
        if let Some(uri) = redirect_uri {
            let parsed = Url::parse(uri)
                .map_err(|_| Error::invalid_request("Invalid redirect URI"))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(Error::invalid_request("Invalid redirect URI"));
            }
        }

        // Rule 2: response_type must be "code".
        if response_type != "code" {
            return Err(Error::invalid_request(
                "Only response_type=code is supported",
            ));
        }

        // Rule 3: if the client is known, redirect_uri must match exactly.
        if let Some(client) = self.storage.get_client(client_id).await? {
            match redirect_uri {
                Some(uri) if client.redirect_uris.iter().any(|r| r == uri) => {}
                Some(_) => return Err(Error::invalid_request("redirect_uri does not match client")),
                None if client.redirect_uris.len() == 1 => {}
                None => return Err(Error::invalid_request("redirect_uri is required")),
            }
        } else {
            return Err(Error::invalid_request("Invalid request"));
        }

        // Rule 4: every resource indicator must validate against the request URL.
        for r in resource {
            validate_resource_indicator(r, request_url)?;
        }

        Ok(AuthRequest {
            response_type: response_type.to_string(),
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.map(str::to_string),
            scope: scope
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            state: state.map(str::to_string),
            code_challenge: code_challenge.map(str::to_string),
            code_challenge_method: code_challenge_method.unwrap_or("plain").to_string(),
            resource: resource.to_vec(),
        })
    }

    /// Called once the user has approved `request`. Creates the grant and
    /// a single-use authorization code bound to it, and returns the
    /// redirect URL to send the user-agent back to.
    pub async fn complete_authorization(
        &self,
        request: &AuthRequest,
        approval: Approval,
    ) -> Result<String> {
        // Defense in depth: re-validate redirect_uri against the client,
        // since the approval round trip could have been tampered with.
        let client = self
            .storage
            .get_client(&request.client_id)
            .await?
            .ok_or_else(|| Error::invalid_request("Invalid request"))?;
        if let Some(uri) = &request.redirect_uri
            && !client.redirect_uris.iter().any(|r| r == uri)
        {
            return Err(Error::invalid_request("redirect_uri does not match client"));
        }

        let grant_id = crypto::random_string(16);
        let code_secret = crypto::random_string(32);
        let code = format!("{}:{}:{}", approval.user_id, grant_id, code_secret);

        let aead_key: [u8; 32] = {
            let raw = crypto::random_string(32);
            let mut key = [0u8; 32];
            key.copy_from_slice(&sha2_digest(&raw));
            key
        };
        let encrypted_props = crypto::encrypt_props(&approval.credentials, &aead_key)?;
        let auth_code_wrapped_key = crypto::wrap_key(&aead_key, &code)?;

        let grant = Grant {
            id: grant_id,
            client_id: request.client_id.clone(),
            user_id: approval.user_id,
            scope: request.scope.clone(),
            metadata: None,
            encrypted_props,
            created_at: now(),
            expires_at: None,
            resource: request.resource.clone(),
            auth_code: Some(AuthCodeBinding {
                auth_code_id: crypto::hash_secret(&code),
                auth_code_wrapped_key,
                code_challenge: request.code_challenge.clone(),
                code_challenge_method: Some(request.code_challenge_method.clone()),
                redirect_uri: request.redirect_uri.clone(),
            }),
        };

        self.storage.save_grant(grant, Some(GRANT_TTL_SECS)).await?;

        let mut redirect = Url::parse(
            request
                .redirect_uri
                .as_deref()
                .ok_or_else(|| Error::server_error("grant has no redirect_uri"))?,
        )
        .map_err(|_| Error::server_error("stored redirect_uri is invalid"))?;
        redirect.query_pairs_mut().append_pair("code", &code);
        if let Some(state) = &request.state {
            redirect.query_pairs_mut().append_pair("state", state);
        }
        Ok(redirect.into())
    }
}

fn sha2_digest(s: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    Sha256::digest(s.as_bytes()).into()
}

fn now() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs() as i64
}

/// RFC 8707 resource-indicator validation, restricted to this server's
/// own `/mcp` endpoint rather than general canonicalization: same scheme,
/// host, and port as the incoming request; pathname literally `/mcp` or
/// starting with `/mcp/`; no fragment; no percent-encoded pathname.
fn validate_resource_indicator(resource: &str, request_url: &Url) -> Result<()> {
    let parsed = Url::parse(resource)
        .map_err(|_| Error::invalid_target("Invalid resource indicator"))?;

    if parsed.fragment().is_some() {
        return Err(Error::invalid_target("resource must not contain a fragment"));
    }
    if resource.contains('%') {
        return Err(Error::invalid_target(
            "resource pathname must not be percent-encoded",
        ));
    }
    if parsed.scheme() != request_url.scheme()
        || parsed.host_str() != request_url.host_str()
        || parsed.port_or_known_default() != request_url.port_or_known_default()
    {
        return Err(Error::invalid_target(
            "resource must share scheme, host, and port with the request URL",
        ));
    }
    let path = parsed.path();
    if path != "/mcp" && !path.starts_with("/mcp/") {
        return Err(Error::invalid_target(
            "resource pathname must be /mcp or start with /mcp/",
        ));
    }
    Ok(())
}

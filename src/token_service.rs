//! The `/oauth/token` endpoint: client authentication plus the
//! authorization-code and refresh-token grants.

use std::sync::Arc;

use serde::Serialize;

use crate::crypto;
use crate::error::{Error, Result};
use crate::model::{Client, EncryptedProps, Token, TokenEndpointAuthMethod, UpstreamCredentials};
use crate::refresh_coordinator::UpstreamRefreshCoordinator;
use crate::storage::Storage;
use crate::upstream::UpstreamClient;

const ACCESS_TOKEN_TTL_SECS: u64 = 3_600;
const REFRESH_TOKEN_TTL_SECS: u64 = 2_592_000;
/// Below this many seconds of remaining upstream access-token lifetime,
/// a downstream refresh triggers an upstream refresh instead of reusing
/// the current upstream access token.
const UPSTREAM_REFRESH_THRESHOLD_SECS: i64 = 120;

#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Decoded from an `Authorization: Basic` header, if present.
    pub basic_auth: Option<(String, String)>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub refresh_token: String,
    pub scope: String,
}

pub struct TokenService {
    storage: Arc<dyn Storage>,
    upstream: Arc<UpstreamClient>,
    refresh_coordinator: Arc<UpstreamRefreshCoordinator>,
}

impl TokenService {
    pub fn new(
        storage: Arc<dyn Storage>,
        upstream: Arc<UpstreamClient>,
        refresh_coordinator: Arc<UpstreamRefreshCoordinator>,
    ) -> Self {
        Self {
            storage,
            upstream,
            refresh_coordinator,
        }
    }

    pub async fn handle(&self, request: TokenRequest) -> Result<TokenResponse> {
        let client = self.authenticate_client(&request).await?;
        match request.grant_type.as_str() {
            "authorization_code" => self.authorization_code_grant(&client, &request).await,
            "refresh_token" => self.refresh_token_grant(&client, &request).await,
            _ => Err(Error::unsupported_grant_type()),
        }
    }

    async fn authenticate_client(&self, request: &TokenRequest) -> Result<Client> {
        let (client_id, client_secret) = match (&request.basic_auth, &request.client_id) {
            (Some((id, secret)), _) => (id.clone(), Some(secret.clone())),
            (None, Some(id)) => (id.clone(), request.client_secret.clone()),
            (None, None) => {
                return Err(Error::invalid_request("client_id is required"));
            }
        };

        let client = self
            .storage
            .get_client(&client_id)
            .await?
            .ok_or_else(|| Error::invalid_client("Unknown client"))?;

        if client.token_endpoint_auth_method == TokenEndpointAuthMethod::None {
            return Ok(client);
        }

        let secret = client_secret.ok_or_else(|| Error::invalid_client("Client secret required"))?;
        let stored_hash = client
            .client_secret_hash
            .as_deref()
            .ok_or_else(|| Error::invalid_client("Client has no secret on record"))?;
        if !crypto::verify_secret(&secret, stored_hash) {
            return Err(Error::invalid_client("Invalid client credentials"));
        }
        Ok(client)
    }

    async fn authorization_code_grant(
        &self,
        client: &Client,
        request: &TokenRequest,
    ) -> Result<TokenResponse> {
        let code = request
            .code
            .as_deref()
            .ok_or_else(|| Error::invalid_request("code is required"))?;

        let (user_id, grant_id, _secret) = parse_compound_token(code)
            .ok_or_else(|| Error::invalid_grant("Malformed authorization code"))?;

        let mut grant = self
            .storage
            .get_grant(&user_id, &grant_id)
            .await?
            .ok_or_else(|| Error::invalid_grant("Grant not found or expired"))?;

        let auth_code = grant
            .auth_code
            .clone()
            .ok_or_else(|| Error::invalid_grant("Authorization code already used"))?;

        if crypto::hash_secret(code) != auth_code.auth_code_id {
            return Err(Error::invalid_grant("Authorization code does not match"));
        }
        if grant.client_id != client.client_id {
            return Err(Error::invalid_grant("Authorization code issued to a different client"));
        }
        if let Some(expected) = &auth_code.redirect_uri {
            if request.redirect_uri.as_deref() != Some(expected.as_str()) {
                return Err(Error::invalid_grant("redirect_uri does not match"));
            }
        }
        if let Some(challenge) = &auth_code.code_challenge {
            let verifier = request
                .code_verifier
                .as_deref()
                .ok_or_else(|| Error::invalid_grant("code_verifier is required"))?;
            let method = auth_code.code_challenge_method.as_deref().unwrap_or("plain");
            if !crypto::verify_pkce(verifier, challenge, method) {
                return Err(Error::invalid_grant("PKCE verification failed"));
            }
        }

        // Atomic consumption: clear the code-bound fields and persist
        // before unwrapping the key, closing the TOCTOU window where two
        // concurrent exchanges could both observe the code as unused.
        grant.auth_code = None;
        let aead_key = crypto::unwrap_key(&auth_code.auth_code_wrapped_key, code)?;
        self.storage.save_grant(grant.clone(), None).await?;

        self.mint_tokens(&grant, aead_key, grant.encrypted_props.clone())
            .await
    }

    async fn refresh_token_grant(
        &self,
        client: &Client,
        request: &TokenRequest,
    ) -> Result<TokenResponse> {
        let refresh_token = request
            .refresh_token
            .as_deref()
            .ok_or_else(|| Error::invalid_request("refresh_token is required"))?;

        let (user_id, grant_id, _secret) = parse_compound_token(refresh_token)
            .ok_or_else(|| Error::invalid_grant("Malformed refresh token"))?;

        let token_id = crypto::hash_secret(refresh_token);
        let token = self
            .storage
            .get_token(&user_id, &grant_id, &token_id)
            .await?
            .ok_or_else(|| Error::invalid_grant("Refresh token not found or expired"))?;

        if token.is_expired(now()) {
            return Err(Error::invalid_grant("Refresh token has expired"));
        }
        if token.client_id != client.client_id {
            return Err(Error::invalid_grant("Refresh token issued to a different client"));
        }

        let aead_key = crypto::unwrap_key(&token.wrapped_encryption_key, refresh_token)?;
        let (credentials, from_fallback) = match crypto::decrypt_props(&token.encrypted_props, &aead_key) {
            Ok(creds) => (creds, false),
            Err(_) => {
                let grant = self
                    .storage
                    .get_grant(&user_id, &grant_id)
                    .await?
                    .ok_or_else(|| Error::server_error("grant missing for fallback decrypt"))?;
                let creds = crypto::decrypt_props(&grant.encrypted_props, &aead_key)
                    .map_err(|_| Error::server_error("failed to recover upstream credentials"))?;
                (creds, true)
            }
        };

        let (final_credentials, access_ttl, upstream_rotated) =
            self.reconcile_upstream(&user_id, credentials).await?;
        // The denormalized token copy may be unreadable (fallback) or the
        // upstream call may have rotated the credentials; either way the
        // blob we're about to bind new tokens to has changed and must be
        // freshly encrypted, and the grant's own copy kept in sync.
        let credentials_changed = from_fallback || upstream_rotated;

        let (encryption_key, encrypted_props) = if credentials_changed {
            let fresh_key = random_aead_key();
            let props = crypto::encrypt_props(&final_credentials, &fresh_key)?;
            let mut grant = self
                .storage
                .get_grant(&user_id, &grant_id)
                .await?
                .ok_or_else(|| Error::server_error("grant disappeared during refresh"))?;
            grant.encrypted_props = props.clone();
            self.storage.save_grant(grant, None).await?;
            (fresh_key, props)
        } else {
            (aead_key, token.encrypted_props.clone())
        };

        let grant = self
            .storage
            .get_grant(&user_id, &grant_id)
            .await?
            .ok_or_else(|| Error::invalid_grant("Grant not found or expired"))?;

        let mut response = self
            .mint_tokens_with_ttl(&grant, encryption_key, encrypted_props, access_ttl)
            .await?;

        // Record rotation lineage on the new refresh-token record.
        let new_token_id = crypto::hash_secret(&response.refresh_token);
        if let Some(mut new_token) = self
            .storage
            .get_token(&user_id, &grant_id, &new_token_id)
            .await?
        {
            new_token.previous_refresh_token_id = Some(token.id.clone());
            self.storage
                .save_token(new_token, REFRESH_TOKEN_TTL_SECS)
                .await?;
        }

        response.scope = grant.scope.join(" ");
        Ok(response)
    }

    /// Decides whether the upstream access token needs refreshing and, if
    /// so, does it through the coordinator. Returns the credentials to
    /// bind to the new downstream tokens, the downstream access-token
    /// TTL to use, and whether the credential blob changed.
    async fn reconcile_upstream(
        &self,
        user_id: &str,
        credentials: UpstreamCredentials,
    ) -> Result<(UpstreamCredentials, u64, bool)> {
        let remaining = credentials
            .access_token_expires_at
            .map(|expires_at| expires_at - now());

        if let Some(remaining) = remaining {
            if remaining > UPSTREAM_REFRESH_THRESHOLD_SECS {
                let ttl = remaining.max(0).min(ACCESS_TOKEN_TTL_SECS as i64) as u64;
                return Ok((credentials, ttl, false));
            }
        }

        let refreshed = self
            .refresh_coordinator
            .refresh(user_id, &credentials.refresh_token)
            .await?;

        let new_credentials = UpstreamCredentials {
            access_token: refreshed.access_token,
            refresh_token: refreshed.refresh_token,
            access_token_expires_at: refreshed.expires_at,
        };
        let ttl = refreshed
            .expires_at
            .map(|expires_at| (expires_at - now()).max(0) as u64)
            .unwrap_or(ACCESS_TOKEN_TTL_SECS);
        Ok((new_credentials, ttl, true))
    }

    async fn mint_tokens(
        &self,
        grant: &crate::model::Grant,
        aead_key: [u8; 32],
        encrypted_props: EncryptedProps,
    ) -> Result<TokenResponse> {
        self.mint_tokens_with_ttl(grant, aead_key, encrypted_props, ACCESS_TOKEN_TTL_SECS)
            .await
    }

    async fn mint_tokens_with_ttl(
        &self,
        grant: &crate::model::Grant,
        aead_key: [u8; 32],
        encrypted_props: EncryptedProps,
        access_ttl: u64,
    ) -> Result<TokenResponse> {
        let access_secret = format!(
            "{}:{}:{}",
            grant.user_id,
            grant.id,
            crypto::random_string(48)
        );
        let refresh_secret = format!(
            "{}:{}:{}",
            grant.user_id,
            grant.id,
            crypto::random_string(48)
        );

        let created = now();
        let access_token = Token {
            id: crypto::hash_secret(&access_secret),
            grant_id: grant.id.clone(),
            user_id: grant.user_id.clone(),
            client_id: grant.client_id.clone(),
            scope: grant.scope.clone(),
            audience: grant.resource.clone(),
            created_at: created,
            expires_at: created + access_ttl as i64,
            wrapped_encryption_key: crypto::wrap_key(&aead_key, &access_secret)?,
            encrypted_props: encrypted_props.clone(),
            previous_refresh_token_id: None,
        };
        let refresh_token = Token {
            id: crypto::hash_secret(&refresh_secret),
            grant_id: grant.id.clone(),
            user_id: grant.user_id.clone(),
            client_id: grant.client_id.clone(),
            scope: grant.scope.clone(),
            audience: grant.resource.clone(),
            created_at: created,
            expires_at: created + REFRESH_TOKEN_TTL_SECS as i64,
            wrapped_encryption_key: crypto::wrap_key(&aead_key, &refresh_secret)?,
            encrypted_props,
            previous_refresh_token_id: None,
        };

        self.storage
            .save_token(access_token, access_ttl)
            .await?;
        self.storage
            .save_token(refresh_token, REFRESH_TOKEN_TTL_SECS)
            .await?;

        Ok(TokenResponse {
            access_token: access_secret,
            token_type: "bearer",
            expires_in: access_ttl as i64,
            refresh_token: refresh_secret,
            scope: grant.scope.join(" "),
        })
    }
}

/// Parses the `userId:grantId:secret` compound token/code format. Exactly
/// three non-empty parts are required; a fourth colon-delimited segment is
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

fn random_aead_key() -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let raw = crypto::random_string(32);
    Sha256::digest(raw.as_bytes()).into()
}

fn now() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs() as i64
}

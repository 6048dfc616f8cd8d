//! Shared application state, plus the two HMAC-signed envelopes that carry
//! the authorization request and the user's approval across the upstream
//! redirect without server-side session storage.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::authorization::AuthorizationService;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::refresh_coordinator::UpstreamRefreshCoordinator;
use crate::storage::Storage;
use crate::token_service::TokenService;
use crate::upstream::UpstreamClient;

type HmacSha256 = Hmac<Sha256>;

const REDIRECT_STATE_TTL_SECS: i64 = 600;

pub struct AppState {
    pub config: Config,
    pub storage: Arc<dyn Storage>,
    pub upstream: Arc<UpstreamClient>,
    pub authorization: AuthorizationService,
    pub token_service: TokenService,
    pub refresh_coordinator: Arc<UpstreamRefreshCoordinator>,
}

impl AppState {
    pub fn new(config: Config, storage: Arc<dyn Storage>) -> Result<Self> {
        let upstream = Arc::new(UpstreamClient::new(&config)?);
        let refresh_coordinator = Arc::new(UpstreamRefreshCoordinator::new(
            storage.clone(),
            upstream.clone(),
        ));
        let authorization = AuthorizationService::new(storage.clone());
        let token_service = TokenService::new(
            storage.clone(),
            upstream.clone(),
            refresh_coordinator.clone(),
        );
        Ok(Self {
            config,
            storage,
            upstream,
            authorization,
            token_service,
            refresh_coordinator,
        })
    }

    fn signing_key(&self) -> &[u8] {
        self.config.cookie_signing_secret.expose_secret().as_bytes()
    }

    pub fn sign_redirect_state(&self, request: &crate::authorization::AuthRequest) -> Result<String> {
        sign_envelope(self.signing_key(), request, REDIRECT_STATE_TTL_SECS)
    }

    pub fn verify_redirect_state(&self, token: &str) -> Result<crate::authorization::AuthRequest> {
        verify_envelope(self.signing_key(), token)
    }

    pub fn sign_approval(&self, approval: &ApprovalEnvelope) -> Result<String> {
        sign_envelope(self.signing_key(), approval, REDIRECT_STATE_TTL_SECS)
    }

    pub fn verify_approval(&self, token: &str) -> Result<ApprovalEnvelope> {
        verify_envelope(self.signing_key(), token)
    }
}

/// The approval-dialog's signed cookie payload: which client a user
/// approved, and when.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalEnvelope {
    pub client_id: String,
    pub user_id: String,
    pub approved_at: i64,
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    payload: T,
    expires_at: i64,
}

/// Serializes `payload`, base64url-encodes it, and appends an HMAC-SHA256
/// signature over the encoded bytes: `base64url(payload) + "." + hex(mac)`.
fn sign_envelope<T: Serialize>(key: &[u8], payload: &T, ttl_secs: i64) -> Result<String> {
    let envelope = Envelope {
        payload,
        expires_at: now() + ttl_secs,
    };
    let json = serde_json::to_vec(&envelope)
        .map_err(|e| Error::server_error(format!("failed to serialize signed envelope: {e}")))?;
    let encoded = URL_SAFE_NO_PAD.encode(&json);

    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|_| Error::server_error("invalid HMAC key length"))?;
    mac.update(encoded.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    Ok(format!("{encoded}.{signature}"))
}

/// Splits, verifies the signature, checks the TTL, and deserializes the
/// payload. Any failure collapses to a single `invalid_request` so a
/// tampered token and an expired token are indistinguishable to a caller.
fn verify_envelope<T: for<'de> Deserialize<'de>>(key: &[u8], token: &str) -> Result<T> {
    let (encoded, signature) = token
        .split_once('.')
        .ok_or_else(|| Error::invalid_request("Invalid state"))?;

    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|_| Error::server_error("invalid HMAC key length"))?;
    mac.update(encoded.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    if expected.len() != signature.len()
        || !bool::from(expected.as_bytes().ct_eq(signature.as_bytes()))
    {
        return Err(Error::invalid_request("Invalid state"));
    }

    let json = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| Error::invalid_request("Invalid state"))?;
    let envelope: Envelope<T> = serde_json::from_slice(&json)
        .map_err(|_| Error::invalid_request("Invalid state"))?;

    if now() > envelope.expires_at {
        return Err(Error::invalid_request("Invalid state"));
    }
    Ok(envelope.payload)
}

fn now() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs() as i64
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        let bytes = bytes.as_ref();
        let mut out = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            out.push_str(&format!("{b:02x}"));
        }
        out
    }
}

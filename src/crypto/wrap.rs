//! Key wrapping: derive a key-encryption key from a token or authorization
//! code string via PBKDF2, then wrap/unwrap the per-grant AEAD key with it
//! using AES-KW (RFC 3394).
//!
//! The salt is fixed and public; all entropy comes from the token/code
//! string itself, which is never guessable (see [`crate::crypto::random`]).
//! This is intentional — see `DESIGN.md`'s Open Questions.

use aes_kw::KekAes256;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

use crate::error::{Error, Result};

const PBKDF2_ITERATIONS: u32 = 100_000;
/// Fixed salt. Security relies entirely on the entropy of the token/code
/// string being wrapped with, not on this salt.
const FIXED_SALT: &[u8] = b"sentry-mcp-auth-wrap-salt-v1";

fn derive_kek(secret: &str) -> [u8; 32] {
    let mut kek = [0u8; 32];
    pbkdf2_hmac::<Sha256>(secret.as_bytes(), FIXED_SALT, PBKDF2_ITERATIONS, &mut kek);
    kek
}

/// Wraps `key` (the grant's 256-bit AEAD key) under a KEK derived from
/// `secret` (a full token or authorization code string). Returns base64.
pub fn wrap_key(key: &[u8; 32], secret: &str) -> Result<String> {
    let kek_bytes = derive_kek(secret);
    let kek = KekAes256::from(kek_bytes);
    let wrapped = kek
        .wrap_vec(key)
        .map_err(|_| Error::server_error("failed to wrap encryption key"))?;
    Ok(base64::Engine::encode(
        &base64::engine::general_purpose::STANDARD,
        wrapped,
    ))
}

/// Unwraps a key previously wrapped by [`wrap_key`] under a KEK derived
/// from `secret`. Fails uniformly (no distinguishing information) on a
/// wrong secret, corrupted input, or tampering.
pub fn unwrap_key(wrapped_b64: &str, secret: &str) -> Result<[u8; 32]> {
    let wrapped = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, wrapped_b64)
        .map_err(|_| Error::server_error("malformed wrapped key encoding"))?;

    let kek_bytes = derive_kek(secret);
    let kek = KekAes256::from(kek_bytes);
    let unwrapped = kek
        .unwrap_vec(&wrapped)
        .map_err(|_| Error::server_error("failed to unwrap encryption key"))?;

    unwrapped
        .try_into()
        .map_err(|_| Error::server_error("unwrapped key has unexpected length"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_under_same_secret() {
        let key = [42u8; 32];
        let wrapped = wrap_key(&key, "token-or-code-string").unwrap();
        let unwrapped = unwrap_key(&wrapped, "token-or-code-string").unwrap();
        assert_eq!(key, unwrapped);
    }

    #[test]
    fn fails_under_different_secret() {
        let key = [42u8; 32];
        let wrapped = wrap_key(&key, "right-secret").unwrap();
        assert!(unwrap_key(&wrapped, "wrong-secret").is_err());
    }
}

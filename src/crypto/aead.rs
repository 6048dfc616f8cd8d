//! AES-256-GCM encryption of upstream credentials.
//!
//! Ciphertext and IV are carried as base64 strings inside the
//! [`EncryptedProps`] envelope so the whole thing round-trips through
//! JSON storage without any binary handling at the call sites.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::{Error, Result};
use crate::model::{EncryptedProps, UpstreamCredentials};

/// Encrypts `credentials` under `key` (a freshly generated 256-bit AEAD
/// key, not derived from any token) with a fresh random 96-bit IV.
pub fn encrypt_props(credentials: &UpstreamCredentials, key: &[u8; 32]) -> Result<EncryptedProps> {
    let plaintext = serde_json::to_vec(credentials)
        .map_err(|e| Error::server_error(format!("failed to serialize credentials: {e}")))?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_ref())
        .map_err(|_| Error::server_error("failed to encrypt upstream credentials"))?;

    Ok(EncryptedProps {
        ciphertext: BASE64.encode(ciphertext),
        iv: BASE64.encode(nonce),
    })
}

/// Decrypts `props` under `key`. Any corruption, tampering, or wrong key
/// surfaces as a single opaque failure — callers must not branch on why
/// decryption failed.
pub fn decrypt_props(props: &EncryptedProps, key: &[u8; 32]) -> Result<UpstreamCredentials> {
    let ciphertext = BASE64
        .decode(&props.ciphertext)
        .map_err(|_| Error::server_error("malformed ciphertext encoding"))?;
    let iv = BASE64
        .decode(&props.iv)
        .map_err(|_| Error::server_error("malformed iv encoding"))?;
    let nonce = Nonce::from_slice(&iv);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let plaintext = cipher
        .decrypt(nonce, ciphertext.as_ref())
        .map_err(|_| Error::server_error("upstream credentials are invalid or tampered"))?;

    serde_json::from_slice(&plaintext)
        .map_err(|_| Error::server_error("decrypted credentials payload is corrupt"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_credentials() -> UpstreamCredentials {
        UpstreamCredentials {
            access_token: "upstream-access".to_string(),
            refresh_token: "upstream-refresh".to_string(),
            access_token_expires_at: Some(1_700_000_000),
        }
    }

    #[test]
    fn round_trips_credentials() {
        let key = [7u8; 32];
        let props = encrypt_props(&sample_credentials(), &key).unwrap();
        let decrypted = decrypt_props(&props, &key).unwrap();
        assert_eq!(decrypted.access_token, "upstream-access");
        assert_eq!(decrypted.refresh_token, "upstream-refresh");
    }

    #[test]
    fn fresh_iv_yields_different_ciphertext() {
        let key = [7u8; 32];
        let creds = sample_credentials();
        let a = encrypt_props(&creds, &key).unwrap();
        let b = encrypt_props(&creds, &key).unwrap();
        assert_ne!(a.ciphertext, b.ciphertext);
        assert_ne!(a.iv, b.iv);
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let key = [7u8; 32];
        let wrong_key = [8u8; 32];
        let props = encrypt_props(&sample_credentials(), &key).unwrap();
        assert!(decrypt_props(&props, &wrong_key).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let key = [7u8; 32];
        let mut props = encrypt_props(&sample_credentials(), &key).unwrap();
        let mut raw = BASE64.decode(&props.ciphertext).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        props.ciphertext = BASE64.encode(raw);
        assert!(decrypt_props(&props, &key).is_err());
    }
}

//! Secret hashing and constant-time verification.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Lowercase hex SHA-256 of the UTF-8 bytes of `s`.
///
/// Used both as a non-reversible storage handle for tokens/codes and as
/// the at-rest representation of client secrets.
pub fn hash_secret(s: &str) -> String {
    let digest = Sha256::digest(s.as_bytes());
    hex_encode(&digest)
}

/// Constant-time comparison of `candidate` against the stored hash of the
/// real secret. Hashes both sides to equal-length hex strings first so
/// the comparison itself never short-circuits on a length mismatch.
pub fn verify_secret(candidate: &str, stored_hash: &str) -> bool {
    let candidate_hash = hash_secret(candidate);
    if candidate_hash.len() != stored_hash.len() {
        return false;
    }
    candidate_hash
        .as_bytes()
        .ct_eq(stored_hash.as_bytes())
        .into()
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

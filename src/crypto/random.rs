//! CSPRNG-backed random string generation.

use rand::RngCore;
use rand::rngs::OsRng;

const ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Draws `len` characters from a 62-character (plus `-_`) URL-safe
/// alphabet using a CSPRNG. The per-byte modulo bias is negligible at
/// this alphabet size for the secret lengths this crate uses (16-48
/// chars).
pub fn random_string(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
        .iter()
        .map(|b| ALPHABET[(*b as usize) % ALPHABET.len()] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_requested_length() {
        assert_eq!(random_string(32).len(), 32);
        assert_eq!(random_string(0).len(), 0);
    }

    #[test]
    fn draws_only_from_alphabet() {
        let s = random_string(256);
        assert!(s.bytes().all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn is_not_constant() {
        let a = random_string(32);
        let b = random_string(32);
        assert_ne!(a, b);
    }
}

//! RFC 7636 §4.6 PKCE verification.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

/// Verifies `verifier` against `challenge` under `method` (`"plain"` or
/// `"S256"`). Any other method string is treated as unsupported and
/// always fails.
pub fn verify_pkce(verifier: &str, challenge: &str, method: &str) -> bool {
    match method {
        "plain" => verifier == challenge,
        "S256" => {
            let digest = Sha256::digest(verifier.as_bytes());
            URL_SAFE_NO_PAD.encode(digest) == challenge
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_requires_exact_match() {
        assert!(verify_pkce("abc", "abc", "plain"));
        assert!(!verify_pkce("abc", "xyz", "plain"));
    }

    #[test]
    fn s256_matches_rfc_example() {
        // RFC 7636 appendix B example vector.
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let challenge = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
        assert!(verify_pkce(verifier, challenge, "S256"));
    }

    #[test]
    fn unknown_method_always_fails() {
        assert!(!verify_pkce("abc", "abc", "none"));
    }
}

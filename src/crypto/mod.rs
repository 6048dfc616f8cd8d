//! Cryptographic primitives: random generation, hashing, AEAD encryption,
//! key wrapping, and PKCE verification.
//!
//! Every primitive here is a pure function over byte/string inputs; none
//! of them touch storage or configuration, so they can be exercised
//! directly in unit tests without a `Storage` or `Config`.

pub mod aead;
pub mod hash;
pub mod pkce;
pub mod random;
pub mod wrap;

pub use aead::{decrypt_props, encrypt_props};
pub use hash::{hash_secret, verify_secret};
pub use pkce::verify_pkce;
pub use random::random_string;
pub use wrap::{unwrap_key, wrap_key};

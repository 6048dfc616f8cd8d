//! Persistent entities: `Client`, `Grant`, `Token`, and the upstream
//! credential shape they carry encrypted inside them.

use serde::{Deserialize, Serialize};

/// How a client authenticates itself at the token endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenEndpointAuthMethod {
    None,
    ClientSecretBasic,
    ClientSecretPost,
}

/// A registered downstream OAuth client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub client_id: String,
    /// `hash_secret(plaintext_secret)`; absent for public clients.
    pub client_secret_hash: Option<String>,
    pub redirect_uris: Vec<String>,
    pub client_name: Option<String>,
    pub client_uri: Option<String>,
    pub logo_uri: Option<String>,
    pub policy_uri: Option<String>,
    pub tos_uri: Option<String>,
    pub contacts: Vec<String>,
    pub token_endpoint_auth_method: TokenEndpointAuthMethod,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub registration_date: i64,
}

impl Client {
    pub fn is_public(&self) -> bool {
        matches!(
            self.token_endpoint_auth_method,
            TokenEndpointAuthMethod::None
        )
    }
}

/// The AEAD-encrypted envelope stored on a grant or denormalized onto a
/// token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedProps {
    pub ciphertext: String,
    pub iv: String,
}

/// The plaintext shape `EncryptedProps` decrypts to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamCredentials {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds since epoch; absent if the upstream omitted `expires_in`.
    pub access_token_expires_at: Option<i64>,
}

/// Transient authorization-code binding attached to a grant between its
/// creation and the first (only) successful code exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthCodeBinding {
    /// `hash_secret(full_authorization_code)`.
    pub auth_code_id: String,
    /// The grant's AEAD key, wrapped under a key derived from the full
    /// authorization code.
    pub auth_code_wrapped_key: String,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub redirect_uri: Option<String>,
}

/// A user's consent to a client for a given scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grant {
    pub id: String,
    pub client_id: String,
    pub user_id: String,
    pub scope: Vec<String>,
    pub metadata: Option<serde_json::Value>,
    pub encrypted_props: EncryptedProps,
    pub created_at: i64,
    pub expires_at: Option<i64>,
    /// RFC 8707 resource indicators recorded at authorization time.
    pub resource: Vec<String>,
    pub auth_code: Option<AuthCodeBinding>,
}

impl Grant {
    /// Whether this grant's authorization code has not yet been consumed.
    pub fn has_unconsumed_code(&self) -> bool {
        self.auth_code.is_some()
    }
}

/// A summary view of a grant, omitting `encrypted_props` and the
/// authorization-code binding, suitable for listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantSummary {
    pub id: String,
    pub client_id: String,
    pub user_id: String,
    pub scope: Vec<String>,
    pub created_at: i64,
    pub expires_at: Option<i64>,
}

impl From<&Grant> for GrantSummary {
    fn from(grant: &Grant) -> Self {
        Self {
            id: grant.id.clone(),
            client_id: grant.client_id.clone(),
            user_id: grant.user_id.clone(),
            scope: grant.scope.clone(),
            created_at: grant.created_at,
            expires_at: grant.expires_at,
        }
    }
}

/// One issued access or refresh token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// `hash_secret(full_token_string)`.
    pub id: String,
    pub grant_id: String,
    pub user_id: String,
    pub client_id: String,
    pub scope: Vec<String>,
    pub audience: Vec<String>,
    pub created_at: i64,
    pub expires_at: i64,
    /// The grant's AEAD key, wrapped under a key derived from this
    /// token's full string.
    pub wrapped_encryption_key: String,
    /// Denormalized copy of the grant's encrypted credentials, so a
    /// bearer-token lookup never needs a second read.
    pub encrypted_props: EncryptedProps,
    /// The prior refresh token's id, recorded at rotation time. Kept for
    /// potential future grace-period support; no lookup against it is
    /// performed today.
    pub previous_refresh_token_id: Option<String>,
}

impl Token {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_summary_omits_sensitive_fields() {
        let grant = Grant {
            id: "g1".to_string(),
            client_id: "c1".to_string(),
            user_id: "u1".to_string(),
            scope: vec!["org:read".to_string()],
            metadata: None,
            encrypted_props: EncryptedProps {
                ciphertext: "x".to_string(),
                iv: "y".to_string(),
            },
            created_at: 0,
            expires_at: None,
            resource: vec![],
            auth_code: None,
        };
        let summary = GrantSummary::from(&grant);
        assert_eq!(summary.id, "g1");
    }

    #[test]
    fn token_expiry_is_inclusive_of_boundary() {
        let token = Token {
            id: "t1".to_string(),
            grant_id: "g1".to_string(),
            user_id: "u1".to_string(),
            client_id: "c1".to_string(),
            scope: vec![],
            audience: vec![],
            created_at: 0,
            expires_at: 100,
            wrapped_encryption_key: "k".to_string(),
            encrypted_props: EncryptedProps {
                ciphertext: "x".to_string(),
                iv: "y".to_string(),
            },
            previous_refresh_token_id: None,
        };
        assert!(token.is_expired(100));
        assert!(!token.is_expired(99));
    }
}

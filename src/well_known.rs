//! RFC 8414 authorization-server metadata and RFC 9728 protected-resource
//! metadata documents served under `/.well-known/*`.

use serde::Serialize;
use serde_json::{Value, json};

use crate::config::Config;

#[derive(Debug, Serialize)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub registration_endpoint: String,
    pub scopes_supported: Vec<String>,
    pub response_types_supported: Vec<&'static str>,
    pub grant_types_supported: Vec<&'static str>,
    pub code_challenge_methods_supported: Vec<&'static str>,
    pub token_endpoint_auth_methods_supported: Vec<&'static str>,
}

pub fn authorization_server_metadata(config: &Config) -> AuthorizationServerMetadata {
    AuthorizationServerMetadata {
        authorization_endpoint: format!("{}/oauth/authorize", config.issuer),
        token_endpoint: format!("{}/oauth/token", config.issuer),
        registration_endpoint: format!("{}/oauth/register", config.issuer),
        issuer: config.issuer.clone(),
        scopes_supported: config.supported_scopes.clone(),
        response_types_supported: vec!["code"],
        grant_types_supported: vec!["authorization_code", "refresh_token"],
        code_challenge_methods_supported: vec!["S256"],
        token_endpoint_auth_methods_supported: vec!["client_secret_post"],
    }
}

/// Builder for the RFC 9728 protected-resource metadata document, mirroring
/// the teacher's `ProtectedResourceMetadataBuilder` shape: a resource and
/// an authorization server are required, scopes and bearer methods are
/// optional and chained on.
pub struct ProtectedResourceMetadataBuilder {
    resource: String,
    authorization_server: String,
    scopes: Vec<String>,
    bearer_methods: Vec<&'static str>,
}

impl ProtectedResourceMetadataBuilder {
    pub fn new(resource: impl Into<String>, authorization_server: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            authorization_server: authorization_server.into(),
            scopes: Vec::new(),
            bearer_methods: vec!["header"],
        }
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn build(self) -> Value {
        json!({
            "resource": self.resource,
            "authorization_server": self.authorization_server,
            "scopes_supported": self.scopes,
            "bearer_methods_supported": self.bearer_methods,
        })
    }
}

pub fn protected_resource_metadata(config: &Config) -> Value {
    ProtectedResourceMetadataBuilder::new(format!("{}/mcp", config.issuer), config.issuer.clone())
        .with_scopes(config.supported_scopes.clone())
        .build()
}

/// The JSON body of a 401/403 response to a protected-resource request.
pub fn unauthorized_body(description: &str) -> Value {
    json!({ "error": "invalid_token", "error_description": description })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_metadata_advertises_supported_grant_types() {
        let metadata = authorization_server_metadata(&crate::config::tests::test_config());
        assert_eq!(metadata.grant_types_supported, vec!["authorization_code", "refresh_token"]);
        assert_eq!(metadata.token_endpoint, "https://mcp.example.com/oauth/token");
    }

    #[test]
    fn protected_resource_metadata_includes_scopes() {
        let metadata = protected_resource_metadata(&crate::config::tests::test_config());
        assert_eq!(metadata["scopes_supported"], json!(["org:read"]));
        assert_eq!(metadata["bearer_methods_supported"], json!(["header"]));
    }
}

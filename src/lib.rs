//! An OAuth 2.0 authorization server that brokers access to an upstream
//! identity provider for downstream MCP clients, binding encrypted
//! upstream credentials to the downstream tokens it issues.
//!
//! ## Architecture
//!
//! - `config` - process-wide configuration, built once at startup.
//! - `error` - the RFC 6749 §5.2 error taxonomy shared by every service.
//! - `model` - the persistent `Client`/`Grant`/`Token` entities.
//! - `crypto` - random generation, hashing, AEAD, key wrapping, PKCE.
//! - `storage` - the `Storage` trait and its in-memory implementation.
//! - `upstream` - the HTTP client for the upstream identity provider.
//! - `authorization` - the `/oauth/authorize` request/approval flow.
//! - `token_service` - the `/oauth/token` grant handlers.
//! - `refresh_coordinator` - cross-replica upstream refresh coordination.
//! - `registration` - dynamic client registration (RFC 7591).
//! - `middleware` - bearer-token validation for protected routes.
//! - `state` - shared application state and signed redirect envelopes.
//! - `well_known` - RFC 8414 / RFC 9728 discovery documents.
//! - `http` - the `axum` router tying it all together.

pub mod authorization;
pub mod config;
pub mod crypto;
pub mod error;
pub mod http;
pub mod middleware;
pub mod model;
pub mod refresh_coordinator;
pub mod registration;
pub mod state;
pub mod storage;
pub mod token_service;
pub mod upstream;
pub mod well_known;

pub use error::{Error, Result};
pub use state::AppState;

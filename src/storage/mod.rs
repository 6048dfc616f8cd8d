//! The persistence abstraction used by every service.
//!
//! Production code depends only on [`Storage`]; the richer
//! [`MemoryStorage`] concrete type additionally exposes test-only
//! helpers that are never reachable through the trait object.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Client, Grant, GrantSummary, Token};

pub use memory::MemoryStorage;

/// An opaque forward-only pagination cursor.
pub type Cursor = String;

/// A page of results plus the cursor to fetch the next one, if any.
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<Cursor>,
}

/// Clients, grants, and tokens, each with TTL-based soft expiry.
///
/// Implementations MUST treat an expired record as absent on read, and
/// MAY lazily evict it. `save` is idempotent and replaces any existing
/// record at the same key.
#[async_trait]
pub trait Storage: Send + Sync + std::fmt::Debug {
    async fn get_client(&self, client_id: &str) -> Result<Option<Client>>;
    async fn save_client(&self, client: Client) -> Result<()>;
    async fn delete_client(&self, client_id: &str) -> Result<()>;
    async fn list_clients(&self, limit: usize, cursor: Option<Cursor>) -> Result<Page<Client>>;

    async fn get_grant(&self, user_id: &str, grant_id: &str) -> Result<Option<Grant>>;
    /// `ttl_secs` is relative to now; `None` means "no expiry".
    async fn save_grant(&self, grant: Grant, ttl_secs: Option<u64>) -> Result<()>;
    async fn delete_grant(&self, user_id: &str, grant_id: &str) -> Result<()>;
    async fn list_user_grants(
        &self,
        user_id: &str,
        limit: usize,
        cursor: Option<Cursor>,
    ) -> Result<Page<GrantSummary>>;

    async fn get_token(&self, user_id: &str, grant_id: &str, token_id: &str)
    -> Result<Option<Token>>;
    async fn save_token(&self, token: Token, ttl_secs: u64) -> Result<()>;
    async fn delete_token(&self, user_id: &str, grant_id: &str, token_id: &str) -> Result<()>;
    async fn delete_tokens_for_grant(&self, user_id: &str, grant_id: &str) -> Result<()>;

    /// Best-effort reservation used by the upstream refresh coordinator.
    /// Returns `true` if the lock was newly acquired, `false` if another
    /// holder already has it.
    async fn try_acquire_refresh_lock(&self, user_id: &str, ttl_secs: u64) -> Result<bool>;
    async fn release_refresh_lock(&self, user_id: &str) -> Result<()>;
    async fn get_refresh_result(&self, user_id: &str) -> Result<Option<String>>;
    async fn save_refresh_result(&self, user_id: &str, value: String, ttl_secs: u64) -> Result<()>;
}

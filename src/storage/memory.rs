//! In-memory [`Storage`] implementation, backing both local development
//! and the test suite.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Result;
use crate::model::{Client, Grant, GrantSummary, Token};

use super::{Cursor, Page, Storage};

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs() as i64
}

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    expires_at: Option<i64>,
}

impl<T> Entry<T> {
    fn live(&self) -> bool {
        self.expires_at.is_none_or(|exp| exp > now())
    }
}

/// `dashmap`-backed [`Storage`] with soft TTL expiry checked at read time.
///
/// Keys mirror the storage keyspace table: `client:{id}`,
/// `grant:{user}:{grant}`, `token:{user}:{grant}:{token}`,
/// `refresh-lock:{user}`, `refresh-result:{user}`.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    clients: DashMap<String, Entry<Client>>,
    grants: DashMap<String, Entry<Grant>>,
    tokens: DashMap<String, Entry<Token>>,
    refresh_locks: DashMap<String, i64>,
    refresh_results: DashMap<String, Entry<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn grant_key(user_id: &str, grant_id: &str) -> String {
        format!("{user_id}:{grant_id}")
    }

    fn token_key(user_id: &str, grant_id: &str, token_id: &str) -> String {
        format!("{user_id}:{grant_id}:{token_id}")
    }

    // -- test-only helpers, not part of the `Storage` trait --

    /// Drops every stored entity. Test-only.
    pub fn clear(&self) {
        self.clients.clear();
        self.grants.clear();
        self.tokens.clear();
        self.refresh_locks.clear();
        self.refresh_results.clear();
    }

    /// Inserts a client directly, bypassing TTL bookkeeping. Test-only.
    pub fn seed_client(&self, client: Client) {
        self.clients.insert(
            client.client_id.clone(),
            Entry {
                value: client,
                expires_at: None,
            },
        );
    }

    /// Inserts a grant directly, bypassing TTL bookkeeping. Test-only.
    pub fn seed_grant(&self, grant: Grant) {
        let key = Self::grant_key(&grant.user_id, &grant.id);
        self.grants.insert(
            key,
            Entry {
                value: grant,
                expires_at: None,
            },
        );
    }

    /// Inserts a token directly, bypassing TTL bookkeeping. Test-only.
    pub fn seed_token(&self, token: Token) {
        let key = Self::token_key(&token.user_id, &token.grant_id, &token.id);
        self.tokens.insert(
            key,
            Entry {
                value: token,
                expires_at: None,
            },
        );
    }

    /// A point-in-time copy of all live entities. Test-only.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            clients: self
                .clients
                .iter()
                .filter(|e| e.live())
                .map(|e| e.value.value.clone())
                .collect(),
            grants: self
                .grants
                .iter()
                .filter(|e| e.live())
                .map(|e| e.value.value.clone())
                .collect(),
            tokens: self
                .tokens
                .iter()
                .filter(|e| e.live())
                .map(|e| e.value.value.clone())
                .collect(),
        }
    }

    /// Counts of live entities, for leak/cleanup assertions. Test-only.
    pub fn counts(&self) -> Counts {
        Counts {
            clients: self.clients.iter().filter(|e| e.live()).count(),
            grants: self.grants.iter().filter(|e| e.live()).count(),
            tokens: self.tokens.iter().filter(|e| e.live()).count(),
        }
    }
}

/// Snapshot of live entities returned by [`MemoryStorage::snapshot`].
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub clients: Vec<Client>,
    pub grants: Vec<Grant>,
    pub tokens: Vec<Token>,
}

/// Counts returned by [`MemoryStorage::counts`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub clients: usize,
    pub grants: usize,
    pub tokens: usize,
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_client(&self, client_id: &str) -> Result<Option<Client>> {
        Ok(self
            .clients
            .get(client_id)
            .filter(|e| e.live())
            .map(|e| e.value.clone()))
    }

    async fn save_client(&self, client: Client) -> Result<()> {
        self.clients.insert(
            client.client_id.clone(),
            Entry {
                value: client,
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn delete_client(&self, client_id: &str) -> Result<()> {
        self.clients.remove(client_id);
        Ok(())
    }

    async fn list_clients(&self, limit: usize, cursor: Option<Cursor>) -> Result<Page<Client>> {
        let mut all: Vec<Client> = self
            .clients
            .iter()
            .filter(|e| e.live())
            .map(|e| e.value.clone())
            .collect();
        all.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        paginate(all, limit, cursor)
    }

    async fn get_grant(&self, user_id: &str, grant_id: &str) -> Result<Option<Grant>> {
        let key = Self::grant_key(user_id, grant_id);
        Ok(self
            .grants
            .get(&key)
            .filter(|e| e.live())
            .map(|e| e.value.clone()))
    }

    async fn save_grant(&self, grant: Grant, ttl_secs: Option<u64>) -> Result<()> {
        let key = Self::grant_key(&grant.user_id, &grant.id);
        let expires_at = ttl_secs.map(|ttl| now() + ttl as i64);
        self.grants.insert(
            key,
            Entry {
                value: grant,
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete_grant(&self, user_id: &str, grant_id: &str) -> Result<()> {
        self.grants.remove(&Self::grant_key(user_id, grant_id));
        Ok(())
    }

    async fn list_user_grants(
        &self,
        user_id: &str,
        limit: usize,
        cursor: Option<Cursor>,
    ) -> Result<Page<GrantSummary>> {
        let mut all: Vec<GrantSummary> = self
            .grants
            .iter()
            .filter(|e| e.live() && e.value.value.user_id == user_id)
            .map(|e| GrantSummary::from(&e.value.value))
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        paginate(all, limit, cursor)
    }

    async fn get_token(
        &self,
        user_id: &str,
        grant_id: &str,
        token_id: &str,
    ) -> Result<Option<Token>> {
        let key = Self::token_key(user_id, grant_id, token_id);
        Ok(self
            .tokens
            .get(&key)
            .filter(|e| e.live())
            .map(|e| e.value.clone()))
    }

    async fn save_token(&self, token: Token, ttl_secs: u64) -> Result<()> {
        let key = Self::token_key(&token.user_id, &token.grant_id, &token.id);
        self.tokens.insert(
            key,
            Entry {
                value: token,
                expires_at: Some(now() + ttl_secs as i64),
            },
        );
        Ok(())
    }

    async fn delete_token(&self, user_id: &str, grant_id: &str, token_id: &str) -> Result<()> {
        self.tokens
            .remove(&Self::token_key(user_id, grant_id, token_id));
        Ok(())
    }

    async fn delete_tokens_for_grant(&self, user_id: &str, grant_id: &str) -> Result<()> {
        let prefix = format!("{user_id}:{grant_id}:");
        let keys: Vec<String> = self
            .tokens
            .iter()
            .map(|e| e.key().clone())
            .filter(|k| k.starts_with(&prefix))
            .collect();
        for key in keys {
            self.tokens.remove(&key);
        }
        Ok(())
    }

    async fn try_acquire_refresh_lock(&self, user_id: &str, ttl_secs: u64) -> Result<bool> {
        let key = format!("refresh-lock:{user_id}");
        let current = now();
        let mut acquired = false;
        self.refresh_locks
            .entry(key)
            .and_modify(|expires_at| {
                if *expires_at <= current {
                    *expires_at = current + ttl_secs as i64;
                    acquired = true;
                }
            })
            .or_insert_with(|| {
                acquired = true;
                current + ttl_secs as i64
            });
        Ok(acquired)
    }

    async fn release_refresh_lock(&self, user_id: &str) -> Result<()> {
        self.refresh_locks.remove(&format!("refresh-lock:{user_id}"));
        Ok(())
    }

    async fn get_refresh_result(&self, user_id: &str) -> Result<Option<String>> {
        let key = format!("refresh-result:{user_id}");
        Ok(self
            .refresh_results
            .get(&key)
            .filter(|e| e.live())
            .map(|e| e.value.clone()))
    }

    async fn save_refresh_result(&self, user_id: &str, value: String, ttl_secs: u64) -> Result<()> {
        let key = format!("refresh-result:{user_id}");
        self.refresh_results.insert(
            key,
            Entry {
                value,
                expires_at: Some(now() + ttl_secs as i64),
            },
        );
        Ok(())
    }
}

fn paginate<T>(all: Vec<T>, limit: usize, cursor: Option<Cursor>) -> Result<Page<T>> {
    let start = cursor
        .as_deref()
        .and_then(|c| c.parse::<usize>().ok())
        .unwrap_or(0);
    let end = (start + limit).min(all.len());
    let items: Vec<T> = all.into_iter().skip(start).take(end.saturating_sub(start)).collect();
    let next_cursor = if end < start + limit {
        None
    } else {
        Some(end.to_string())
    };
    Ok(Page { items, next_cursor })
}

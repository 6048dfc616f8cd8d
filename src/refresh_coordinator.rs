//! Serializes concurrent upstream refresh-token rotations for the same
//! user across replicas.
//!
//! The upstream identity provider rotates refresh tokens on every use:
//! if two replicas race to refresh the same user's upstream credentials,
//! only the first upstream call succeeds. This is a reservation plus
//! cached-result scheme, not a strict mutex — see §4.6 in `DESIGN.md`
//! for why that's acceptable.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::Storage;
use crate::upstream::UpstreamClient;

const LOCK_TTL_SECS: u64 = 60;
const RESULT_TTL_SECS: u64 = 60;
const LOCK_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResult {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<i64>,
}

pub struct UpstreamRefreshCoordinator {
    storage: Arc<dyn Storage>,
    upstream: Arc<UpstreamClient>,
}

impl UpstreamRefreshCoordinator {
    pub fn new(storage: Arc<dyn Storage>, upstream: Arc<UpstreamClient>) -> Self {
        Self { storage, upstream }
    }

    /// Refreshes `refresh_token` on behalf of `user_id`, coordinating with
    /// any concurrent refresh for the same user.
    pub async fn refresh(&self, user_id: &str, refresh_token: &str) -> Result<RefreshResult> {
        if let Some(cached) = self.read_cached_result(user_id).await? {
            return Ok(cached);
        }

        if self.lock_held(user_id).await? {
            tokio::time::sleep(LOCK_WAIT).await;
            if let Some(cached) = self.read_cached_result(user_id).await? {
                return Ok(cached);
            }
            // Prior holder never published a result; assume it failed
            // and fall through to attempt the refresh ourselves.
        }

        self.storage
            .try_acquire_refresh_lock(user_id, LOCK_TTL_SECS)
            .await?;

        let response = self.upstream.refresh_access_token(refresh_token).await?;

        let Some(rotated_refresh_token) = response.refresh_token else {
            tracing::warn!(
                user_id,
                "upstream refresh response omitted refresh_token; treating as a failed refresh"
            );
            let _ = self.storage.release_refresh_lock(user_id).await;
            return Err(Error::invalid_grant(
                "upstream did not return a rotated refresh token",
            ));
        };

        let result = RefreshResult {
            access_token: response.access_token,
            refresh_token: rotated_refresh_token,
            expires_at: response.expires_in.map(|secs| now() + secs),
        };

        // Best-effort: a failed write here must not discard the upstream
        // rotation we already consumed, so the result is still returned.
        let serialized = serde_json::to_string(&result)
            .map_err(|e| Error::server_error(format!("failed to serialize refresh result: {e}")))?;
        let _ = self
            .storage
            .save_refresh_result(user_id, serialized, RESULT_TTL_SECS)
            .await;
        let _ = self.storage.release_refresh_lock(user_id).await;

        Ok(result)
    }

    async fn lock_held(&self, user_id: &str) -> Result<bool> {
        // `try_acquire_refresh_lock` is also our "is it held" probe: a
        // caller that doesn't intend to hold the lock releases it again
        // immediately on success.
        let acquired = self
            .storage
            .try_acquire_refresh_lock(user_id, LOCK_TTL_SECS)
            .await?;
        if acquired {
            self.storage.release_refresh_lock(user_id).await?;
            Ok(false)
        } else {
            Ok(true)
        }
    }

    async fn read_cached_result(&self, user_id: &str) -> Result<Option<RefreshResult>> {
        match self.storage.get_refresh_result(user_id).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| Error::server_error(format!("corrupt cached refresh result: {e}"))),
            None => Ok(None),
        }
    }
}

fn now() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn second_caller_reuses_cached_result() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        storage
            .save_refresh_result(
                "user-1",
                serde_json::to_string(&RefreshResult {
                    access_token: "cached-access".to_string(),
                    refresh_token: "cached-refresh".to_string(),
                    expires_at: Some(now() + 3600),
                })
                .unwrap(),
                60,
            )
            .await
            .unwrap();

        // No upstream client call should be necessary for a cache hit.
        let config = crate::config::tests::test_config();
        let upstream = Arc::new(UpstreamClient::new(&config).unwrap());
        let coordinator = UpstreamRefreshCoordinator::new(storage, upstream);

        let result = coordinator.refresh("user-1", "whatever").await.unwrap();
        assert_eq!(result.access_token, "cached-access");
    }
}

//! Short-lived cache for computed balances and trial balances.
//!
//! Entries are scoped by tenant; any journal mutation clears the tenant's
//! entries, so a stale read lives at most until the next write or the TTL.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use garments_core::TenantId;
use tokio::time::Instant;

use crate::store::StoreError;

/// Default lifetime of a cached trial balance.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

#[async_trait]
pub trait BalanceCache: Send + Sync {
    async fn get(&self, tenant_id: TenantId, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    async fn set(
        &self,
        tenant_id: TenantId,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    async fn remove(&self, tenant_id: TenantId, key: &str) -> Result<(), StoreError>;

    /// Drop every entry of a tenant.
    async fn clear(&self, tenant_id: TenantId) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryBalanceCache {
    inner: RwLock<HashMap<(TenantId, String), (serde_json::Value, Instant)>>,
}

impl InMemoryBalanceCache {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("balance cache lock poisoned".to_string())
}

#[async_trait]
impl BalanceCache for InMemoryBalanceCache {
    async fn get(&self, tenant_id: TenantId, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map
            .get(&(tenant_id, key.to_string()))
            .filter(|(_, expires_at)| Instant::now() < *expires_at)
            .map(|(value, _)| value.clone()))
    }

    async fn set(
        &self,
        tenant_id: TenantId,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        let now = Instant::now();
        map.retain(|_, (_, expires_at)| now < *expires_at);
        map.insert((tenant_id, key.to_string()), (value, now + ttl));
        Ok(())
    }

    async fn remove(&self, tenant_id: TenantId, key: &str) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        map.remove(&(tenant_id, key.to_string()));
        Ok(())
    }

    async fn clear(&self, tenant_id: TenantId) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        map.retain(|(t, _), _| *t != tenant_id);
        Ok(())
    }
}

#[cfg(feature = "redis")]
pub use self::redis_cache::RedisBalanceCache;

#[cfg(feature = "redis")]
mod redis_cache {
    use super::*;
    use redis::AsyncCommands;
    use redis::aio::MultiplexedConnection;

    /// Redis-backed cache; values are JSON strings under `balance:{tenant}:{key}`.
    pub struct RedisBalanceCache {
        conn: MultiplexedConnection,
    }

    fn redis_err(operation: &str, err: redis::RedisError) -> StoreError {
        StoreError::Backend(format!("redis error in {operation}: {err}"))
    }

    fn cache_key(tenant_id: TenantId, key: &str) -> String {
        format!("balance:{tenant_id}:{key}")
    }

    impl RedisBalanceCache {
        pub async fn connect(url: &str) -> Result<Self, StoreError> {
            let client = redis::Client::open(url).map_err(|e| redis_err("connect", e))?;
            let conn = client
                .get_multiplexed_tokio_connection()
                .await
                .map_err(|e| redis_err("connect", e))?;
            Ok(Self { conn })
        }
    }

    #[async_trait]
    impl BalanceCache for RedisBalanceCache {
        async fn get(&self, tenant_id: TenantId, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
            let mut conn = self.conn.clone();
            let raw: Option<String> = conn
                .get(cache_key(tenant_id, key))
                .await
                .map_err(|e| redis_err("get", e))?;
            raw.map(|s| serde_json::from_str(&s).map_err(|e| StoreError::Serialization(e.to_string())))
                .transpose()
        }

        async fn set(
            &self,
            tenant_id: TenantId,
            key: &str,
            value: serde_json::Value,
            ttl: Duration,
        ) -> Result<(), StoreError> {
            let mut conn = self.conn.clone();
            let body = serde_json::to_string(&value).map_err(|e| StoreError::Serialization(e.to_string()))?;
            conn.set_ex::<_, _, ()>(cache_key(tenant_id, key), body, ttl.as_secs().max(1))
                .await
                .map_err(|e| redis_err("set", e))
        }

        async fn remove(&self, tenant_id: TenantId, key: &str) -> Result<(), StoreError> {
            let mut conn = self.conn.clone();
            conn.del::<_, ()>(cache_key(tenant_id, key))
                .await
                .map_err(|e| redis_err("remove", e))
        }

        async fn clear(&self, tenant_id: TenantId) -> Result<(), StoreError> {
            let mut conn = self.conn.clone();
            let keys: Vec<String> = {
                let mut iter = conn
                    .scan_match::<_, String>(format!("balance:{tenant_id}:*"))
                    .await
                    .map_err(|e| redis_err("clear", e))?;
                let mut keys = Vec::new();
                while let Some(key) = iter.next_item().await {
                    keys.push(key);
                }
                keys
            };
            if keys.is_empty() {
                return Ok(());
            }
            let mut conn = self.conn.clone();
            conn.del::<_, ()>(keys).await.map_err(|e| redis_err("clear", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn entries_expire_and_clear_per_tenant() {
        let cache = InMemoryBalanceCache::new();
        let (a, b) = (TenantId::new(), TenantId::new());

        cache.set(a, "tb:2024", json!({"final_balance": 0}), DEFAULT_TTL).await.unwrap();
        cache.set(b, "tb:2024", json!({"final_balance": 5}), DEFAULT_TTL).await.unwrap();
        cache.set(a, "stale", json!(1), Duration::ZERO).await.unwrap();

        assert_eq!(cache.get(a, "tb:2024").await.unwrap(), Some(json!({"final_balance": 0})));
        assert_eq!(cache.get(a, "stale").await.unwrap(), None);

        cache.clear(a).await.unwrap();
        assert_eq!(cache.get(a, "tb:2024").await.unwrap(), None);
        assert!(cache.get(b, "tb:2024").await.unwrap().is_some());

        cache.remove(b, "tb:2024").await.unwrap();
        assert_eq!(cache.get(b, "tb:2024").await.unwrap(), None);
    }
}

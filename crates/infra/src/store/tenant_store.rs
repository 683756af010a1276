use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use garments_core::TenantId;
use thiserror::Error;

/// Storage failure, as opposed to a domain rule being broken.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("failed to (de)serialize record: {0}")]
    Serialization(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflicting write: {0}")]
    Conflict(String),
}

/// Tenant-isolated key/value store.
///
/// Reads for one tenant never observe another tenant's records.
#[async_trait]
pub trait TenantStore<K, V>: Send + Sync {
    async fn get(&self, tenant_id: TenantId, key: &K) -> Result<Option<V>, StoreError>;

    async fn upsert(&self, tenant_id: TenantId, key: K, value: V) -> Result<(), StoreError>;

    /// Returns whether a record was removed.
    async fn remove(&self, tenant_id: TenantId, key: &K) -> Result<bool, StoreError>;

    async fn list(&self, tenant_id: TenantId) -> Result<Vec<V>, StoreError>;

    async fn clear_tenant(&self, tenant_id: TenantId) -> Result<(), StoreError>;
}

#[async_trait]
impl<K, V, S> TenantStore<K, V> for Arc<S>
where
    K: Send + Sync + 'static,
    V: Send + 'static,
    S: TenantStore<K, V> + ?Sized,
{
    async fn get(&self, tenant_id: TenantId, key: &K) -> Result<Option<V>, StoreError> {
        (**self).get(tenant_id, key).await
    }

    async fn upsert(&self, tenant_id: TenantId, key: K, value: V) -> Result<(), StoreError> {
        (**self).upsert(tenant_id, key, value).await
    }

    async fn remove(&self, tenant_id: TenantId, key: &K) -> Result<bool, StoreError> {
        (**self).remove(tenant_id, key).await
    }

    async fn list(&self, tenant_id: TenantId) -> Result<Vec<V>, StoreError> {
        (**self).list(tenant_id).await
    }

    async fn clear_tenant(&self, tenant_id: TenantId) -> Result<(), StoreError> {
        (**self).clear_tenant(tenant_id).await
    }
}

/// In-memory tenant-isolated store for tests/dev.
#[derive(Debug)]
pub struct InMemoryTenantStore<K, V> {
    inner: RwLock<HashMap<(TenantId, K), V>>,
}

impl<K, V> InMemoryTenantStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryTenantStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("in-memory store lock poisoned".to_string())
}

#[async_trait]
impl<K, V> TenantStore<K, V> for InMemoryTenantStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, tenant_id: TenantId, key: &K) -> Result<Option<V>, StoreError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map.get(&(tenant_id, key.clone())).cloned())
    }

    async fn upsert(&self, tenant_id: TenantId, key: K, value: V) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        map.insert((tenant_id, key), value);
        Ok(())
    }

    async fn remove(&self, tenant_id: TenantId, key: &K) -> Result<bool, StoreError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        Ok(map.remove(&(tenant_id, key.clone())).is_some())
    }

    async fn list(&self, tenant_id: TenantId) -> Result<Vec<V>, StoreError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map
            .iter()
            .filter_map(|((t, _k), v)| if *t == tenant_id { Some(v.clone()) } else { None })
            .collect())
    }

    async fn clear_tenant(&self, tenant_id: TenantId) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        map.retain(|(t, _k), _v| *t != tenant_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tenants_are_isolated() {
        let store: InMemoryTenantStore<String, i64> = InMemoryTenantStore::new();
        let (a, b) = (TenantId::new(), TenantId::new());
        store.upsert(a, "cotton".into(), 10).await.unwrap();
        store.upsert(b, "cotton".into(), 99).await.unwrap();

        assert_eq!(store.get(a, &"cotton".to_string()).await.unwrap(), Some(10));
        assert_eq!(store.list(a).await.unwrap(), vec![10]);

        store.clear_tenant(a).await.unwrap();
        assert!(store.list(a).await.unwrap().is_empty());
        assert_eq!(store.list(b).await.unwrap(), vec![99]);
    }

    #[tokio::test]
    async fn remove_reports_whether_anything_changed() {
        let store: Arc<dyn TenantStore<String, i64>> = Arc::new(InMemoryTenantStore::new());
        let t = TenantId::new();
        store.upsert(t, "denim".into(), 1).await.unwrap();
        assert!(store.remove(t, &"denim".to_string()).await.unwrap());
        assert!(!store.remove(t, &"denim".to_string()).await.unwrap());
        assert_eq!(store.get(t, &"denim".to_string()).await.unwrap(), None);
    }
}

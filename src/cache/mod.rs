//! Best-effort read-through cache for ledger lookups.
//!
//! The cache coordinator is a collaborator, not a source of truth: every
//! failure here is logged and swallowed by callers, and coherency after a
//! missed invalidation is bounded only by the entry TTL.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("cache operation failed: {0}")]
    OperationFailed(String),
}

/// Cache key for one ledger entry, scoped the same way the records are.
pub fn inventory_key(tenant_id: Uuid, warehouse_id: Uuid, product_id: Uuid) -> String {
    format!("inventory:{}:{}:{}", tenant_id, warehouse_id, product_id)
}

#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;
    async fn clear(&self) -> Result<(), CacheError>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
        }
    }

    fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Instant::now() > expires_at,
            None => false,
        }
    }
}

/// In-memory TTL cache. The single concrete backend injected at startup;
/// a networked backend would implement the same trait.
#[derive(Debug, Clone)]
pub struct InMemoryCache {
    store: Arc<RwLock<HashMap<String, CacheEntry>>>,
    max_entries: usize,
}

impl InMemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            store: Arc::new(RwLock::new(HashMap::new())),
            max_entries,
        }
    }

    fn lock_err<T>(_: T) -> CacheError {
        CacheError::OperationFailed("cache store lock poisoned".to_string())
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait::async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let expired = {
            let store = self.store.read().map_err(Self::lock_err)?;
            match store.get(key) {
                Some(entry) if entry.is_expired() => true,
                Some(entry) => return Ok(Some(entry.value.clone())),
                None => return Ok(None),
            }
        };
        if expired {
            let mut store = self.store.write().map_err(Self::lock_err)?;
            store.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut store = self.store.write().map_err(Self::lock_err)?;
        if store.len() >= self.max_entries && !store.contains_key(key) {
            // Evict expired entries before refusing new ones.
            store.retain(|_, entry| !entry.is_expired());
            if store.len() >= self.max_entries {
                return Err(CacheError::OperationFailed("cache full".to_string()));
            }
        }
        store.insert(key.to_string(), CacheEntry::new(value.to_string(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut store = self.store.write().map_err(Self::lock_err)?;
        store.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.get(key).await?.is_some())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut store = self.store.write().map_err(Self::lock_err)?;
        store.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete_roundtrip() {
        let cache = InMemoryCache::default();
        cache.set("k", "v", None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entries_read_as_miss() {
        let cache = InMemoryCache::default();
        cache
            .set("k", "v", Some(Duration::from_millis(5)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(!cache.exists("k").await.unwrap());
    }

    #[test]
    fn key_scheme_is_tenant_scoped() {
        let t = Uuid::new_v4();
        let w = Uuid::new_v4();
        let p = Uuid::new_v4();
        let key = inventory_key(t, w, p);
        assert!(key.starts_with("inventory:"));
        assert!(key.contains(&t.to_string()));
        assert_ne!(key, inventory_key(Uuid::new_v4(), w, p));
    }
}

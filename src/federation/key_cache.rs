//! Remote public key cache
//!
//! Caches fetched actor public keys, keyed by keyId, with a wall-clock
//! TTL. Entries are persisted under `remote-actors/public-keys/` so a
//! restart does not refetch every key; expired entries are refetched on
//! demand and swept by the background worker.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::store::{self, ns, uri_key, Store};

/// A cached remote public key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedKey {
    /// keyId URI
    pub id: String,
    /// Actor URI owning the key
    pub owner: String,
    pub public_key_pem: String,
    pub cached_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

impl CachedKey {
    fn is_valid(&self) -> bool {
        let age = Utc::now().signed_duration_since(self.cached_at);
        age.num_seconds() >= 0 && (age.num_seconds() as u64) < self.ttl_secs
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct KeyCacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
}

pub struct PublicKeyCache {
    memory: RwLock<HashMap<String, CachedKey>>,
    store: Arc<dyn Store>,
    http_client: Arc<reqwest::Client>,
    ttl: Duration,
    fetch_timeout: Duration,
}

impl PublicKeyCache {
    pub fn new(
        store: Arc<dyn Store>,
        http_client: Arc<reqwest::Client>,
        ttl: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            memory: RwLock::new(HashMap::new()),
            store,
            http_client,
            ttl,
            fetch_timeout,
        }
    }

    /// Get the key for a keyId, fetching from the remote actor on a miss
    pub async fn get(&self, key_id: &str) -> Result<CachedKey> {
        {
            let memory = self.memory.read().await;
            if let Some(cached) = memory.get(key_id) {
                if cached.is_valid() {
                    tracing::debug!(%key_id, "Public key cache hit");
                    return Ok(cached.clone());
                }
                tracing::debug!(%key_id, "Public key cache entry expired");
            }
        }

        // Persisted entries survive restarts
        if let Some(cached) =
            store::get_json::<CachedKey>(self.store.as_ref(), ns::PUBLIC_KEYS, &uri_key(key_id))
                .await?
        {
            if cached.is_valid() {
                self.memory
                    .write()
                    .await
                    .insert(key_id.to_string(), cached.clone());
                return Ok(cached);
            }
        }

        tracing::debug!(%key_id, "Public key cache miss, fetching");
        let (owner, pem) =
            super::signature::fetch_public_key(key_id, &self.http_client, self.fetch_timeout)
                .await?;
        let cached = CachedKey {
            id: key_id.to_string(),
            owner,
            public_key_pem: pem,
            cached_at: Utc::now(),
            ttl_secs: self.ttl.as_secs(),
        };
        self.insert(cached.clone()).await?;
        Ok(cached)
    }

    /// Insert an entry directly, replacing any previous one
    pub async fn insert(&self, cached: CachedKey) -> Result<()> {
        store::put_json(
            self.store.as_ref(),
            ns::PUBLIC_KEYS,
            &uri_key(&cached.id),
            &cached,
        )
        .await?;
        self.memory
            .write()
            .await
            .insert(cached.id.clone(), cached);
        Ok(())
    }

    /// Drop an entry, e.g. after a key rotation upstream
    pub async fn invalidate(&self, key_id: &str) -> Result<()> {
        self.memory.write().await.remove(key_id);
        self.store
            .delete(ns::PUBLIC_KEYS, &uri_key(key_id))
            .await?;
        tracing::debug!(%key_id, "Invalidated cached public key");
        Ok(())
    }

    pub async fn stats(&self) -> KeyCacheStats {
        let memory = self.memory.read().await;
        let total = memory.len();
        let valid = memory.values().filter(|k| k.is_valid()).count();
        KeyCacheStats {
            total_entries: total,
            valid_entries: valid,
            expired_entries: total - valid,
        }
    }

    /// Sweep expired entries from memory and the persistent store
    pub async fn prune_expired(&self) -> Result<()> {
        let mut removed = 0usize;
        {
            let mut memory = self.memory.write().await;
            let before = memory.len();
            memory.retain(|_, k| k.is_valid());
            removed += before - memory.len();
        }
        for key in self.store.list(ns::PUBLIC_KEYS).await? {
            if let Some(cached) =
                store::get_json::<CachedKey>(self.store.as_ref(), ns::PUBLIC_KEYS, &key).await?
            {
                if !cached.is_valid() {
                    self.store.delete(ns::PUBLIC_KEYS, &key).await?;
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            tracing::info!(removed, "Pruned expired public key cache entries");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn cache_with_ttl(ttl: Duration) -> PublicKeyCache {
        PublicKeyCache::new(
            Arc::new(MemoryStore::new()),
            Arc::new(reqwest::Client::new()),
            ttl,
            Duration::from_secs(1),
        )
    }

    fn entry(key_id: &str, cached_at: DateTime<Utc>, ttl_secs: u64) -> CachedKey {
        CachedKey {
            id: key_id.to_string(),
            owner: "https://remote.example/@bob".to_string(),
            public_key_pem: "-----BEGIN PUBLIC KEY-----\nabc\n-----END PUBLIC KEY-----\n"
                .to_string(),
            cached_at,
            ttl_secs,
        }
    }

    #[tokio::test]
    async fn primed_entries_are_served_from_cache() {
        let cache = cache_with_ttl(Duration::from_secs(3600));
        let key_id = "https://remote.example/@bob#main-key";
        cache
            .insert(entry(key_id, Utc::now(), 3600))
            .await
            .unwrap();

        let cached = cache.get(key_id).await.unwrap();
        assert_eq!(cached.owner, "https://remote.example/@bob");
        assert_eq!(cache.stats().await.valid_entries, 1);
    }

    #[tokio::test]
    async fn expired_entries_are_counted_and_pruned() {
        let cache = cache_with_ttl(Duration::from_secs(3600));
        let key_id = "https://remote.example/@bob#main-key";
        let stale = Utc::now() - chrono::Duration::seconds(10);
        cache.insert(entry(key_id, stale, 1)).await.unwrap();

        let stats = cache.stats().await;
        assert_eq!(stats.expired_entries, 1);

        cache.prune_expired().await.unwrap();
        assert_eq!(cache.stats().await.total_entries, 0);
        // The persisted copy is gone too
        let persisted: Option<CachedKey> = store::get_json(
            cache.store.as_ref(),
            ns::PUBLIC_KEYS,
            &uri_key(key_id),
        )
        .await
        .unwrap();
        assert!(persisted.is_none());
    }

    #[tokio::test]
    async fn invalidate_removes_both_copies() {
        let cache = cache_with_ttl(Duration::from_secs(3600));
        let key_id = "https://remote.example/@bob#main-key";
        cache
            .insert(entry(key_id, Utc::now(), 3600))
            .await
            .unwrap();
        cache.invalidate(key_id).await.unwrap();
        assert_eq!(cache.stats().await.total_entries, 0);
        assert!(cache.store.list(ns::PUBLIC_KEYS).await.unwrap().is_empty());
    }
}

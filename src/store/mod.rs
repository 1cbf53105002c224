//! Storage abstraction
//!
//! Per-record persistence behind a small trait so the federation core is
//! not tied to a real filesystem. The default backend writes one JSON file
//! per record under the configured state root; tests use the in-memory
//! backend.

mod fs;
mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::{FederationError, Result};

/// Storage namespaces, matching the on-disk layout
pub mod ns {
    pub const ACTORS: &str = "actors";
    pub const GROUPS: &str = "groups";
    pub const FOLLOWERS: &str = "followers";
    pub const FOLLOWING: &str = "following";
    pub const LIKES: &str = "likes";
    pub const ANNOUNCES: &str = "announces";
    pub const OUTGOING_LIKES: &str = "outgoing-likes";
    pub const OUTGOING_ANNOUNCES: &str = "outgoing-announces";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const DELIVERY_QUEUE: &str = "delivery-queue";
    pub const DELIVERY_LOGS: &str = "delivery-logs";
    pub const PUBLIC_KEYS: &str = "remote-actors/public-keys";

    /// Per-actor remote-content mirror namespace
    pub fn remote_content(handle: &str) -> String {
        format!("remote-content/{}", handle)
    }
}

/// Record store
///
/// Values are opaque bytes (JSON in practice). `append` adds a line to a
/// log stream kept separately from the record under the same key.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>>;
    async fn put(&self, namespace: &str, key: &str, bytes: &[u8]) -> Result<()>;
    /// Returns true when a record was actually removed
    async fn delete(&self, namespace: &str, key: &str) -> Result<bool>;
    /// Keys present in a namespace, in unspecified order
    async fn list(&self, namespace: &str) -> Result<Vec<String>>;
    /// Append one line to the log stream for this key
    async fn append(&self, namespace: &str, key: &str, line: &str) -> Result<()>;
}

/// Fetch and decode a JSON record
///
/// A record that fails to parse is logged and treated as missing.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn Store,
    namespace: &str,
    key: &str,
) -> Result<Option<T>> {
    let Some(bytes) = store.get(namespace, key).await? else {
        return Ok(None);
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok(Some(value)),
        Err(error) => {
            tracing::warn!(%namespace, %key, %error, "Skipping unparseable stored record");
            Ok(None)
        }
    }
}

/// Encode and store a JSON record
pub async fn put_json<T: Serialize>(
    store: &dyn Store,
    namespace: &str,
    key: &str,
    value: &T,
) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| FederationError::Federation(format!("encode {}/{}: {}", namespace, key, e)))?;
    store.put(namespace, key, &bytes).await
}

/// Storage key derived from a URI (activity ids, key ids)
///
/// Percent-encodes everything outside `[A-Za-z0-9_.-]` so the result is a
/// single safe path segment.
pub fn uri_key(uri: &str) -> String {
    urlencoding::encode(uri).into_owned().replace('/', "%2F")
}

/// Async critical sections keyed by string
///
/// Read-modify-write cycles on per-actor lists are serialized through one
/// of these, keyed by `(namespace, handle)`.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, creating it on first use
    pub async fn acquire(&self, key: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

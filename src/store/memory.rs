//! In-memory store for tests

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::Store;
use crate::error::Result;

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<(String, String), Vec<u8>>>,
    logs: RwLock<HashMap<(String, String), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulated log stream for a key, for assertions
    pub async fn log_contents(&self, namespace: &str, key: &str) -> Option<String> {
        self.logs
            .read()
            .await
            .get(&(namespace.to_string(), key.to_string()))
            .cloned()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .records
            .read()
            .await
            .get(&(namespace.to_string(), key.to_string()))
            .cloned())
    }

    async fn put(&self, namespace: &str, key: &str, bytes: &[u8]) -> Result<()> {
        self.records
            .write()
            .await
            .insert((namespace.to_string(), key.to_string()), bytes.to_vec());
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool> {
        Ok(self
            .records
            .write()
            .await
            .remove(&(namespace.to_string(), key.to_string()))
            .is_some())
    }

    async fn list(&self, namespace: &str) -> Result<Vec<String>> {
        Ok(self
            .records
            .read()
            .await
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, key)| key.clone())
            .collect())
    }

    async fn append(&self, namespace: &str, key: &str, line: &str) -> Result<()> {
        let mut logs = self.logs.write().await;
        let entry = logs
            .entry((namespace.to_string(), key.to_string()))
            .or_default();
        entry.push_str(line);
        entry.push('\n');
        Ok(())
    }
}

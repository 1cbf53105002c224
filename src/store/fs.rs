//! Filesystem store
//!
//! One JSON file per record under `{root}/{namespace}/{key}.json`, log
//! streams as `{key}.log`. Writes go through a per-(namespace, key) lock
//! and land via temp file + rename so readers never observe a torn write.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::{KeyedLocks, Store};
use crate::error::{FederationError, Result};

pub struct FsStore {
    root: PathBuf,
    write_locks: KeyedLocks,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_locks: KeyedLocks::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn check_segment(value: &str) -> Result<()> {
        if value.is_empty()
            || value == "."
            || value == ".."
            || value.contains('/')
            || value.contains('\\')
        {
            return Err(FederationError::Federation(format!(
                "invalid storage key segment: {:?}",
                value
            )));
        }
        Ok(())
    }

    fn namespace_dir(&self, namespace: &str) -> Result<PathBuf> {
        let mut dir = self.root.clone();
        for segment in namespace.split('/') {
            Self::check_segment(segment)?;
            dir.push(segment);
        }
        Ok(dir)
    }

    fn record_path(&self, namespace: &str, key: &str) -> Result<PathBuf> {
        Self::check_segment(key)?;
        Ok(self.namespace_dir(namespace)?.join(format!("{}.json", key)))
    }

    fn log_path(&self, namespace: &str, key: &str) -> Result<PathBuf> {
        Self::check_segment(key)?;
        Ok(self.namespace_dir(namespace)?.join(format!("{}.log", key)))
    }

    fn io_error(context: &str, error: std::io::Error) -> FederationError {
        FederationError::Federation(format!("storage {}: {}", context, error))
    }
}

#[async_trait]
impl Store for FsStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.record_path(namespace, key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(Self::io_error("read", error)),
        }
    }

    async fn put(&self, namespace: &str, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.record_path(namespace, key)?;
        let dir = path.parent().expect("record path has a parent").to_path_buf();
        let _guard = self
            .write_locks
            .acquire(&format!("{}/{}", namespace, key))
            .await;

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Self::io_error("mkdir", e))?;

        let tmp = dir.join(format!(".{}.tmp", key));
        {
            let mut file = tokio::fs::File::create(&tmp)
                .await
                .map_err(|e| Self::io_error("create", e))?;
            file.write_all(bytes)
                .await
                .map_err(|e| Self::io_error("write", e))?;
            file.flush().await.map_err(|e| Self::io_error("flush", e))?;
        }
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Self::io_error("rename", e))
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool> {
        let path = self.record_path(namespace, key)?;
        let _guard = self
            .write_locks
            .acquire(&format!("{}/{}", namespace, key))
            .await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(Self::io_error("remove", error)),
        }
    }

    async fn list(&self, namespace: &str) -> Result<Vec<String>> {
        let dir = self.namespace_dir(namespace)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(Self::io_error("list", error)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Self::io_error("list", e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(key) = name.strip_suffix(".json") {
                if !key.starts_with('.') {
                    keys.push(key.to_string());
                }
            }
        }
        Ok(keys)
    }

    async fn append(&self, namespace: &str, key: &str, line: &str) -> Result<()> {
        let path = self.log_path(namespace, key)?;
        let dir = path.parent().expect("log path has a parent").to_path_buf();
        let _guard = self
            .write_locks
            .acquire(&format!("{}/{}.log", namespace, key))
            .await;

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Self::io_error("mkdir", e))?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| Self::io_error("open", e))?;
        file.write_all(format!("{}\n", line).as_bytes())
            .await
            .map_err(|e| Self::io_error("append", e))?;
        file.flush().await.map_err(|e| Self::io_error("flush", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn put_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path());

        store.put("actors", "alice", br#"{"handle":"alice"}"#).await.unwrap();
        let bytes = store.get("actors", "alice").await.unwrap().unwrap();
        assert_eq!(bytes, br#"{"handle":"alice"}"#);

        assert!(dir.path().join("actors/alice.json").exists());
    }

    #[tokio::test]
    async fn delete_reports_prior_existence() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path());

        store.put("likes", "a", b"{}").await.unwrap();
        assert!(store.delete("likes", "a").await.unwrap());
        assert!(!store.delete("likes", "a").await.unwrap());
        assert!(store.get("likes", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_returns_keys_without_extension() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path());

        store.put("delivery-queue", "t1", b"{}").await.unwrap();
        store.put("delivery-queue", "t2", b"{}").await.unwrap();
        let mut keys = store.list("delivery-queue").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["t1", "t2"]);

        assert!(store.list("missing-namespace").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn nested_namespaces_are_directories() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path());

        store
            .put("remote-content/alice", "rec1", b"{}")
            .await
            .unwrap();
        assert!(dir.path().join("remote-content/alice/rec1.json").exists());
    }

    #[tokio::test]
    async fn append_accumulates_lines() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path());

        store.append("delivery-logs", "t1", "one").await.unwrap();
        store.append("delivery-logs", "t1", "two").await.unwrap();
        let content = tokio::fs::read_to_string(dir.path().join("delivery-logs/t1.log"))
            .await
            .unwrap();
        assert_eq!(content, "one\ntwo\n");
    }

    #[tokio::test]
    async fn rejects_path_traversal_keys() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path());
        assert!(store.get("actors", "../etc").await.is_err());
        assert!(store.put("actors", "a/b", b"{}").await.is_err());
    }
}

//! Remote content mirror
//!
//! Per-local-actor collection of remote objects delivered via Create.
//! Update overwrites the stored object; Delete soft-deletes it, replacing
//! the object with a Tombstone while the row is preserved.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::model::ApObject;
use crate::store::{self, ns, uri_key, KeyedLocks, Store};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteContentRecord {
    pub id: String,
    pub activity_id: String,
    pub object_id: String,
    pub object_type: String,
    pub actor_uri: String,
    pub actor_handle: String,
    /// The delivered object, verbatim
    pub object: Value,
    pub received_at: DateTime<Utc>,
    pub published: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub update_activity_id: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

pub struct MirrorStore {
    store: Arc<dyn Store>,
    locks: KeyedLocks,
}

impl MirrorStore {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
        }
    }

    pub async fn get(&self, handle: &str, object_id: &str) -> Result<Option<RemoteContentRecord>> {
        store::get_json(
            self.store.as_ref(),
            &ns::remote_content(handle),
            &uri_key(object_id),
        )
        .await
    }

    pub async fn list(&self, handle: &str) -> Result<Vec<RemoteContentRecord>> {
        let namespace = ns::remote_content(handle);
        let mut records = Vec::new();
        for key in self.store.list(&namespace).await? {
            if let Some(record) =
                store::get_json::<RemoteContentRecord>(self.store.as_ref(), &namespace, &key)
                    .await?
            {
                records.push(record);
            }
        }
        records.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        Ok(records)
    }

    /// Persist a delivered object; false when this activity was already seen
    pub async fn insert(&self, handle: &str, record: RemoteContentRecord) -> Result<bool> {
        let namespace = ns::remote_content(handle);
        let key = uri_key(&record.object_id);
        let _guard = self.locks.acquire(&format!("{}:{}", namespace, key)).await;

        if let Some(existing) =
            store::get_json::<RemoteContentRecord>(self.store.as_ref(), &namespace, &key).await?
        {
            if existing.activity_id == record.activity_id {
                return Ok(false);
            }
        }
        store::put_json(self.store.as_ref(), &namespace, &key, &record).await?;
        Ok(true)
    }

    /// Replace the mirrored object after an inbound Update; no-op when the
    /// object was never mirrored
    pub async fn update(
        &self,
        handle: &str,
        object_id: &str,
        object: Value,
        update_activity_id: &str,
    ) -> Result<bool> {
        let namespace = ns::remote_content(handle);
        let key = uri_key(object_id);
        let _guard = self.locks.acquire(&format!("{}:{}", namespace, key)).await;

        let Some(mut record) =
            store::get_json::<RemoteContentRecord>(self.store.as_ref(), &namespace, &key).await?
        else {
            return Ok(false);
        };
        record.object = object;
        record.updated_at = Some(Utc::now());
        record.update_activity_id = Some(update_activity_id.to_string());
        store::put_json(self.store.as_ref(), &namespace, &key, &record).await?;
        Ok(true)
    }

    /// Soft-delete after an inbound Delete: the row is preserved with its
    /// object replaced by a Tombstone carrying the former type
    pub async fn tombstone(&self, handle: &str, object_id: &str) -> Result<bool> {
        let namespace = ns::remote_content(handle);
        let key = uri_key(object_id);
        let _guard = self.locks.acquire(&format!("{}:{}", namespace, key)).await;

        let Some(mut record) =
            store::get_json::<RemoteContentRecord>(self.store.as_ref(), &namespace, &key).await?
        else {
            return Ok(false);
        };
        if record.deleted {
            return Ok(false);
        }
        let deleted_at = Utc::now();
        record.object = ApObject::tombstone(
            record.object_id.clone(),
            record.object_type.clone(),
            deleted_at.to_rfc3339(),
        )
        .to_value();
        record.deleted = true;
        record.deleted_at = Some(deleted_at);
        store::put_json(self.store.as_ref(), &namespace, &key, &record).await?;
        Ok(true)
    }
}

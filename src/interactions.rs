//! Like and Announce records
//!
//! Inbound records are keyed by the remote activity id and de-duplicated
//! on insert. Outgoing records are kept per local actor so a later Undo
//! can reference the original activity.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::{self, ns, uri_key, KeyedLocks, Store};

/// An inbound Like or Announce
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub id: String,
    pub activity_id: String,
    pub actor_uri: String,
    pub actor_handle: String,
    pub object_id: String,
    pub at: DateTime<Utc>,
}

impl InteractionRecord {
    pub fn new(activity_id: &str, actor_uri: &str, actor_handle: &str, object_id: &str) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            activity_id: activity_id.to_string(),
            actor_uri: actor_uri.to_string(),
            actor_handle: actor_handle.to_string(),
            object_id: object_id.to_string(),
            at: Utc::now(),
        }
    }
}

/// An outbound Like or Announce sent by a local actor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingInteraction {
    pub activity_id: String,
    pub object_uri: String,
    pub at: DateTime<Utc>,
}

/// Which record family an operation touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    Like,
    Announce,
}

impl InteractionKind {
    fn namespace(&self) -> &'static str {
        match self {
            Self::Like => ns::LIKES,
            Self::Announce => ns::ANNOUNCES,
        }
    }

    fn outgoing_namespace(&self) -> &'static str {
        match self {
            Self::Like => ns::OUTGOING_LIKES,
            Self::Announce => ns::OUTGOING_ANNOUNCES,
        }
    }
}

pub struct InteractionStore {
    store: Arc<dyn Store>,
    locks: KeyedLocks,
}

impl InteractionStore {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
        }
    }

    /// Persist an inbound record; false when the activity id was seen before
    pub async fn insert(&self, kind: InteractionKind, record: InteractionRecord) -> Result<bool> {
        let namespace = kind.namespace();
        let key = uri_key(&record.activity_id);
        let _guard = self.locks.acquire(&format!("{}:{}", namespace, key)).await;

        if store::get_json::<InteractionRecord>(self.store.as_ref(), namespace, &key)
            .await?
            .is_some()
        {
            return Ok(false);
        }
        store::put_json(self.store.as_ref(), namespace, &key, &record).await?;
        Ok(true)
    }

    /// Remove the record for an activity id (inbound Undo); idempotent
    pub async fn remove(&self, kind: InteractionKind, activity_id: &str) -> Result<bool> {
        self.store
            .delete(kind.namespace(), &uri_key(activity_id))
            .await
    }

    /// Number of records targeting an object
    pub async fn count_for_object(&self, kind: InteractionKind, object_id: &str) -> Result<usize> {
        let namespace = kind.namespace();
        let mut count = 0;
        for key in self.store.list(namespace).await? {
            if let Some(record) =
                store::get_json::<InteractionRecord>(self.store.as_ref(), namespace, &key).await?
            {
                if record.object_id == object_id {
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    /// Record an activity sent by a local actor
    pub async fn insert_outgoing(
        &self,
        kind: InteractionKind,
        handle: &str,
        record: OutgoingInteraction,
    ) -> Result<()> {
        let namespace = kind.outgoing_namespace();
        let _guard = self.locks.acquire(&format!("{}:{}", namespace, handle)).await;
        let mut records: Vec<OutgoingInteraction> =
            store::get_json(self.store.as_ref(), namespace, handle)
                .await?
                .unwrap_or_default();
        if !records.iter().any(|r| r.activity_id == record.activity_id) {
            records.push(record);
        }
        store::put_json(self.store.as_ref(), namespace, handle, &records).await
    }

    /// All of a local actor's outgoing records
    pub async fn list_outgoing(
        &self,
        kind: InteractionKind,
        handle: &str,
    ) -> Result<Vec<OutgoingInteraction>> {
        Ok(
            store::get_json(self.store.as_ref(), kind.outgoing_namespace(), handle)
                .await?
                .unwrap_or_default(),
        )
    }

    /// The local actor's outgoing record for an object, if any
    pub async fn find_outgoing(
        &self,
        kind: InteractionKind,
        handle: &str,
        object_uri: &str,
    ) -> Result<Option<OutgoingInteraction>> {
        let records: Vec<OutgoingInteraction> =
            store::get_json(self.store.as_ref(), kind.outgoing_namespace(), handle)
                .await?
                .unwrap_or_default();
        Ok(records.into_iter().find(|r| r.object_uri == object_uri))
    }

    /// Drop the outgoing record after an Undo
    pub async fn remove_outgoing(
        &self,
        kind: InteractionKind,
        handle: &str,
        activity_id: &str,
    ) -> Result<()> {
        let namespace = kind.outgoing_namespace();
        let _guard = self.locks.acquire(&format!("{}:{}", namespace, handle)).await;
        let mut records: Vec<OutgoingInteraction> =
            store::get_json(self.store.as_ref(), namespace, handle)
                .await?
                .unwrap_or_default();
        records.retain(|r| r.activity_id != activity_id);
        store::put_json(self.store.as_ref(), namespace, handle, &records).await
    }
}

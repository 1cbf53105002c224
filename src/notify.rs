//! Per-actor notification lists
//!
//! Newest first, capped at 100 entries; the oldest fall off on insert.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::{self, ns, KeyedLocks, Store};

/// Hard cap per actor
pub const NOTIFICATION_CAP: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Follow,
    FollowAccepted,
    FollowRejected,
    Like,
    Announce,
    Mention,
    Reply,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub actor_uri: String,
    pub actor_handle: String,
    pub actor_name: Option<String>,
    pub actor_avatar: Option<String>,
    pub target_uri: Option<String>,
    pub activity_id: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
    /// Short excerpt for mention/reply notifications
    pub content: Option<String>,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        actor_uri: &str,
        actor_handle: &str,
        activity_id: &str,
    ) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            kind,
            actor_uri: actor_uri.to_string(),
            actor_handle: actor_handle.to_string(),
            actor_name: None,
            actor_avatar: None,
            target_uri: None,
            activity_id: activity_id.to_string(),
            created_at: Utc::now(),
            read: false,
            content: None,
        }
    }

    pub fn with_target(mut self, target_uri: &str) -> Self {
        self.target_uri = Some(target_uri.to_string());
        self
    }

    pub fn with_content(mut self, content: String) -> Self {
        self.content = Some(content);
        self
    }
}

pub struct NotificationStore {
    store: Arc<dyn Store>,
    locks: KeyedLocks,
}

impl NotificationStore {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
        }
    }

    /// Notifications for an actor, newest first
    pub async fn list(&self, handle: &str) -> Result<Vec<Notification>> {
        Ok(
            store::get_json(self.store.as_ref(), ns::NOTIFICATIONS, handle)
                .await?
                .unwrap_or_default(),
        )
    }

    /// Prepend a notification, dropping entries past the cap
    pub async fn push(&self, handle: &str, notification: Notification) -> Result<()> {
        let _guard = self
            .locks
            .acquire(&format!("notifications:{}", handle))
            .await;
        let mut notifications = self.list(handle).await?;
        notifications.insert(0, notification);
        notifications.truncate(NOTIFICATION_CAP);
        store::put_json(self.store.as_ref(), ns::NOTIFICATIONS, handle, &notifications).await
    }

    pub async fn unread_count(&self, handle: &str) -> Result<usize> {
        Ok(self.list(handle).await?.iter().filter(|n| !n.read).count())
    }

    pub async fn mark_read(&self, handle: &str, notification_id: &str) -> Result<bool> {
        let _guard = self
            .locks
            .acquire(&format!("notifications:{}", handle))
            .await;
        let mut notifications = self.list(handle).await?;
        let Some(notification) = notifications.iter_mut().find(|n| n.id == notification_id)
        else {
            return Ok(false);
        };
        notification.read = true;
        store::put_json(self.store.as_ref(), ns::NOTIFICATIONS, handle, &notifications).await?;
        Ok(true)
    }

    pub async fn mark_all_read(&self, handle: &str) -> Result<()> {
        let _guard = self
            .locks
            .acquire(&format!("notifications:{}", handle))
            .await;
        let mut notifications = self.list(handle).await?;
        for notification in &mut notifications {
            notification.read = true;
        }
        store::put_json(self.store.as_ref(), ns::NOTIFICATIONS, handle, &notifications).await
    }
}

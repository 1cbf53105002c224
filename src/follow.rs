//! Follower and following graph
//!
//! Per-local-actor lists, read-modify-write with last-writer-wins
//! semantics; insertion is upsert by remote actor URI. Mutations of the
//! same actor's list are serialized by a keyed critical section.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::{self, ns, KeyedLocks, Store};

/// Follower status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowStatus {
    Pending,
    Accepted,
    Rejected,
    Blocked,
}

/// Following (outgoing) status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowingStatus {
    Pending,
    Accepted,
}

/// A remote actor following a local one
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Follower {
    pub actor_uri: String,
    pub handle: String,
    pub domain: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub followed_at: DateTime<Utc>,
    pub status: FollowStatus,
}

/// A remote actor a local one follows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Following {
    pub actor_uri: String,
    pub handle: String,
    pub domain: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub followed_at: DateTime<Utc>,
    pub status: FollowingStatus,
    /// Id of the Follow activity this instance sent, matched against
    /// inbound Accept/Reject
    pub follow_activity_id: Option<String>,
}

/// Split a remote actor URI into (handle, domain), best effort
pub fn handle_and_domain(actor_uri: &str) -> (String, String) {
    let Ok(parsed) = url::Url::parse(actor_uri) else {
        return (actor_uri.to_string(), String::new());
    };
    let domain = parsed.host_str().unwrap_or_default().to_string();
    let handle = parsed
        .path_segments()
        .and_then(|segments| segments.last())
        .unwrap_or_default()
        .trim_start_matches('@')
        .to_string();
    let handle = if handle.is_empty() {
        actor_uri.to_string()
    } else {
        handle
    };
    (handle, domain)
}

/// Per-actor follower/following lists
pub struct FollowGraph {
    store: Arc<dyn Store>,
    locks: KeyedLocks,
}

impl FollowGraph {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
        }
    }

    pub async fn followers(&self, handle: &str) -> Result<Vec<Follower>> {
        Ok(
            store::get_json(self.store.as_ref(), ns::FOLLOWERS, handle)
                .await?
                .unwrap_or_default(),
        )
    }

    pub async fn following(&self, handle: &str) -> Result<Vec<Following>> {
        Ok(
            store::get_json(self.store.as_ref(), ns::FOLLOWING, handle)
                .await?
                .unwrap_or_default(),
        )
    }

    /// Record an inbound follow request, returning the resulting status
    ///
    /// Re-follows from an accepted follower stay accepted; rejected and
    /// blocked rows keep their status until cleared by an admin.
    pub async fn insert_follow_request(
        &self,
        handle: &str,
        follower: Follower,
    ) -> Result<FollowStatus> {
        let _guard = self.locks.acquire(&format!("followers:{}", handle)).await;

        let mut followers = self.followers(handle).await?;
        let status = match followers
            .iter_mut()
            .find(|f| f.actor_uri == follower.actor_uri)
        {
            Some(existing) => {
                match existing.status {
                    // Terminal refusals hold until separately cleared
                    FollowStatus::Rejected | FollowStatus::Blocked => {}
                    FollowStatus::Accepted => {
                        existing.display_name = follower.display_name.clone();
                        existing.avatar_url = follower.avatar_url.clone();
                    }
                    FollowStatus::Pending => {
                        *existing = follower.clone();
                    }
                }
                existing.status
            }
            None => {
                let status = follower.status;
                followers.push(follower);
                status
            }
        };
        store::put_json(self.store.as_ref(), ns::FOLLOWERS, handle, &followers).await?;
        Ok(status)
    }

    /// Flip a pending follower to accepted
    pub async fn accept_follow_request(&self, handle: &str, actor_uri: &str) -> Result<bool> {
        self.set_follower_status(handle, actor_uri, FollowStatus::Pending, FollowStatus::Accepted)
            .await
    }

    /// Flip a pending follower to rejected; the row is kept and blocks
    /// future follow requests from that URI
    pub async fn reject_follow_request(&self, handle: &str, actor_uri: &str) -> Result<bool> {
        self.set_follower_status(handle, actor_uri, FollowStatus::Pending, FollowStatus::Rejected)
            .await
    }

    /// Admin action: block regardless of current status
    pub async fn block_follower(&self, handle: &str, actor_uri: &str) -> Result<bool> {
        let _guard = self.locks.acquire(&format!("followers:{}", handle)).await;
        let mut followers = self.followers(handle).await?;
        let Some(follower) = followers.iter_mut().find(|f| f.actor_uri == actor_uri) else {
            return Ok(false);
        };
        follower.status = FollowStatus::Blocked;
        store::put_json(self.store.as_ref(), ns::FOLLOWERS, handle, &followers).await?;
        Ok(true)
    }

    async fn set_follower_status(
        &self,
        handle: &str,
        actor_uri: &str,
        from: FollowStatus,
        to: FollowStatus,
    ) -> Result<bool> {
        let _guard = self.locks.acquire(&format!("followers:{}", handle)).await;
        let mut followers = self.followers(handle).await?;
        let Some(follower) = followers
            .iter_mut()
            .find(|f| f.actor_uri == actor_uri && f.status == from)
        else {
            return Ok(false);
        };
        follower.status = to;
        store::put_json(self.store.as_ref(), ns::FOLLOWERS, handle, &followers).await?;
        Ok(true)
    }

    /// Remove a follower row (inbound Undo Follow)
    pub async fn remove_follower(&self, handle: &str, actor_uri: &str) -> Result<bool> {
        let _guard = self.locks.acquire(&format!("followers:{}", handle)).await;
        let mut followers = self.followers(handle).await?;
        let before = followers.len();
        followers.retain(|f| f.actor_uri != actor_uri);
        if followers.len() == before {
            return Ok(false);
        }
        store::put_json(self.store.as_ref(), ns::FOLLOWERS, handle, &followers).await?;
        Ok(true)
    }

    /// Follower URIs with the given status, for delivery fan-out
    pub async fn follower_uris(&self, handle: &str, status: FollowStatus) -> Result<Vec<String>> {
        Ok(self
            .followers(handle)
            .await?
            .into_iter()
            .filter(|f| f.status == status)
            .map(|f| f.actor_uri)
            .collect())
    }

    /// Record an outgoing follow as pending
    pub async fn insert_following(&self, handle: &str, following: Following) -> Result<()> {
        let _guard = self.locks.acquire(&format!("following:{}", handle)).await;
        let mut rows = self.following(handle).await?;
        match rows.iter_mut().find(|f| f.actor_uri == following.actor_uri) {
            Some(existing) => *existing = following,
            None => rows.push(following),
        }
        store::put_json(self.store.as_ref(), ns::FOLLOWING, handle, &rows).await
    }

    /// Inbound Accept: flip our pending following row to accepted
    pub async fn accept_following(&self, handle: &str, remote_uri: &str) -> Result<bool> {
        let _guard = self.locks.acquire(&format!("following:{}", handle)).await;
        let mut rows = self.following(handle).await?;
        let Some(row) = rows
            .iter_mut()
            .find(|f| f.actor_uri == remote_uri && f.status == FollowingStatus::Pending)
        else {
            return Ok(false);
        };
        row.status = FollowingStatus::Accepted;
        store::put_json(self.store.as_ref(), ns::FOLLOWING, handle, &rows).await?;
        Ok(true)
    }

    /// Inbound Reject (or our own Undo Follow): delete the row
    pub async fn remove_following(&self, handle: &str, remote_uri: &str) -> Result<bool> {
        let _guard = self.locks.acquire(&format!("following:{}", handle)).await;
        let mut rows = self.following(handle).await?;
        let before = rows.len();
        rows.retain(|f| f.actor_uri != remote_uri);
        if rows.len() == before {
            return Ok(false);
        }
        store::put_json(self.store.as_ref(), ns::FOLLOWING, handle, &rows).await?;
        Ok(true)
    }

    /// True iff `handle` follows `remote_uri` with accepted status
    pub async fn is_following(&self, handle: &str, remote_uri: &str) -> Result<bool> {
        Ok(self
            .following(handle)
            .await?
            .iter()
            .any(|f| f.actor_uri == remote_uri && f.status == FollowingStatus::Accepted))
    }
}

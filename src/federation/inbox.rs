//! Inbound activity processing
//!
//! Dispatches verified envelopes by type and mutates the follower graph,
//! interaction records, remote-content mirror, and notification lists.
//! Handlers are idempotent by activity id; unknown types are logged and
//! ignored.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::config::FederationConfig;
use crate::error::{FederationError, Result};
use crate::follow::{handle_and_domain, FollowGraph, FollowStatus, Follower};
use crate::interactions::{InteractionKind, InteractionRecord, InteractionStore};
use crate::mirror::{MirrorStore, RemoteContentRecord};
use crate::model::{ActivityKind, Envelope, ObjectRef};
use crate::notify::{Notification, NotificationKind, NotificationStore};
use crate::text;

use super::builder;
use super::delivery::DeliveryQueue;

/// Characters of remote content carried into a notification
const EXCERPT_CHARS: usize = 200;

pub struct InboxProcessor {
    config: Arc<FederationConfig>,
    follows: Arc<FollowGraph>,
    notifications: Arc<NotificationStore>,
    interactions: Arc<InteractionStore>,
    mirror: Arc<MirrorStore>,
    queue: Arc<DeliveryQueue>,
}

impl InboxProcessor {
    pub fn new(
        config: Arc<FederationConfig>,
        follows: Arc<FollowGraph>,
        notifications: Arc<NotificationStore>,
        interactions: Arc<InteractionStore>,
        mirror: Arc<MirrorStore>,
        queue: Arc<DeliveryQueue>,
    ) -> Self {
        Self {
            config,
            follows,
            notifications,
            interactions,
            mirror,
            queue,
        }
    }

    /// Find the local actor an envelope is aimed at
    ///
    /// Used by the shared inbox, where no handle is in the path. Checks
    /// the object (Follow), the embedded object's actor (Accept/Reject),
    /// and the addressing lists.
    pub fn resolve_local_target(&self, envelope: &Envelope) -> Option<String> {
        if let Some(object) = &envelope.object {
            if let Some(id) = object.id() {
                if let Some(handle) = self.config.local_handle_from_uri(id) {
                    return Some(handle);
                }
            }
            if let Some(embedded) = object.as_embedded() {
                if let Some(actor) = embedded.get("actor").and_then(Value::as_str) {
                    if let Some(handle) = self.config.local_handle_from_uri(actor) {
                        return Some(handle);
                    }
                }
            }
        }
        envelope
            .to
            .iter()
            .chain(envelope.cc.iter())
            .find_map(|uri| self.config.local_handle_from_uri(uri))
    }

    /// Process a verified envelope addressed to `handle`
    pub async fn process(&self, handle: &str, envelope: &Envelope) -> Result<()> {
        let Some(kind) = envelope.known_kind() else {
            tracing::info!(
                kind = %envelope.kind,
                activity = %envelope.id,
                "Ignoring unknown activity type"
            );
            return Ok(());
        };

        match kind {
            ActivityKind::Follow => self.handle_follow(handle, envelope).await,
            ActivityKind::Accept => self.handle_accept(handle, envelope).await,
            ActivityKind::Reject => self.handle_reject(handle, envelope).await,
            ActivityKind::Undo => self.handle_undo(handle, envelope).await,
            ActivityKind::Like => self.handle_like(handle, envelope).await,
            ActivityKind::Announce => self.handle_announce(handle, envelope).await,
            ActivityKind::Create => self.handle_create(handle, envelope).await,
            ActivityKind::Update => self.handle_update(handle, envelope).await,
            ActivityKind::Delete => self.handle_delete(handle, envelope).await,
            other => {
                tracing::info!(
                    kind = %other.as_str(),
                    activity = %envelope.id,
                    "Ignoring unhandled activity type"
                );
                Ok(())
            }
        }
    }

    async fn handle_follow(&self, handle: &str, envelope: &Envelope) -> Result<()> {
        let target = envelope
            .object
            .as_ref()
            .and_then(ObjectRef::id)
            .ok_or_else(|| {
                FederationError::BadRequest("Follow is missing its target".to_string())
            })?;
        if target != self.config.actor_uri(handle) {
            return Err(FederationError::BadRequest(
                "Follow target is not this actor".to_string(),
            ));
        }

        // Idempotent by remote actor: a repeat Follow changes nothing
        let already_known = self
            .follows
            .followers(handle)
            .await?
            .iter()
            .any(|f| f.actor_uri == envelope.actor);

        let (remote_handle, remote_domain) = handle_and_domain(&envelope.actor);
        let status = self
            .follows
            .insert_follow_request(
                handle,
                Follower {
                    actor_uri: envelope.actor.clone(),
                    handle: remote_handle.clone(),
                    domain: remote_domain,
                    display_name: None,
                    avatar_url: None,
                    followed_at: Utc::now(),
                    status: FollowStatus::Pending,
                },
            )
            .await?;

        if matches!(status, FollowStatus::Rejected | FollowStatus::Blocked) {
            tracing::info!(
                %handle,
                follower = %envelope.actor,
                "Ignoring follow request from refused actor"
            );
            return Ok(());
        }

        if !already_known {
            self.notifications
                .push(
                    handle,
                    Notification::new(
                        NotificationKind::Follow,
                        &envelope.actor,
                        &remote_handle,
                        &envelope.id,
                    )
                    .with_target(&self.config.actor_uri(handle)),
                )
                .await?;
        }

        if self.config.federation.auto_approve_follows {
            self.follows
                .accept_follow_request(handle, &envelope.actor)
                .await?;
            let accept = builder::accept(
                &self.config,
                &self.config.actor_uri(handle),
                envelope.raw.clone(),
                &envelope.actor,
            );
            self.queue
                .enqueue(
                    accept.to_value(),
                    vec![envelope.actor.clone()],
                    Some(handle.to_string()),
                )
                .await?;
        }
        Ok(())
    }

    /// Match an inbound Accept/Reject against our outgoing Follow
    ///
    /// The object is either our Follow activity id or the embedded Follow;
    /// in both cases the accepting remote must be the Follow's target.
    async fn validate_follow_response(
        &self,
        handle: &str,
        envelope: &Envelope,
    ) -> Result<bool> {
        let Some(object) = &envelope.object else {
            return Ok(false);
        };
        if let Some(embedded) = object.as_embedded() {
            if embedded.get("type").and_then(Value::as_str) != Some("Follow") {
                return Ok(false);
            }
            if embedded.get("object").and_then(Value::as_str) != Some(envelope.actor.as_str()) {
                return Ok(false);
            }
            return Ok(true);
        }
        // URI reference: match our recorded Follow activity id
        let follow_id = object.id().unwrap_or_default();
        Ok(self
            .follows
            .following(handle)
            .await?
            .iter()
            .any(|row| {
                row.actor_uri == envelope.actor
                    && row.follow_activity_id.as_deref() == Some(follow_id)
            }))
    }

    async fn handle_accept(&self, handle: &str, envelope: &Envelope) -> Result<()> {
        if !self.validate_follow_response(handle, envelope).await? {
            tracing::info!(
                %handle,
                activity = %envelope.id,
                "Accept does not match an outgoing follow, ignoring"
            );
            return Ok(());
        }
        let flipped = self
            .follows
            .accept_following(handle, &envelope.actor)
            .await?;
        if flipped {
            let (remote_handle, _) = handle_and_domain(&envelope.actor);
            self.notifications
                .push(
                    handle,
                    Notification::new(
                        NotificationKind::FollowAccepted,
                        &envelope.actor,
                        &remote_handle,
                        &envelope.id,
                    ),
                )
                .await?;
        }
        Ok(())
    }

    async fn handle_reject(&self, handle: &str, envelope: &Envelope) -> Result<()> {
        if !self.validate_follow_response(handle, envelope).await? {
            tracing::info!(
                %handle,
                activity = %envelope.id,
                "Reject does not match an outgoing follow, ignoring"
            );
            return Ok(());
        }
        let removed = self
            .follows
            .remove_following(handle, &envelope.actor)
            .await?;
        if removed {
            let (remote_handle, _) = handle_and_domain(&envelope.actor);
            self.notifications
                .push(
                    handle,
                    Notification::new(
                        NotificationKind::FollowRejected,
                        &envelope.actor,
                        &remote_handle,
                        &envelope.id,
                    ),
                )
                .await?;
        }
        Ok(())
    }

    async fn handle_undo(&self, handle: &str, envelope: &Envelope) -> Result<()> {
        let Some(object) = &envelope.object else {
            return Ok(());
        };
        let Some(undone_kind) = object.kind() else {
            // A bare URI gives no type to dispatch on
            tracing::info!(activity = %envelope.id, "Undo without an embedded object, ignoring");
            return Ok(());
        };

        match undone_kind {
            "Follow" => {
                self.follows.remove_follower(handle, &envelope.actor).await?;
            }
            "Like" => {
                if let Some(id) = object.id() {
                    self.interactions.remove(InteractionKind::Like, id).await?;
                }
            }
            "Announce" => {
                if let Some(id) = object.id() {
                    self.interactions
                        .remove(InteractionKind::Announce, id)
                        .await?;
                }
            }
            other => {
                tracing::info!(kind = %other, activity = %envelope.id, "Ignoring Undo of type");
            }
        }
        Ok(())
    }

    async fn interaction(
        &self,
        handle: &str,
        envelope: &Envelope,
        kind: InteractionKind,
        notification_kind: NotificationKind,
    ) -> Result<()> {
        let object_uri = envelope
            .object
            .as_ref()
            .and_then(ObjectRef::as_uri)
            .ok_or_else(|| {
                FederationError::BadRequest(format!(
                    "{} object must be a URI",
                    envelope.kind
                ))
            })?;

        let (remote_handle, _) = handle_and_domain(&envelope.actor);
        let fresh = self
            .interactions
            .insert(
                kind,
                InteractionRecord::new(&envelope.id, &envelope.actor, &remote_handle, object_uri),
            )
            .await?;
        if !fresh {
            return Ok(());
        }

        self.notifications
            .push(
                handle,
                Notification::new(notification_kind, &envelope.actor, &remote_handle, &envelope.id)
                    .with_target(object_uri),
            )
            .await
    }

    async fn handle_like(&self, handle: &str, envelope: &Envelope) -> Result<()> {
        self.interaction(handle, envelope, InteractionKind::Like, NotificationKind::Like)
            .await
    }

    async fn handle_announce(&self, handle: &str, envelope: &Envelope) -> Result<()> {
        self.interaction(
            handle,
            envelope,
            InteractionKind::Announce,
            NotificationKind::Announce,
        )
        .await
    }

    /// Mentions of local actors in an object's tag list
    fn local_mentions(&self, object: &Value) -> Vec<String> {
        let Some(tags) = object.get("tag").and_then(Value::as_array) else {
            return Vec::new();
        };
        tags.iter()
            .filter(|tag| tag.get("type").and_then(Value::as_str) == Some("Mention"))
            .filter_map(|tag| tag.get("href").and_then(Value::as_str))
            .filter_map(|href| self.config.local_handle_from_uri(href))
            .collect()
    }

    async fn handle_create(&self, handle: &str, envelope: &Envelope) -> Result<()> {
        let Some(object) = envelope.object.as_ref().and_then(ObjectRef::as_embedded) else {
            tracing::info!(activity = %envelope.id, "Create without an embedded object, ignoring");
            return Ok(());
        };
        let object_id = object
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                FederationError::BadRequest("Created object is missing id".to_string())
            })?;
        let object_type = object
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("Object");

        let (remote_handle, _) = handle_and_domain(&envelope.actor);
        let fresh = self
            .mirror
            .insert(
                handle,
                RemoteContentRecord {
                    id: ulid::Ulid::new().to_string(),
                    activity_id: envelope.id.clone(),
                    object_id: object_id.to_string(),
                    object_type: object_type.to_string(),
                    actor_uri: envelope.actor.clone(),
                    actor_handle: remote_handle.clone(),
                    object: object.clone(),
                    received_at: Utc::now(),
                    published: object
                        .get("published")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    updated_at: None,
                    update_activity_id: None,
                    deleted: false,
                    deleted_at: None,
                },
            )
            .await?;
        if !fresh {
            return Ok(());
        }

        let content_excerpt = object
            .get("content")
            .and_then(Value::as_str)
            .map(|content| text::excerpt(content, EXCERPT_CHARS));

        let mentioned = self.local_mentions(object);
        for local_handle in &mentioned {
            let mut notification = Notification::new(
                NotificationKind::Mention,
                &envelope.actor,
                &remote_handle,
                &envelope.id,
            )
            .with_target(object_id);
            if let Some(excerpt) = &content_excerpt {
                notification = notification.with_content(excerpt.clone());
            }
            self.notifications.push(local_handle, notification).await?;
        }

        let in_reply_to = object.get("inReplyTo").and_then(Value::as_str);
        if let Some(parent) = in_reply_to {
            let replied_to_inbox_owner = self.config.is_local_uri(parent)
                && !mentioned.iter().any(|m| m == handle);
            if replied_to_inbox_owner {
                let mut notification = Notification::new(
                    NotificationKind::Reply,
                    &envelope.actor,
                    &remote_handle,
                    &envelope.id,
                )
                .with_target(object_id);
                if let Some(excerpt) = &content_excerpt {
                    notification = notification.with_content(excerpt.clone());
                }
                self.notifications.push(handle, notification).await?;
            }
        }
        Ok(())
    }

    async fn handle_update(&self, handle: &str, envelope: &Envelope) -> Result<()> {
        let Some(object) = envelope.object.as_ref().and_then(ObjectRef::as_embedded) else {
            return Ok(());
        };
        let Some(object_id) = object.get("id").and_then(Value::as_str) else {
            return Ok(());
        };
        let updated = self
            .mirror
            .update(handle, object_id, object.clone(), &envelope.id)
            .await?;
        if !updated {
            tracing::debug!(%object_id, "Update for unmirrored object, ignoring");
        }
        Ok(())
    }

    async fn handle_delete(&self, handle: &str, envelope: &Envelope) -> Result<()> {
        let Some(object_id) = envelope.object.as_ref().and_then(ObjectRef::id) else {
            return Ok(());
        };
        let deleted = self.mirror.tombstone(handle, object_id).await?;
        if !deleted {
            tracing::debug!(%object_id, "Delete for unmirrored object, ignoring");
        }
        Ok(())
    }
}

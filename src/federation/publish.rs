//! Publish hooks
//!
//! Bridges the publishing site's content lifecycle into federation:
//! builds addressing from visibility and mentions, wraps content in the
//! right envelope, computes remote delivery targets, and enqueues.

use std::sync::Arc;

use chrono::Utc;

use crate::actors::ActorStore;
use crate::config::FederationConfig;
use crate::content::{self, LocalContent};
use crate::error::Result;
use crate::follow::{handle_and_domain, FollowGraph, FollowStatus, Following, FollowingStatus};
use crate::interactions::{InteractionKind, InteractionStore, OutgoingInteraction};
use crate::model::ActivityKind;
use crate::text;

use super::builder;
use super::delivery::DeliveryQueue;

pub struct Publisher {
    config: Arc<FederationConfig>,
    actors: Arc<ActorStore>,
    follows: Arc<FollowGraph>,
    interactions: Arc<InteractionStore>,
    queue: Arc<DeliveryQueue>,
}

impl Publisher {
    pub fn new(
        config: Arc<FederationConfig>,
        actors: Arc<ActorStore>,
        follows: Arc<FollowGraph>,
        interactions: Arc<InteractionStore>,
        queue: Arc<DeliveryQueue>,
    ) -> Self {
        Self {
            config,
            actors,
            follows,
            interactions,
            queue,
        }
    }

    /// Accepted followers plus mentioned remote actors, remote hosts only
    ///
    /// Local fan-out is a no-op, so local URIs never become recipients.
    async fn delivery_targets(
        &self,
        author_handle: &str,
        mention_hrefs: &[String],
    ) -> Result<Vec<String>> {
        let mut targets = self
            .follows
            .follower_uris(author_handle, FollowStatus::Accepted)
            .await?;
        for href in mention_hrefs {
            if !targets.contains(href) {
                targets.push(href.clone());
            }
        }
        targets.retain(|uri| !self.config.is_local_uri(uri));
        Ok(targets)
    }

    /// Federate new content as a Create
    ///
    /// Returns the queued task id, or None when the content is gated off
    /// federation or no remote target remains.
    pub async fn publish(&self, local: &LocalContent) -> Result<Option<String>> {
        self.publish_with(local, false).await
    }

    /// Federate edited content as an Update
    pub async fn publish_update(&self, local: &LocalContent) -> Result<Option<String>> {
        self.publish_with(local, true).await
    }

    async fn publish_with(&self, local: &LocalContent, is_update: bool) -> Result<Option<String>> {
        if !content::should_federate(local, &self.config) {
            tracing::debug!(slug = %local.slug, "Content is not federated");
            return Ok(None);
        }

        let actor_uri = self.config.actor_uri(&local.author_handle);
        let object = content::to_object(&self.config, local);
        let activity = if is_update {
            builder::update(&self.config, &actor_uri, &object, &local.slug)
        } else {
            builder::create(&self.config, &actor_uri, &object, &local.slug)
        };

        let body = local.content.clone().unwrap_or_default();
        let mention_hrefs: Vec<String> = text::parse_mentions(&body)
            .iter()
            .map(|m| m.href(&self.config))
            .collect();
        let targets = self
            .delivery_targets(&local.author_handle, &mention_hrefs)
            .await?;
        if targets.is_empty() {
            tracing::debug!(slug = %local.slug, "No remote delivery targets");
            return Ok(None);
        }

        self.queue
            .enqueue(
                activity.to_value(),
                targets,
                Some(local.author_handle.clone()),
            )
            .await
    }

    /// Federate content removal as a Delete with a Tombstone
    pub async fn publish_delete(&self, local: &LocalContent) -> Result<Option<String>> {
        let actor_uri = self.config.actor_uri(&local.author_handle);
        let followers_uri = self.config.followers_uri(&local.author_handle);
        let activity = builder::delete(
            &self.config,
            &actor_uri,
            &followers_uri,
            &content::object_id(&self.config, local),
            content::as_type_for(&local.kind),
            &local.slug,
        );

        let targets = self.delivery_targets(&local.author_handle, &[]).await?;
        if targets.is_empty() {
            return Ok(None);
        }
        self.queue
            .enqueue(
                activity.to_value(),
                targets,
                Some(local.author_handle.clone()),
            )
            .await
    }

    /// Shared-inbox fallback for a URL-addressable object: `{origin}/inbox`
    fn origin_inbox(url: &str) -> Option<String> {
        let parsed = url::Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        match parsed.port() {
            Some(port) => Some(format!("{}://{}:{}/inbox", parsed.scheme(), host, port)),
            None => Some(format!("{}://{}/inbox", parsed.scheme(), host)),
        }
    }

    /// Boost a URL: Announce to followers plus the content's origin
    ///
    /// Returns the Announce activity id and the queued task id (None when
    /// nothing was queued).
    pub async fn announce(
        &self,
        handle: &str,
        content_url: &str,
        remote_author_uri: Option<&str>,
    ) -> Result<(String, Option<String>)> {
        let actor_uri = self.config.actor_uri(handle);
        let followers_uri = self.config.followers_uri(handle);
        let activity = builder::announce(&self.config, &actor_uri, &followers_uri, content_url);

        let mut targets = self.delivery_targets(handle, &[]).await?;
        match remote_author_uri {
            Some(author) if !self.config.is_local_uri(author) => {
                if !targets.contains(&author.to_string()) {
                    targets.push(author.to_string());
                }
            }
            _ => {
                if !self.config.is_local_uri(content_url) {
                    if let Some(inbox) = Self::origin_inbox(content_url) {
                        targets.push(inbox);
                    }
                }
            }
        }

        self.interactions
            .insert_outgoing(
                InteractionKind::Announce,
                handle,
                OutgoingInteraction {
                    activity_id: activity.id.clone(),
                    object_uri: content_url.to_string(),
                    at: Utc::now(),
                },
            )
            .await?;

        let task = self
            .queue
            .enqueue(activity.to_value(), targets, Some(handle.to_string()))
            .await?;
        Ok((activity.id, task))
    }

    /// Like a remote object
    pub async fn like(
        &self,
        handle: &str,
        object_uri: &str,
        remote_author_uri: Option<&str>,
    ) -> Result<(String, Option<String>)> {
        let actor_uri = self.config.actor_uri(handle);
        let followers_uri = self.config.followers_uri(handle);
        let activity = builder::like(&self.config, &actor_uri, &followers_uri, object_uri);

        let mut targets = Vec::new();
        match remote_author_uri {
            Some(author) if !self.config.is_local_uri(author) => {
                targets.push(author.to_string());
            }
            _ => {
                if !self.config.is_local_uri(object_uri) {
                    if let Some(inbox) = Self::origin_inbox(object_uri) {
                        targets.push(inbox);
                    }
                }
            }
        }

        self.interactions
            .insert_outgoing(
                InteractionKind::Like,
                handle,
                OutgoingInteraction {
                    activity_id: activity.id.clone(),
                    object_uri: object_uri.to_string(),
                    at: Utc::now(),
                },
            )
            .await?;

        let task = self
            .queue
            .enqueue(activity.to_value(), targets, Some(handle.to_string()))
            .await?;
        Ok((activity.id, task))
    }

    /// Undo a previously sent Like
    pub async fn undo_like(&self, handle: &str, object_uri: &str) -> Result<Option<String>> {
        let Some(original) = self
            .interactions
            .find_outgoing(InteractionKind::Like, handle, object_uri)
            .await?
        else {
            return Ok(None);
        };

        let actor_uri = self.config.actor_uri(handle);
        let followers_uri = self.config.followers_uri(handle);
        let activity = builder::undo(
            &self.config,
            &actor_uri,
            &original.activity_id,
            ActivityKind::Like,
            serde_json::Value::String(object_uri.to_string()),
            vec![crate::config::PUBLIC_SENTINEL.to_string()],
            vec![followers_uri],
        );

        let mut targets = Vec::new();
        if !self.config.is_local_uri(object_uri) {
            if let Some(inbox) = Self::origin_inbox(object_uri) {
                targets.push(inbox);
            }
        }

        self.interactions
            .remove_outgoing(InteractionKind::Like, handle, &original.activity_id)
            .await?;
        self.queue
            .enqueue(activity.to_value(), targets, Some(handle.to_string()))
            .await
    }

    /// Follow a remote actor, recording the outgoing Follow as pending
    pub async fn follow(&self, handle: &str, remote_actor_uri: &str) -> Result<Option<String>> {
        // The sender must exist so deliveries can be signed
        if self.actors.get(handle).await?.is_none() {
            return Err(crate::error::FederationError::NotFound);
        }

        let actor_uri = self.config.actor_uri(handle);
        let activity = builder::follow(&self.config, &actor_uri, remote_actor_uri);

        let (remote_handle, remote_domain) = handle_and_domain(remote_actor_uri);
        self.follows
            .insert_following(
                handle,
                Following {
                    actor_uri: remote_actor_uri.to_string(),
                    handle: remote_handle,
                    domain: remote_domain,
                    display_name: None,
                    avatar_url: None,
                    followed_at: Utc::now(),
                    status: FollowingStatus::Pending,
                    follow_activity_id: Some(activity.id.clone()),
                },
            )
            .await?;

        self.queue
            .enqueue(
                activity.to_value(),
                vec![remote_actor_uri.to_string()],
                Some(handle.to_string()),
            )
            .await
    }
}

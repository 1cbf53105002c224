//! Activity construction
//!
//! Wraps objects in the envelope each operation needs. Addressing on
//! Create/Update mirrors the object; Delete, Like, and Announce go to the
//! public collection cc the actor's followers.

use chrono::Utc;
use serde_json::Value;

use crate::config::{FederationConfig, PUBLIC_SENTINEL};
use crate::content;
use crate::model::{streams_context, Activity, ActivityKind, ApObject};

/// Activity id for one-shot envelopes with no content slug
fn ephemeral_id(config: &FederationConfig, kind: ActivityKind) -> String {
    format!(
        "{}/ap/activities/{}/{}",
        config.base_url(),
        kind.as_str().to_lowercase(),
        ulid::Ulid::new().to_string().to_lowercase()
    )
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Wrap an object in a Create
///
/// `to`/`cc` are mirrored from the object; `published` is the object's
/// publication time, defaulting to now.
pub fn create(config: &FederationConfig, actor_uri: &str, object: &ApObject, slug: &str) -> Activity {
    Activity {
        context: Some(streams_context()),
        id: content::activity_id(config, "Create", slug),
        kind: ActivityKind::Create,
        actor: actor_uri.to_string(),
        object: Some(object.to_value()),
        published: Some(object.published.clone().unwrap_or_else(now_rfc3339)),
        to: object.to.clone(),
        cc: object.cc.clone(),
        bto: Vec::new(),
        bcc: Vec::new(),
    }
}

/// Wrap an edited object in an Update
///
/// `published` is the update time, falling back to the original
/// publication time.
pub fn update(config: &FederationConfig, actor_uri: &str, object: &ApObject, slug: &str) -> Activity {
    Activity {
        context: Some(streams_context()),
        id: content::activity_id(config, "Update", slug),
        kind: ActivityKind::Update,
        actor: actor_uri.to_string(),
        object: Some(object.to_value()),
        published: Some(
            object
                .updated
                .clone()
                .or_else(|| object.published.clone())
                .unwrap_or_else(now_rfc3339),
        ),
        to: object.to.clone(),
        cc: object.cc.clone(),
        bto: Vec::new(),
        bcc: Vec::new(),
    }
}

/// A Delete carrying a Tombstone for the removed object
pub fn delete(
    config: &FederationConfig,
    actor_uri: &str,
    followers_uri: &str,
    object_id: &str,
    former_type: &str,
    slug: &str,
) -> Activity {
    let tombstone = ApObject::tombstone(
        object_id.to_string(),
        former_type.to_string(),
        now_rfc3339(),
    );
    Activity {
        context: Some(streams_context()),
        id: content::activity_id(config, "Delete", slug),
        kind: ActivityKind::Delete,
        actor: actor_uri.to_string(),
        object: Some(tombstone.to_value()),
        published: Some(now_rfc3339()),
        to: vec![PUBLIC_SENTINEL.to_string()],
        cc: vec![followers_uri.to_string()],
        bto: Vec::new(),
        bcc: Vec::new(),
    }
}

/// Follow a remote actor
pub fn follow(config: &FederationConfig, actor_uri: &str, remote_actor_uri: &str) -> Activity {
    Activity {
        context: Some(streams_context()),
        id: ephemeral_id(config, ActivityKind::Follow),
        kind: ActivityKind::Follow,
        actor: actor_uri.to_string(),
        object: Some(Value::String(remote_actor_uri.to_string())),
        published: Some(now_rfc3339()),
        to: Vec::new(),
        cc: Vec::new(),
        bto: Vec::new(),
        bcc: Vec::new(),
    }
}

/// Like a remote object
pub fn like(
    config: &FederationConfig,
    actor_uri: &str,
    followers_uri: &str,
    object_uri: &str,
) -> Activity {
    Activity {
        context: Some(streams_context()),
        id: ephemeral_id(config, ActivityKind::Like),
        kind: ActivityKind::Like,
        actor: actor_uri.to_string(),
        object: Some(Value::String(object_uri.to_string())),
        published: Some(now_rfc3339()),
        to: vec![PUBLIC_SENTINEL.to_string()],
        cc: vec![followers_uri.to_string()],
        bto: Vec::new(),
        bcc: Vec::new(),
    }
}

/// Boost a remote object
pub fn announce(
    config: &FederationConfig,
    actor_uri: &str,
    followers_uri: &str,
    object_uri: &str,
) -> Activity {
    Activity {
        context: Some(streams_context()),
        id: ephemeral_id(config, ActivityKind::Announce),
        kind: ActivityKind::Announce,
        actor: actor_uri.to_string(),
        object: Some(Value::String(object_uri.to_string())),
        published: Some(now_rfc3339()),
        to: vec![PUBLIC_SENTINEL.to_string()],
        cc: vec![followers_uri.to_string()],
        bto: Vec::new(),
        bcc: Vec::new(),
    }
}

/// Undo a previously sent activity
///
/// The original is embedded as `{id, type, actor, object}`; addressing
/// mirrors the original so the Undo reaches the same audience.
pub fn undo(
    config: &FederationConfig,
    actor_uri: &str,
    original_id: &str,
    original_kind: ActivityKind,
    original_object: Value,
    to: Vec<String>,
    cc: Vec<String>,
) -> Activity {
    Activity {
        context: Some(streams_context()),
        id: ephemeral_id(config, ActivityKind::Undo),
        kind: ActivityKind::Undo,
        actor: actor_uri.to_string(),
        object: Some(serde_json::json!({
            "id": original_id,
            "type": original_kind.as_str(),
            "actor": actor_uri,
            "object": original_object,
        })),
        published: Some(now_rfc3339()),
        to,
        cc,
        bto: Vec::new(),
        bcc: Vec::new(),
    }
}

/// Accept a follow request, echoing the received Follow
pub fn accept(
    config: &FederationConfig,
    local_actor_uri: &str,
    follow_activity: Value,
    follower_uri: &str,
) -> Activity {
    Activity {
        context: Some(streams_context()),
        id: ephemeral_id(config, ActivityKind::Accept),
        kind: ActivityKind::Accept,
        actor: local_actor_uri.to_string(),
        object: Some(follow_activity),
        published: Some(now_rfc3339()),
        to: vec![follower_uri.to_string()],
        cc: Vec::new(),
        bto: Vec::new(),
        bcc: Vec::new(),
    }
}

/// Reject a follow request
pub fn reject(
    config: &FederationConfig,
    local_actor_uri: &str,
    follow_activity: Value,
    follower_uri: &str,
) -> Activity {
    Activity {
        context: Some(streams_context()),
        id: ephemeral_id(config, ActivityKind::Reject),
        kind: ActivityKind::Reject,
        actor: local_actor_uri.to_string(),
        object: Some(follow_activity),
        published: Some(now_rfc3339()),
        to: vec![follower_uri.to_string()],
        cc: Vec::new(),
        bto: Vec::new(),
        bcc: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PUBLIC_SENTINEL;
    use crate::content::{Frontmatter, LocalContent};
    use crate::model::ACTIVITYSTREAMS_NS;
    use std::path::PathBuf;

    fn test_config() -> FederationConfig {
        FederationConfig::for_base_url("https://example.com", PathBuf::from(".ap"))
    }

    #[test]
    fn create_wraps_an_article() {
        let config = test_config();
        let local = LocalContent {
            slug: "test-post".to_string(),
            kind: "blog".to_string(),
            content: Some("Hello".to_string()),
            visibility: Some("public".to_string()),
            published_at: Some("2024-01-01T00:00:00Z".to_string()),
            author_handle: "alice".to_string(),
            frontmatter: Frontmatter {
                title: Some("Test Post".to_string()),
                excerpt: Some("A test".to_string()),
                tags: vec!["t1".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        let object = crate::content::to_object(&config, &local);
        let activity = create(&config, &config.actor_uri("alice"), &object, &local.slug);

        assert_eq!(activity.kind, ActivityKind::Create);
        assert_eq!(activity.actor, "https://example.com/@alice");
        assert_eq!(activity.published.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(activity.to, vec![PUBLIC_SENTINEL.to_string()]);
        assert_eq!(
            activity.cc,
            vec!["https://example.com/@alice/followers".to_string()]
        );

        let value = activity.to_value();
        assert_eq!(value["@context"], ACTIVITYSTREAMS_NS);
        assert_eq!(value["type"], "Create");
        assert_eq!(value["object"]["type"], "Article");
        assert_eq!(value["object"]["name"], "Test Post");
        assert_eq!(
            value["object"]["id"],
            "https://example.com/ap/content/blog/test-post"
        );
        assert!(value["id"]
            .as_str()
            .unwrap()
            .starts_with("https://example.com/ap/activities/create/test-post-"));
    }

    #[test]
    fn update_prefers_the_update_time() {
        let config = test_config();
        let object = ApObject {
            id: Some("https://example.com/ap/content/blog/post".to_string()),
            kind: Some("Article".to_string()),
            published: Some("2024-01-01T00:00:00Z".to_string()),
            updated: Some("2024-02-01T00:00:00Z".to_string()),
            to: vec![PUBLIC_SENTINEL.to_string()],
            ..Default::default()
        };
        let activity = update(&config, "https://example.com/@alice", &object, "post");
        assert_eq!(activity.kind, ActivityKind::Update);
        assert_eq!(activity.published.as_deref(), Some("2024-02-01T00:00:00Z"));
    }

    #[test]
    fn delete_carries_a_tombstone_to_public() {
        let config = test_config();
        let activity = delete(
            &config,
            "https://example.com/@alice",
            "https://example.com/@alice/followers",
            "https://example.com/ap/content/blog/post",
            "Article",
            "post",
        );
        let value = activity.to_value();
        assert_eq!(value["type"], "Delete");
        assert_eq!(value["object"]["type"], "Tombstone");
        assert_eq!(value["object"]["formerType"], "Article");
        assert_eq!(
            value["object"]["id"],
            "https://example.com/ap/content/blog/post"
        );
        assert_eq!(activity.to, vec![PUBLIC_SENTINEL.to_string()]);
        assert_eq!(
            activity.cc,
            vec!["https://example.com/@alice/followers".to_string()]
        );
    }

    #[test]
    fn like_and_announce_address_public_and_followers() {
        let config = test_config();
        for activity in [
            like(
                &config,
                "https://example.com/@alice",
                "https://example.com/@alice/followers",
                "https://mastodon.social/@bob/1",
            ),
            announce(
                &config,
                "https://example.com/@alice",
                "https://example.com/@alice/followers",
                "https://mastodon.social/@bob/1",
            ),
        ] {
            assert_eq!(activity.to, vec![PUBLIC_SENTINEL.to_string()]);
            assert_eq!(
                activity.cc,
                vec!["https://example.com/@alice/followers".to_string()]
            );
            assert_eq!(
                activity.object,
                Some(Value::String("https://mastodon.social/@bob/1".to_string()))
            );
        }
    }

    #[test]
    fn undo_embeds_the_original() {
        let config = test_config();
        let activity = undo(
            &config,
            "https://example.com/@alice",
            "https://example.com/ap/activities/like/01abc",
            ActivityKind::Like,
            Value::String("https://mastodon.social/@bob/1".to_string()),
            vec![PUBLIC_SENTINEL.to_string()],
            vec!["https://example.com/@alice/followers".to_string()],
        );
        let value = activity.to_value();
        assert_eq!(value["type"], "Undo");
        assert_eq!(
            value["object"]["id"],
            "https://example.com/ap/activities/like/01abc"
        );
        assert_eq!(value["object"]["type"], "Like");
        assert_eq!(value["object"]["actor"], "https://example.com/@alice");
    }

    #[test]
    fn accept_echoes_the_follow_to_its_sender() {
        let config = test_config();
        let follow_activity = serde_json::json!({
            "id": "https://mastodon.social/activities/1",
            "type": "Follow",
            "actor": "https://mastodon.social/@bob",
            "object": "https://example.com/@alice"
        });
        let activity = accept(
            &config,
            "https://example.com/@alice",
            follow_activity.clone(),
            "https://mastodon.social/@bob",
        );
        assert_eq!(activity.kind, ActivityKind::Accept);
        assert_eq!(activity.object, Some(follow_activity));
        assert_eq!(
            activity.to,
            vec!["https://mastodon.social/@bob".to_string()]
        );
    }
}

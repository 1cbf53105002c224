//! E2E tests for ActivityPub endpoints: actor documents, collections,
//! and inbox delivery with HTTP signature verification

mod common;

use chrono::Utc;
use common::TestServer;
use fedpress::actors::{generate_keypair, ActorProfile, GroupProfile};
use fedpress::federation::{sign_request, CachedKey};
use fedpress::follow::FollowStatus;
use fedpress::notify::NotificationKind;
use serde_json::json;

/// A remote actor with a primed key, ready to send signed requests
struct RemoteSigner {
    actor_uri: String,
    key_id: String,
    private_key_pem: String,
}

impl RemoteSigner {
    async fn prime(server: &TestServer, actor_uri: &str) -> Self {
        let (private_key_pem, public_key_pem) = generate_keypair().unwrap();
        let key_id = format!("{}#main-key", actor_uri);
        server
            .runtime
            .key_cache
            .insert(CachedKey {
                id: key_id.clone(),
                owner: actor_uri.to_string(),
                public_key_pem,
                cached_at: Utc::now(),
                ttl_secs: 3600,
            })
            .await
            .unwrap();
        Self {
            actor_uri: actor_uri.to_string(),
            key_id,
            private_key_pem,
        }
    }

    async fn post_signed(
        &self,
        server: &TestServer,
        path: &str,
        body: &serde_json::Value,
    ) -> reqwest::Response {
        let url = server.url(path);
        let bytes = serde_json::to_vec(body).unwrap();
        let signed = sign_request(
            "POST",
            &url,
            Some(&bytes),
            &self.private_key_pem,
            &self.key_id,
            None,
        )
        .unwrap();

        let mut request = server
            .client
            .post(&url)
            .header("Content-Type", "application/activity+json")
            .header("Date", signed.date)
            .header("Signature", signed.signature);
        if let Some(digest) = signed.digest {
            request = request.header("Digest", digest);
        }
        request.body(bytes).send().await.unwrap()
    }
}

#[tokio::test]
async fn actor_document_is_served_as_activity_json() {
    let server = TestServer::new().await;
    server
        .runtime
        .actors
        .get_or_create(
            "alice",
            &ActorProfile {
                display_name: Some("Alice".to_string()),
                discoverable: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let response = server
        .client
        .get(server.url("/@alice"))
        .header("Accept", "application/activity+json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .contains("application/activity+json"));

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["id"], "https://test.example.com/@alice");
    assert_eq!(body["type"], "Person");
    assert_eq!(body["preferredUsername"], "alice");
    assert_eq!(body["inbox"], "https://test.example.com/@alice/inbox");
    assert_eq!(body["publicKey"]["owner"], "https://test.example.com/@alice");
    assert_eq!(
        body["publicKey"]["id"],
        "https://test.example.com/@alice#main-key"
    );
    // The context carries both required namespaces
    let context = body["@context"].as_array().unwrap();
    assert_eq!(context[0], "https://www.w3.org/ns/activitystreams");
    assert_eq!(context[1], "https://w3id.org/security/v1");
    // Private material never leaves the instance
    assert!(!serde_json::to_string(&body).unwrap().contains("PRIVATE KEY"));

    let missing = server
        .client
        .get(server.url("/@ghost"))
        .header("Accept", "application/activity+json")
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn group_document_carries_lemmy_extensions() {
    let server = TestServer::new().await;
    server
        .runtime
        .actors
        .get_or_create_group(
            "books",
            &GroupProfile {
                display_name: Some("Books".to_string()),
                moderator_handles: vec!["alice".to_string()],
                posting_restricted_to_mods: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let body: serde_json::Value = server
        .client
        .get(server.url("/c/books"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["id"], "https://test.example.com/c/books");
    assert_eq!(body["type"], "Group");
    assert_eq!(body["postingRestrictedToMods"], true);
    assert_eq!(body["moderators"][0], "https://test.example.com/@alice");
}

#[tokio::test]
async fn unsigned_inbox_post_is_unauthorized() {
    let server = TestServer::new().await;
    server
        .runtime
        .actors
        .get_or_create("alice", &ActorProfile::default())
        .await
        .unwrap();

    let response = server
        .client
        .post(server.url("/@alice/inbox"))
        .header("Content-Type", "application/activity+json")
        .body(
            serde_json::to_vec(&json!({
                "id": "https://mastodon.social/activities/1",
                "type": "Follow",
                "actor": "https://mastodon.social/@bob",
                "object": "https://test.example.com/@alice"
            }))
            .unwrap(),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn signed_follow_is_accepted_and_recorded() {
    let server = TestServer::new().await;
    server
        .runtime
        .actors
        .get_or_create("alice", &ActorProfile::default())
        .await
        .unwrap();
    let bob = RemoteSigner::prime(&server, "https://mastodon.social/@bob").await;

    let follow = json!({
        "id": "https://mastodon.social/activities/follow-1",
        "type": "Follow",
        "actor": bob.actor_uri.clone(),
        "object": "https://test.example.com/@alice"
    });
    let response = bob.post_signed(&server, "/@alice/inbox", &follow).await;
    assert_eq!(response.status(), 202);

    let followers = server.runtime.follows.followers("alice").await.unwrap();
    assert_eq!(followers.len(), 1);
    assert_eq!(followers[0].actor_uri, "https://mastodon.social/@bob");
    assert_eq!(followers[0].status, FollowStatus::Pending);

    let notifications = server.runtime.notifications.list("alice").await.unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::Follow);
}

#[tokio::test]
async fn auto_approve_queues_an_accept() {
    let server = TestServer::with_config(|c| c.federation.auto_approve_follows = true).await;
    server
        .runtime
        .actors
        .get_or_create("alice", &ActorProfile::default())
        .await
        .unwrap();
    let bob = RemoteSigner::prime(&server, "https://mastodon.social/@bob").await;

    let follow = json!({
        "id": "https://mastodon.social/activities/follow-1",
        "type": "Follow",
        "actor": bob.actor_uri.clone(),
        "object": "https://test.example.com/@alice"
    });
    let response = bob.post_signed(&server, "/@alice/inbox", &follow).await;
    assert_eq!(response.status(), 202);

    let followers = server.runtime.follows.followers("alice").await.unwrap();
    assert_eq!(followers[0].status, FollowStatus::Accepted);

    let tasks = server.runtime.queue.tasks().await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].activity["type"], "Accept");
    assert_eq!(tasks[0].activity["object"], follow);
    assert_eq!(tasks[0].recipients[0].uri, "https://mastodon.social/@bob");
}

#[tokio::test]
async fn tampered_body_is_forbidden() {
    let server = TestServer::new().await;
    server
        .runtime
        .actors
        .get_or_create("alice", &ActorProfile::default())
        .await
        .unwrap();
    let bob = RemoteSigner::prime(&server, "https://mastodon.social/@bob").await;

    let follow = json!({
        "id": "https://mastodon.social/activities/follow-1",
        "type": "Follow",
        "actor": bob.actor_uri.clone(),
        "object": "https://test.example.com/@alice"
    });

    // Sign one body, send another
    let url = server.url("/@alice/inbox");
    let signed_bytes = serde_json::to_vec(&follow).unwrap();
    let signed = sign_request(
        "POST",
        &url,
        Some(&signed_bytes),
        &bob.private_key_pem,
        &bob.key_id,
        None,
    )
    .unwrap();

    let tampered = json!({
        "id": "https://mastodon.social/activities/follow-1",
        "type": "Follow",
        "actor": bob.actor_uri.clone(),
        "object": "https://test.example.com/@someone-else"
    });
    let response = server
        .client
        .post(&url)
        .header("Content-Type", "application/activity+json")
        .header("Date", signed.date)
        .header("Signature", signed.signature)
        .header("Digest", signed.digest.unwrap())
        .body(serde_json::to_vec(&tampered).unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
    assert!(server.runtime.follows.followers("alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn signature_key_must_match_the_activity_actor() {
    let server = TestServer::new().await;
    server
        .runtime
        .actors
        .get_or_create("alice", &ActorProfile::default())
        .await
        .unwrap();
    let bob = RemoteSigner::prime(&server, "https://mastodon.social/@bob").await;

    // Bob's key signing an activity claiming to be from mallory
    let forged = json!({
        "id": "https://mastodon.social/activities/follow-2",
        "type": "Follow",
        "actor": "https://mastodon.social/@mallory",
        "object": "https://test.example.com/@alice"
    });
    let response = bob.post_signed(&server, "/@alice/inbox", &forged).await;
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn malformed_envelope_is_bad_request() {
    let server =
        TestServer::with_config(|c| c.federation.signature_verification_enabled = false).await;
    server
        .runtime
        .actors
        .get_or_create("alice", &ActorProfile::default())
        .await
        .unwrap();

    // Missing id
    let response = server
        .client
        .post(server.url("/@alice/inbox"))
        .header("Content-Type", "application/activity+json")
        .body(
            serde_json::to_vec(&json!({
                "type": "Follow",
                "actor": "https://mastodon.social/@bob",
                "object": "https://test.example.com/@alice"
            }))
            .unwrap(),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // Not JSON at all
    let response = server
        .client
        .post(server.url("/@alice/inbox"))
        .header("Content-Type", "application/activity+json")
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn shared_inbox_routes_by_target() {
    let server =
        TestServer::with_config(|c| c.federation.signature_verification_enabled = false).await;
    server
        .runtime
        .actors
        .get_or_create("alice", &ActorProfile::default())
        .await
        .unwrap();

    let response = server
        .client
        .post(server.url("/inbox"))
        .header("Content-Type", "application/activity+json")
        .body(
            serde_json::to_vec(&json!({
                "id": "https://mastodon.social/activities/follow-1",
                "type": "Follow",
                "actor": "https://mastodon.social/@bob",
                "object": "https://test.example.com/@alice"
            }))
            .unwrap(),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);
    assert_eq!(
        server.runtime.follows.followers("alice").await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn unknown_activity_types_are_accepted_and_ignored() {
    let server =
        TestServer::with_config(|c| c.federation.signature_verification_enabled = false).await;
    server
        .runtime
        .actors
        .get_or_create("alice", &ActorProfile::default())
        .await
        .unwrap();

    let response = server
        .client
        .post(server.url("/@alice/inbox"))
        .header("Content-Type", "application/activity+json")
        .body(
            serde_json::to_vec(&json!({
                "id": "https://mastodon.social/activities/odd-1",
                "type": "Arrive",
                "actor": "https://mastodon.social/@bob"
            }))
            .unwrap(),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);
}

#[tokio::test]
async fn follower_collection_reports_accepted_followers() {
    let server =
        TestServer::with_config(|c| c.federation.signature_verification_enabled = false).await;
    server
        .runtime
        .actors
        .get_or_create("alice", &ActorProfile::default())
        .await
        .unwrap();

    // Follow then accept
    server
        .client
        .post(server.url("/@alice/inbox"))
        .header("Content-Type", "application/activity+json")
        .body(
            serde_json::to_vec(&json!({
                "id": "https://mastodon.social/activities/follow-1",
                "type": "Follow",
                "actor": "https://mastodon.social/@bob",
                "object": "https://test.example.com/@alice"
            }))
            .unwrap(),
        )
        .send()
        .await
        .unwrap();
    server
        .runtime
        .follows
        .accept_follow_request("alice", "https://mastodon.social/@bob")
        .await
        .unwrap();

    let collection: serde_json::Value = server
        .client
        .get(server.url("/@alice/followers"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(collection["type"], "OrderedCollection");
    assert_eq!(collection["id"], "https://test.example.com/@alice/followers");
    assert_eq!(collection["totalItems"], 1);
    assert_eq!(
        collection["orderedItems"][0],
        "https://mastodon.social/@bob"
    );

    let outbox: serde_json::Value = server
        .client
        .get(server.url("/@alice/outbox"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(outbox["type"], "OrderedCollection");
    assert_eq!(outbox["totalItems"], 0);
}

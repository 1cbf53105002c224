//! ActivityPub endpoints
//!
//! - Actor and group documents
//! - Per-actor and shared inboxes
//! - Followers/following/outbox/liked/featured collections

use axum::body::Bytes;
use axum::extract::{OriginalUri, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde_json::Value;

use crate::error::{FederationError, Result};
use crate::federation::key_id_matches_actor;
use crate::follow::FollowStatus;
use crate::interactions::InteractionKind;
use crate::model::{Envelope, OrderedCollection};
use crate::FederationRuntime;

pub fn activitypub_router() -> Router<FederationRuntime> {
    Router::new()
        .route("/inbox", post(shared_inbox))
        .route("/c/:handle", get(group_document))
        .route("/:segment", get(actor_document))
        .route("/:segment/inbox", post(actor_inbox).get(inbox_collection))
        .route("/:segment/outbox", get(outbox))
        .route("/:segment/followers", get(followers))
        .route("/:segment/following", get(following))
        .route("/:segment/liked", get(liked))
        .route("/:segment/featured", get(featured))
}

const ACTIVITY_JSON: &str = "application/activity+json";

/// Actor routes are `/@{handle}`; the parameter carries the sigil
fn handle_from_segment(segment: &str) -> Result<&str> {
    segment.strip_prefix('@').ok_or(FederationError::NotFound)
}

fn accepts_activity_json(headers: &HeaderMap) -> bool {
    headers
        .get("accept")
        .and_then(|value| value.to_str().ok())
        .map(|accept| {
            accept.contains("activity+json")
                || accept.contains("ld+json")
                || accept.contains("application/json")
                || accept.contains("*/*")
        })
        .unwrap_or(true)
}

fn activity_json_response(value: Value) -> impl axum::response::IntoResponse {
    ([("Content-Type", ACTIVITY_JSON)], Json(value))
}

/// GET /@{handle}
///
/// HTML profile requests belong to the site's UI layer; this endpoint
/// only speaks ActivityPub.
async fn actor_document(
    State(runtime): State<FederationRuntime>,
    Path(segment): Path<String>,
    headers: HeaderMap,
) -> Result<impl axum::response::IntoResponse> {
    let handle = handle_from_segment(&segment)?;
    if !accepts_activity_json(&headers) {
        return Err(FederationError::NotFound);
    }
    let actor = runtime
        .actors
        .get(handle)
        .await?
        .ok_or(FederationError::NotFound)?;
    let document = runtime.actors.document(&actor);
    Ok(activity_json_response(serde_json::to_value(document).map_err(
        |e| FederationError::Federation(format!("serialize actor: {}", e)),
    )?))
}

/// GET /c/{handle}
async fn group_document(
    State(runtime): State<FederationRuntime>,
    Path(handle): Path<String>,
) -> Result<impl axum::response::IntoResponse> {
    let group = runtime
        .actors
        .get_group(&handle)
        .await?
        .ok_or(FederationError::NotFound)?;
    let document = runtime.actors.group_document(&group);
    Ok(activity_json_response(serde_json::to_value(document).map_err(
        |e| FederationError::Federation(format!("serialize group: {}", e)),
    )?))
}

/// Verify the request, parse the envelope, and dispatch it
///
/// 401 when the Signature header is absent, 403 when verification fails,
/// 400 on a malformed envelope, 202 once dispatched.
async fn receive(
    runtime: &FederationRuntime,
    handle: Option<&str>,
    original_uri: &OriginalUri,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<StatusCode> {
    let path_and_query = original_uri
        .0
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| original_uri.0.path().to_string());

    let verified_actor = runtime
        .verifier()
        .verify_request("post", &path_and_query, headers, Some(body))
        .await?;

    let raw: Value = serde_json::from_slice(body)
        .map_err(|e| FederationError::BadRequest(format!("invalid JSON body: {}", e)))?;
    let envelope = Envelope::parse(&raw)?;

    // The signing key must belong to the actor the envelope names
    if let Some(owner) = &verified_actor {
        if !key_id_matches_actor(owner, &envelope.actor)? {
            return Err(FederationError::SignatureVerification(
                "signature key does not belong to the activity actor".to_string(),
            ));
        }
    }

    let processor = runtime.inbox_processor();
    let target = match handle {
        Some(handle) => Some(handle.to_string()),
        None => processor.resolve_local_target(&envelope),
    };
    let Some(target) = target else {
        tracing::info!(activity = %envelope.id, "Shared inbox activity with no local target");
        return Ok(StatusCode::ACCEPTED);
    };

    if runtime.actors.get(&target).await?.is_none() {
        return Err(FederationError::NotFound);
    }

    processor.process(&target, &envelope).await?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /@{handle}/inbox
async fn actor_inbox(
    State(runtime): State<FederationRuntime>,
    Path(segment): Path<String>,
    original_uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode> {
    let handle = handle_from_segment(&segment)?;
    receive(&runtime, Some(handle), &original_uri, &headers, &body).await
}

/// POST /inbox — the shared inbox
async fn shared_inbox(
    State(runtime): State<FederationRuntime>,
    original_uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode> {
    receive(&runtime, None, &original_uri, &headers, &body).await
}

async fn require_actor(runtime: &FederationRuntime, handle: &str) -> Result<()> {
    runtime
        .actors
        .get(handle)
        .await?
        .map(|_| ())
        .ok_or(FederationError::NotFound)
}

/// GET /@{handle}/inbox
///
/// The inbox collection is advertised but never enumerated to peers.
async fn inbox_collection(
    State(runtime): State<FederationRuntime>,
    Path(segment): Path<String>,
) -> Result<Json<OrderedCollection>> {
    let handle = handle_from_segment(&segment)?;
    require_actor(&runtime, handle).await?;
    Ok(Json(OrderedCollection::new(
        runtime.config.inbox_uri(handle),
        0,
        None,
    )))
}

/// GET /@{handle}/outbox
///
/// The content store itself is external; the outbox advertises the
/// collection without enumerating it.
async fn outbox(
    State(runtime): State<FederationRuntime>,
    Path(segment): Path<String>,
) -> Result<Json<OrderedCollection>> {
    let handle = handle_from_segment(&segment)?;
    require_actor(&runtime, handle).await?;
    Ok(Json(OrderedCollection::new(
        runtime.config.outbox_uri(handle),
        0,
        Some(Vec::new()),
    )))
}

/// GET /@{handle}/followers
async fn followers(
    State(runtime): State<FederationRuntime>,
    Path(segment): Path<String>,
) -> Result<Json<OrderedCollection>> {
    let handle = handle_from_segment(&segment)?;
    require_actor(&runtime, handle).await?;
    let uris = runtime
        .follows
        .follower_uris(handle, FollowStatus::Accepted)
        .await?;
    let page_cap = runtime.config.pagination.max_page_size;
    let items: Vec<Value> = uris
        .iter()
        .take(page_cap)
        .map(|uri| Value::String(uri.clone()))
        .collect();
    Ok(Json(OrderedCollection::new(
        runtime.config.followers_uri(handle),
        uris.len(),
        Some(items),
    )))
}

/// GET /@{handle}/following
async fn following(
    State(runtime): State<FederationRuntime>,
    Path(segment): Path<String>,
) -> Result<Json<OrderedCollection>> {
    let handle = handle_from_segment(&segment)?;
    require_actor(&runtime, handle).await?;
    let rows = runtime.follows.following(handle).await?;
    let page_cap = runtime.config.pagination.max_page_size;
    let items: Vec<Value> = rows
        .iter()
        .take(page_cap)
        .map(|row| Value::String(row.actor_uri.clone()))
        .collect();
    Ok(Json(OrderedCollection::new(
        runtime.config.following_uri(handle),
        rows.len(),
        Some(items),
    )))
}

/// GET /@{handle}/liked
async fn liked(
    State(runtime): State<FederationRuntime>,
    Path(segment): Path<String>,
) -> Result<Json<OrderedCollection>> {
    let handle = handle_from_segment(&segment)?;
    require_actor(&runtime, handle).await?;
    let records = runtime
        .interactions
        .list_outgoing(InteractionKind::Like, handle)
        .await?;
    let items: Vec<Value> = records
        .iter()
        .map(|record| Value::String(record.object_uri.clone()))
        .collect();
    Ok(Json(OrderedCollection::new(
        runtime.config.liked_uri(handle),
        items.len(),
        Some(items),
    )))
}

/// GET /@{handle}/featured
async fn featured(
    State(runtime): State<FederationRuntime>,
    Path(segment): Path<String>,
) -> Result<Json<OrderedCollection>> {
    let handle = handle_from_segment(&segment)?;
    require_actor(&runtime, handle).await?;
    Ok(Json(OrderedCollection::new(
        runtime.config.featured_uri(handle),
        0,
        Some(Vec::new()),
    )))
}

//! Well-known endpoints
//!
//! - /.well-known/webfinger
//! - /.well-known/nodeinfo
//! - /.well-known/host-meta
//! - /nodeinfo/2.0, /nodeinfo/2.1

use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;

use crate::discovery;
use crate::error::FederationError;
use crate::FederationRuntime;

pub fn wellknown_router() -> Router<FederationRuntime> {
    Router::new()
        .route("/.well-known/webfinger", get(webfinger))
        .route("/.well-known/nodeinfo", get(nodeinfo_links))
        .route("/.well-known/host-meta", get(host_meta))
        .route("/nodeinfo/2.0", get(nodeinfo_20))
        .route("/nodeinfo/2.1", get(nodeinfo_21))
}

#[derive(Debug, Deserialize)]
struct WebFingerQuery {
    resource: String,
}

/// GET /.well-known/webfinger?resource=acct:user@domain
async fn webfinger(
    State(runtime): State<FederationRuntime>,
    Query(query): Query<WebFingerQuery>,
) -> Result<Json<discovery::WebFingerResponse>, FederationError> {
    let response = discovery::webfinger(
        &runtime.config,
        &runtime.actors,
        runtime.resolve_user.as_ref(),
        &query.resource,
    )
    .await?
    .ok_or(FederationError::NotFound)?;
    Ok(Json(response))
}

/// GET /.well-known/nodeinfo
async fn nodeinfo_links(State(runtime): State<FederationRuntime>) -> Json<serde_json::Value> {
    Json(discovery::nodeinfo_links(&runtime.config))
}

async fn nodeinfo_20(
    State(runtime): State<FederationRuntime>,
) -> Result<Json<serde_json::Value>, FederationError> {
    let stats = runtime.instance_stats().await?;
    Ok(Json(discovery::nodeinfo(&runtime.config, "2.0", &stats)))
}

async fn nodeinfo_21(
    State(runtime): State<FederationRuntime>,
) -> Result<Json<serde_json::Value>, FederationError> {
    let stats = runtime.instance_stats().await?;
    Ok(Json(discovery::nodeinfo(&runtime.config, "2.1", &stats)))
}

/// GET /.well-known/host-meta
///
/// XRD pointing remote WebFinger clients at our endpoint.
async fn host_meta(State(runtime): State<FederationRuntime>) -> impl axum::response::IntoResponse {
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<XRD xmlns="http://docs.oasis-open.org/ns/xri/xrd-1.0">
  <Link rel="lrdd" template="{}/.well-known/webfinger?resource={{uri}}"/>
</XRD>"#,
        runtime.config.base_url()
    );
    ([("Content-Type", "application/xrd+xml")], xml)
}

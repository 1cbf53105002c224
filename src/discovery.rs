//! WebFinger and NodeInfo discovery

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::actors::ActorStore;
use crate::config::FederationConfig;
use crate::error::Result;
use crate::UserResolver;

static HANDLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("invalid handle regex"));

/// WebFinger JRD response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebFingerResponse {
    pub subject: String,
    pub aliases: Vec<String>,
    pub links: Vec<WebFingerLink>,
}

/// WebFinger link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebFingerLink {
    pub rel: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

/// Instance statistics reported via NodeInfo
#[derive(Debug, Clone, Copy, Default)]
pub struct InstanceStats {
    pub users_total: usize,
    pub local_posts: u64,
    pub local_comments: u64,
}

/// Parse a WebFinger resource into a local handle
///
/// Accepts `acct:handle@domain` and `https://domain/@handle`; the domain
/// must be this instance's and the handle must be well-formed.
pub fn parse_resource(config: &FederationConfig, resource: &str) -> Option<String> {
    let resource = resource.trim();

    let handle = if let Some(acct) = resource.strip_prefix("acct:") {
        let (handle, domain) = acct.split_once('@')?;
        if domain != config.instance_domain() {
            return None;
        }
        handle.to_string()
    } else if resource.starts_with("https://") || resource.starts_with("http://") {
        config.local_handle_from_uri(resource)?
    } else {
        return None;
    };

    if !HANDLE_RE.is_match(&handle) {
        return None;
    }
    Some(handle)
}

/// Answer a WebFinger query
///
/// Returns None (mapped to 404 at the route boundary) when the resource
/// does not name an existing local user.
pub async fn webfinger(
    config: &FederationConfig,
    actors: &ActorStore,
    resolve_user: Option<&UserResolver>,
    resource: &str,
) -> Result<Option<WebFingerResponse>> {
    let Some(handle) = parse_resource(config, resource) else {
        return Ok(None);
    };

    let known_locally = actors.get(&handle).await?.is_some();
    let known_to_site = resolve_user.is_some_and(|resolver| resolver(&handle).is_some());
    if !known_locally && !known_to_site {
        return Ok(None);
    }

    let actor_uri = config.actor_uri(&handle);
    Ok(Some(WebFingerResponse {
        subject: config.webfinger_resource(&handle),
        aliases: vec![actor_uri.clone()],
        links: vec![
            WebFingerLink {
                rel: "self".to_string(),
                link_type: Some("application/activity+json".to_string()),
                href: Some(actor_uri.clone()),
                template: None,
            },
            WebFingerLink {
                rel: "http://webfinger.net/rel/profile-page".to_string(),
                link_type: Some("text/html".to_string()),
                href: Some(actor_uri),
                template: None,
            },
            WebFingerLink {
                rel: "http://ostatus.org/schema/1.0/subscribe".to_string(),
                link_type: None,
                href: None,
                template: Some(format!(
                    "{}/authorize_interaction?uri={{uri}}",
                    config.base_url()
                )),
            },
        ],
    }))
}

/// `/.well-known/nodeinfo`: links to the schema documents
pub fn nodeinfo_links(config: &FederationConfig) -> Value {
    let base = config.base_url();
    json!({
        "links": [
            {
                "rel": "http://nodeinfo.diaspora.software/ns/schema/2.0",
                "href": format!("{}/nodeinfo/2.0", base)
            },
            {
                "rel": "http://nodeinfo.diaspora.software/ns/schema/2.1",
                "href": format!("{}/nodeinfo/2.1", base)
            }
        ]
    })
}

/// A NodeInfo descriptor (schema 2.0 or 2.1)
pub fn nodeinfo(config: &FederationConfig, version: &str, stats: &InstanceStats) -> Value {
    json!({
        "version": version,
        "software": {
            "name": config.instance.software_name,
            "version": config.instance.software_version
        },
        "protocols": ["activitypub"],
        "services": {
            "inbound": [],
            "outbound": ["atom1.0", "rss2.0"]
        },
        "openRegistrations": false,
        "usage": {
            "users": {
                "total": stats.users_total,
                "activeHalfyear": null,
                "activeMonth": null
            },
            "localPosts": stats.local_posts,
            "localComments": stats.local_comments
        },
        "metadata": {
            "federation": {
                "enabled": config.federation.enabled,
                "allowList": null,
                "blockList": []
            },
            "features": [
                "activitypub",
                "webfinger",
                "http-signatures",
                "mastodon-api-compat"
            ],
            "contentTypes": ["Article", "Note", "Image", "Video", "Page", "Event"]
        }
    })
}

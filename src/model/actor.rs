//! Actor documents and JSON-LD contexts

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::object::Attachment;
use super::{ACTIVITYSTREAMS_NS, SECURITY_NS};

/// Plain ActivityStreams context for activities and objects
pub fn streams_context() -> Value {
    Value::String(ACTIVITYSTREAMS_NS.to_string())
}

/// Context array for Person actor documents
///
/// Carries the Mastodon (`toot:`) and schema.org terms remote servers
/// expect on profile documents.
pub fn actor_context() -> Value {
    json!([
        ACTIVITYSTREAMS_NS,
        SECURITY_NS,
        {
            "toot": "http://joinmastodon.org/ns#",
            "discoverable": "toot:discoverable",
            "indexable": "toot:indexable",
            "featured": "toot:featured",
            "manuallyApprovesFollowers": "as:manuallyApprovesFollowers",
            "PropertyValue": "schema:PropertyValue",
            "schema": "http://schema.org/#"
        }
    ])
}

/// Context array for Group actor documents (Lemmy terms)
pub fn group_context() -> Value {
    json!([
        ACTIVITYSTREAMS_NS,
        SECURITY_NS,
        {
            "lemmy": "https://join-lemmy.org/ns#",
            "postingRestrictedToMods": "lemmy:postingRestrictedToMods",
            "moderators": {
                "@id": "lemmy:moderators",
                "@type": "@id"
            },
            "sensitive": "as:sensitive"
        }
    ])
}

/// Actor's signing key, public half
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKey {
    pub id: String,
    pub owner: String,
    pub public_key_pem: String,
}

/// Actor endpoints block
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoints {
    pub shared_inbox: String,
}

/// Icon or banner image
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

impl Image {
    pub fn from_url(url: String) -> Self {
        Self {
            kind: "Image".to_string(),
            url,
        }
    }
}

/// A public actor document (Person, Group, Organization, …)
///
/// Never contains private key material; `PublicKey` carries the public
/// PEM only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    #[serde(rename = "@context")]
    pub context: Value,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub preferred_username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub inbox: String,
    pub outbox: String,
    pub following: String,
    pub followers: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liked: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub featured: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<Image>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<Image>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discoverable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manually_approves_followers: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    pub public_key: PublicKey,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachment: Vec<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<Endpoints>,

    // Group (Lemmy) extensions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posting_restricted_to_mods: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitive: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub moderators: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_actor() -> Actor {
        Actor {
            context: actor_context(),
            id: "https://example.com/@alice".to_string(),
            kind: "Person".to_string(),
            preferred_username: "alice".to_string(),
            name: Some("Alice".to_string()),
            summary: None,
            inbox: "https://example.com/@alice/inbox".to_string(),
            outbox: "https://example.com/@alice/outbox".to_string(),
            following: "https://example.com/@alice/following".to_string(),
            followers: "https://example.com/@alice/followers".to_string(),
            liked: Some("https://example.com/@alice/liked".to_string()),
            featured: None,
            url: Some("https://example.com/@alice".to_string()),
            icon: None,
            image: None,
            discoverable: Some(true),
            indexable: Some(true),
            manually_approves_followers: Some(false),
            published: None,
            public_key: PublicKey {
                id: "https://example.com/@alice#main-key".to_string(),
                owner: "https://example.com/@alice".to_string(),
                public_key_pem: "-----BEGIN PUBLIC KEY-----\n...\n-----END PUBLIC KEY-----\n"
                    .to_string(),
            },
            attachment: Vec::new(),
            endpoints: Some(Endpoints {
                shared_inbox: "https://example.com/inbox".to_string(),
            }),
            posting_restricted_to_mods: None,
            sensitive: None,
            moderators: Vec::new(),
        }
    }

    #[test]
    fn actor_document_serializes_wire_names() {
        let value = serde_json::to_value(sample_actor()).unwrap();
        assert_eq!(value["preferredUsername"], "alice");
        assert_eq!(value["publicKey"]["owner"], "https://example.com/@alice");
        assert_eq!(
            value["publicKey"]["id"],
            "https://example.com/@alice#main-key"
        );
        assert_eq!(value["endpoints"]["sharedInbox"], "https://example.com/inbox");
        assert_eq!(value["manuallyApprovesFollowers"], false);
    }

    #[test]
    fn actor_context_carries_required_namespaces() {
        let context = actor_context();
        let entries = context.as_array().unwrap();
        assert_eq!(entries[0], ACTIVITYSTREAMS_NS);
        assert_eq!(entries[1], SECURITY_NS);
        assert_eq!(entries[2]["toot"], "http://joinmastodon.org/ns#");
        assert_eq!(entries[2]["PropertyValue"], "schema:PropertyValue");
    }

    #[test]
    fn group_context_carries_lemmy_terms() {
        let context = group_context();
        let entries = context.as_array().unwrap();
        assert_eq!(entries[2]["lemmy"], "https://join-lemmy.org/ns#");
        assert_eq!(
            entries[2]["postingRestrictedToMods"],
            "lemmy:postingRestrictedToMods"
        );
    }
}

//! ActivityStreams objects
//!
//! One permissive struct covers the object variants this instance emits
//! (Article, Note, Page, Event, Video, Image, Document, Tombstone, …);
//! absent fields are omitted from the wire form.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tag attached to an object: Hashtag or Mention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(rename = "type")]
    pub kind: String,
    pub href: String,
    pub name: String,
}

impl Tag {
    pub fn hashtag(href: String, name: String) -> Self {
        Self {
            kind: "Hashtag".to_string(),
            href,
            name,
        }
    }

    pub fn mention(href: String, name: String) -> Self {
        Self {
            kind: "Mention".to_string(),
            href,
            name,
        }
    }
}

/// An attachment: media for objects, PropertyValue pairs for actors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Attachment {
    pub fn image(url: String) -> Self {
        Self {
            kind: "Image".to_string(),
            url: Some(url),
            ..Default::default()
        }
    }

    pub fn named_image(url: String, name: String) -> Self {
        Self {
            kind: "Image".to_string(),
            url: Some(url),
            name: Some(name),
            ..Default::default()
        }
    }

    pub fn property_value(name: String, value: String) -> Self {
        Self {
            kind: "PropertyValue".to_string(),
            name: Some(name),
            value: Some(value),
            ..Default::default()
        }
    }
}

/// Event location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
}

impl Place {
    pub fn named(name: String) -> Self {
        Self {
            kind: "Place".to_string(),
            name,
        }
    }
}

/// An object this instance emits
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ApObject {
    #[serde(rename = "@context", skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributed_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitive: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag: Vec<Tag>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachment: Vec<Attachment>,

    // Event
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Place>,

    // Video
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    // Tombstone
    #[serde(skip_serializing_if = "Option::is_none")]
    pub former_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<String>,

    /// Fields this core does not model; preserved on the wire
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ApObject {
    /// A Tombstone standing in for a deleted object
    pub fn tombstone(id: String, former_type: String, deleted_at: String) -> Self {
        Self {
            id: Some(id),
            kind: Some("Tombstone".to_string()),
            former_type: Some(former_type),
            deleted: Some(deleted_at),
            ..Default::default()
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("object serializes")
    }
}

/// An OrderedCollection wrapping a local collection endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderedCollection {
    #[serde(rename = "@context")]
    pub context: Value,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub total_items: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordered_items: Option<Vec<Value>>,
}

impl OrderedCollection {
    pub fn new(id: String, total_items: usize, ordered_items: Option<Vec<Value>>) -> Self {
        Self {
            context: Value::String(super::ACTIVITYSTREAMS_NS.to_string()),
            id,
            kind: "OrderedCollection".to_string(),
            total_items,
            ordered_items,
        }
    }
}

//! Activity envelopes

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FederationError, Result};

/// Activity types this core understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityKind {
    Create,
    Update,
    Delete,
    Add,
    Remove,
    Move,
    Follow,
    Like,
    Announce,
    Undo,
    Accept,
    Reject,
    Block,
    Flag,
}

impl ActivityKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Create" => Some(Self::Create),
            "Update" => Some(Self::Update),
            "Delete" => Some(Self::Delete),
            "Add" => Some(Self::Add),
            "Remove" => Some(Self::Remove),
            "Move" => Some(Self::Move),
            "Follow" => Some(Self::Follow),
            "Like" => Some(Self::Like),
            "Announce" => Some(Self::Announce),
            "Undo" => Some(Self::Undo),
            "Accept" => Some(Self::Accept),
            "Reject" => Some(Self::Reject),
            "Block" => Some(Self::Block),
            "Flag" => Some(Self::Flag),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
            Self::Add => "Add",
            Self::Remove => "Remove",
            Self::Move => "Move",
            Self::Follow => "Follow",
            Self::Like => "Like",
            Self::Announce => "Announce",
            Self::Undo => "Undo",
            Self::Accept => "Accept",
            Self::Reject => "Reject",
            Self::Block => "Block",
            Self::Flag => "Flag",
        }
    }

    /// Kinds whose envelope must carry an object
    pub fn requires_object(&self) -> bool {
        matches!(
            self,
            Self::Create
                | Self::Update
                | Self::Delete
                | Self::Like
                | Self::Announce
                | Self::Follow
                | Self::Accept
                | Self::Reject
                | Self::Undo
        )
    }
}

/// A nested field that is either a URI reference or an embedded object
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObjectRef {
    Uri(String),
    Embedded(Box<Value>),
}

impl ObjectRef {
    /// The referenced id: the URI itself, or the embedded object's `id`
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Uri(uri) => Some(uri),
            Self::Embedded(value) => value.get("id").and_then(Value::as_str),
        }
    }

    /// The embedded object's `type`, if embedded
    pub fn kind(&self) -> Option<&str> {
        match self {
            Self::Uri(_) => None,
            Self::Embedded(value) => value.get("type").and_then(Value::as_str),
        }
    }

    pub fn as_uri(&self) -> Option<&str> {
        match self {
            Self::Uri(uri) => Some(uri),
            Self::Embedded(_) => None,
        }
    }

    pub fn as_embedded(&self) -> Option<&Value> {
        match self {
            Self::Uri(_) => None,
            Self::Embedded(value) => Some(value),
        }
    }
}

/// An activity this instance emits
///
/// Immutable once built; the builder functions in `federation::builder`
/// are the only constructors used outside tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "@context", skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub actor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bto: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bcc: Vec<String>,
}

impl Activity {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("activity serializes")
    }
}

/// A validated inbound envelope
///
/// Remote envelopes arrive as untyped JSON; this captures the fields every
/// handler needs, with the raw document preserved for mirroring.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub id: String,
    /// Raw `type` string; unknown types survive parsing so the processor
    /// can log and ignore them
    pub kind: String,
    /// Actor URI; embedded actors are reduced to their id
    pub actor: String,
    pub object: Option<ObjectRef>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub raw: Value,
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

impl Envelope {
    /// Parse and validate an inbound activity document
    ///
    /// Rejects envelopes missing `id`, `type`, or `actor`, and known kinds
    /// missing their required `object`.
    pub fn parse(raw: &Value) -> Result<Self> {
        let id = raw
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| FederationError::BadRequest("activity is missing id".to_string()))?
            .to_string();

        let kind = raw
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| FederationError::BadRequest("activity is missing type".to_string()))?
            .to_string();

        let actor = match raw.get("actor") {
            Some(Value::String(uri)) => uri.clone(),
            Some(Value::Object(map)) => map
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    FederationError::BadRequest("embedded actor is missing id".to_string())
                })?,
            _ => {
                return Err(FederationError::BadRequest(
                    "activity is missing actor".to_string(),
                ))
            }
        };

        let object = match raw.get("object") {
            None | Some(Value::Null) => None,
            Some(Value::String(uri)) => Some(ObjectRef::Uri(uri.clone())),
            Some(value @ Value::Object(_)) => Some(ObjectRef::Embedded(Box::new(value.clone()))),
            Some(Value::Array(items)) => items
                .first()
                .map(|first| match first {
                    Value::String(uri) => Ok(ObjectRef::Uri(uri.clone())),
                    value @ Value::Object(_) => Ok(ObjectRef::Embedded(Box::new(value.clone()))),
                    _ => Err(FederationError::BadRequest(
                        "activity object list holds a non-object".to_string(),
                    )),
                })
                .transpose()?,
            Some(_) => {
                return Err(FederationError::BadRequest(
                    "activity object has an unsupported shape".to_string(),
                ))
            }
        };

        if let Some(known) = ActivityKind::from_str(&kind) {
            if known.requires_object() && object.is_none() {
                return Err(FederationError::BadRequest(format!(
                    "{} activity is missing object",
                    kind
                )));
            }
        }

        Ok(Self {
            id,
            kind,
            actor,
            object,
            to: string_list(raw.get("to")),
            cc: string_list(raw.get("cc")),
            raw: raw.clone(),
        })
    }

    pub fn known_kind(&self) -> Option<ActivityKind> {
        ActivityKind::from_str(&self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn activity_kind_roundtrips_through_strings() {
        for kind in [
            ActivityKind::Create,
            ActivityKind::Follow,
            ActivityKind::Undo,
            ActivityKind::Flag,
        ] {
            assert_eq!(ActivityKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(ActivityKind::from_str("Dance"), None);
    }

    #[test]
    fn parse_accepts_a_minimal_follow() {
        let envelope = Envelope::parse(&json!({
            "id": "https://mastodon.social/activities/1",
            "type": "Follow",
            "actor": "https://mastodon.social/@bob",
            "object": "https://example.com/@alice"
        }))
        .expect("valid follow");

        assert_eq!(envelope.kind, "Follow");
        assert_eq!(envelope.actor, "https://mastodon.social/@bob");
        assert_eq!(
            envelope.object.as_ref().and_then(ObjectRef::id),
            Some("https://example.com/@alice")
        );
    }

    #[test]
    fn parse_reduces_embedded_actor_to_id() {
        let envelope = Envelope::parse(&json!({
            "id": "https://remote.example/a/1",
            "type": "Like",
            "actor": {"id": "https://remote.example/@carol", "type": "Person"},
            "object": "https://example.com/ap/content/notes/n1"
        }))
        .expect("valid like");
        assert_eq!(envelope.actor, "https://remote.example/@carol");
    }

    #[test]
    fn parse_rejects_missing_required_fields() {
        let missing_id = Envelope::parse(&json!({
            "type": "Follow",
            "actor": "https://a.example/@x",
            "object": "https://b.example/@y"
        }));
        assert!(matches!(
            missing_id,
            Err(FederationError::BadRequest(msg)) if msg.contains("id")
        ));

        let missing_actor = Envelope::parse(&json!({
            "id": "https://a.example/1",
            "type": "Follow",
            "object": "https://b.example/@y"
        }));
        assert!(matches!(
            missing_actor,
            Err(FederationError::BadRequest(msg)) if msg.contains("actor")
        ));

        let missing_object = Envelope::parse(&json!({
            "id": "https://a.example/1",
            "type": "Create",
            "actor": "https://a.example/@x"
        }));
        assert!(matches!(
            missing_object,
            Err(FederationError::BadRequest(msg)) if msg.contains("object")
        ));
    }

    #[test]
    fn parse_keeps_unknown_kinds() {
        let envelope = Envelope::parse(&json!({
            "id": "https://a.example/1",
            "type": "Arrive",
            "actor": "https://a.example/@x"
        }))
        .expect("unknown kinds parse");
        assert_eq!(envelope.kind, "Arrive");
        assert!(envelope.known_kind().is_none());
    }

    #[test]
    fn parse_takes_first_of_an_object_list() {
        let envelope = Envelope::parse(&json!({
            "id": "https://a.example/1",
            "type": "Create",
            "actor": "https://a.example/@x",
            "object": [{"id": "https://a.example/notes/1", "type": "Note"}]
        }))
        .expect("object list");
        let object = envelope.object.expect("object present");
        assert_eq!(object.id(), Some("https://a.example/notes/1"));
        assert_eq!(object.kind(), Some("Note"));
    }

    #[test]
    fn emitted_activity_omits_empty_addressing() {
        let activity = Activity {
            context: Some(serde_json::Value::String(
                crate::model::ACTIVITYSTREAMS_NS.to_string(),
            )),
            id: "https://example.com/ap/activities/follow/x".to_string(),
            kind: ActivityKind::Follow,
            actor: "https://example.com/@alice".to_string(),
            object: Some(json!("https://mastodon.social/@bob")),
            published: Some("2024-01-01T00:00:00Z".to_string()),
            to: Vec::new(),
            cc: Vec::new(),
            bto: Vec::new(),
            bcc: Vec::new(),
        };
        let value = activity.to_value();
        assert!(value.get("to").is_none());
        assert!(value.get("bto").is_none());
        assert_eq!(value["type"], "Follow");
    }
}

//! ActivityStreams 2.0 data model
//!
//! Typed envelopes and documents for everything this instance emits, plus
//! a validating parser for inbound envelopes whose nested fields may be
//! URI references or embedded objects.

mod activity;
mod actor;
mod object;

pub use activity::{Activity, ActivityKind, Envelope, ObjectRef};
pub use actor::{
    actor_context, group_context, streams_context, Actor, Endpoints, Image, PublicKey,
};
pub use object::{ApObject, Attachment, OrderedCollection, Place, Tag};

/// The ActivityStreams namespace, required in every top-level `@context`
pub const ACTIVITYSTREAMS_NS: &str = "https://www.w3.org/ns/activitystreams";

/// The W3C security vocabulary, required when a document carries a publicKey
pub const SECURITY_NS: &str = "https://w3id.org/security/v1";

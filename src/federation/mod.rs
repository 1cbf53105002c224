//! ActivityPub federation
//!
//! Handles:
//! - HTTP signatures (sign, verify, digest)
//! - Remote public key caching
//! - Activity construction
//! - Outbound delivery (queue, retry, signed POST)
//! - Inbound activity processing

pub mod builder;
mod delivery;
mod inbox;
mod key_cache;
mod publish;
mod signature;

pub use delivery::{
    DeliveryQueue, DeliveryStats, DeliveryTask, RecipientStatus, TaskRecipient, TaskStatus,
};
pub use inbox::InboxProcessor;
pub use key_cache::{CachedKey, KeyCacheStats, PublicKeyCache};
pub use publish::Publisher;
pub use signature::{
    generate_digest, key_id_matches_actor, parse_signature_header, sign_request, verify_digest,
    verify_signature, ParsedSignature, SignatureHeaders, SignatureVerifier,
};

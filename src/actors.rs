//! Local actor records and their public documents
//!
//! Each local handle owns an RSA-2048 keypair, generated once on first
//! creation and reused across profile edits. The private half never
//! appears in any outbound document.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};

use crate::config::FederationConfig;
use crate::error::{FederationError, Result};
use crate::model::{actor_context, group_context, Actor, Attachment, Endpoints, Image, PublicKey};
use crate::store::{self, ns, KeyedLocks, Store};

/// Actor type tag for local actors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ActorKind {
    #[default]
    Person,
    Organization,
    Application,
    Service,
}

impl ActorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "Person",
            Self::Organization => "Organization",
            Self::Application => "Application",
            Self::Service => "Service",
        }
    }
}

/// Social links rendered as PropertyValue attachments
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialLinks {
    /// Bare handle, expanded to a twitter.com URL
    pub twitter: Option<String>,
    /// Bare handle, expanded to a github.com URL
    pub github: Option<String>,
    /// Bare handle, expanded to a linkedin.com URL
    pub linkedin: Option<String>,
    /// Full profile URL, used verbatim
    pub mastodon: Option<String>,
    /// Full URL, used verbatim
    pub website: Option<String>,
}

fn property_link(name: &str, href: &str) -> Attachment {
    Attachment::property_value(
        name.to_string(),
        format!(
            "<a href=\"{}\" rel=\"me nofollow noreferrer\" target=\"_blank\">{}</a>",
            href, href
        ),
    )
}

impl SocialLinks {
    /// PropertyValue attachments in a stable order
    pub fn attachments(&self) -> Vec<Attachment> {
        let mut attachments = Vec::new();
        if let Some(handle) = &self.twitter {
            attachments.push(property_link(
                "Twitter",
                &format!("https://twitter.com/{}", handle),
            ));
        }
        if let Some(handle) = &self.github {
            attachments.push(property_link(
                "GitHub",
                &format!("https://github.com/{}", handle),
            ));
        }
        if let Some(handle) = &self.linkedin {
            attachments.push(property_link(
                "LinkedIn",
                &format!("https://www.linkedin.com/in/{}", handle),
            ));
        }
        if let Some(url) = &self.mastodon {
            attachments.push(property_link("Mastodon", url));
        }
        if let Some(url) = &self.website {
            attachments.push(property_link("Website", url));
        }
        attachments
    }
}

/// Profile fields supplied by the publishing site
#[derive(Debug, Clone, Default)]
pub struct ActorProfile {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub banner_url: Option<String>,
    pub links: SocialLinks,
    pub discoverable: bool,
    pub kind: ActorKind,
}

/// The private record for a local actor
///
/// `private_key_pem` stays in this record only; the exported document is
/// built by `ActorStore::document`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredActor {
    pub handle: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub banner_url: Option<String>,
    #[serde(default)]
    pub links: SocialLinks,
    #[serde(default)]
    pub discoverable: bool,
    #[serde(default)]
    pub kind: ActorKind,
    pub public_key_id: String,
    pub public_key_pem: String,
    pub private_key_pem: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Group profile fields
#[derive(Debug, Clone, Default)]
pub struct GroupProfile {
    pub display_name: Option<String>,
    pub summary: Option<String>,
    pub moderator_handles: Vec<String>,
    pub posting_restricted_to_mods: bool,
    pub nsfw: bool,
}

/// The private record for a local group actor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredGroup {
    pub handle: String,
    pub display_name: Option<String>,
    pub summary: Option<String>,
    #[serde(default)]
    pub moderator_handles: Vec<String>,
    #[serde(default)]
    pub posting_restricted_to_mods: bool,
    #[serde(default)]
    pub nsfw: bool,
    pub public_key_id: String,
    pub public_key_pem: String,
    pub private_key_pem: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Generate an RSA-2048 keypair as (private PKCS#8 PEM, public SPKI PEM)
pub fn generate_keypair() -> Result<(String, String)> {
    let mut rng = rand::thread_rng();
    let private_key = RsaPrivateKey::new(&mut rng, 2048)
        .map_err(|e| FederationError::Federation(format!("key generation: {}", e)))?;
    let public_key = RsaPublicKey::from(&private_key);

    let private_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| FederationError::Federation(format!("private key encoding: {}", e)))?
        .to_string();
    let public_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| FederationError::Federation(format!("public key encoding: {}", e)))?;

    Ok((private_pem, public_pem))
}

/// Store of local actor and group records
pub struct ActorStore {
    config: Arc<FederationConfig>,
    store: Arc<dyn Store>,
    locks: KeyedLocks,
}

impl ActorStore {
    pub fn new(config: Arc<FederationConfig>, store: Arc<dyn Store>) -> Self {
        Self {
            config,
            store,
            locks: KeyedLocks::new(),
        }
    }

    pub async fn get(&self, handle: &str) -> Result<Option<StoredActor>> {
        store::get_json(self.store.as_ref(), ns::ACTORS, handle).await
    }

    /// Fetch or create the record for a handle
    ///
    /// Keys are generated only when no record exists; profile edits flow
    /// through `update_profile` and keep the stored keypair.
    pub async fn get_or_create(&self, handle: &str, profile: &ActorProfile) -> Result<StoredActor> {
        let _guard = self.locks.acquire(&format!("actors:{}", handle)).await;

        if let Some(existing) = self.get(handle).await? {
            return Ok(existing);
        }

        let (private_pem, public_pem) = generate_keypair()?;
        let now = Utc::now();
        let actor = StoredActor {
            handle: handle.to_string(),
            display_name: profile.display_name.clone(),
            bio: profile.bio.clone(),
            avatar_url: profile.avatar_url.clone(),
            banner_url: profile.banner_url.clone(),
            links: profile.links.clone(),
            discoverable: profile.discoverable,
            kind: profile.kind,
            public_key_id: self.config.key_id(handle),
            public_key_pem: public_pem,
            private_key_pem: private_pem,
            created_at: now,
            updated_at: now,
        };
        store::put_json(self.store.as_ref(), ns::ACTORS, handle, &actor).await?;
        tracing::info!(%handle, "Created local actor with new keypair");
        Ok(actor)
    }

    /// Apply profile changes, reusing the stored keypair
    pub async fn update_profile(&self, handle: &str, profile: &ActorProfile) -> Result<StoredActor> {
        let _guard = self.locks.acquire(&format!("actors:{}", handle)).await;

        let mut actor = self
            .get(handle)
            .await?
            .ok_or(FederationError::NotFound)?;
        actor.display_name = profile.display_name.clone();
        actor.bio = profile.bio.clone();
        actor.avatar_url = profile.avatar_url.clone();
        actor.banner_url = profile.banner_url.clone();
        actor.links = profile.links.clone();
        actor.discoverable = profile.discoverable;
        actor.updated_at = Utc::now();
        store::put_json(self.store.as_ref(), ns::ACTORS, handle, &actor).await?;
        Ok(actor)
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.store.list(ns::ACTORS).await?.len())
    }

    /// The public JSON-LD document for a stored actor
    pub fn document(&self, actor: &StoredActor) -> Actor {
        let actor_uri = self.config.actor_uri(&actor.handle);
        Actor {
            context: actor_context(),
            id: actor_uri.clone(),
            kind: actor.kind.as_str().to_string(),
            preferred_username: actor.handle.clone(),
            name: actor.display_name.clone(),
            summary: actor.bio.clone(),
            inbox: self.config.inbox_uri(&actor.handle),
            outbox: self.config.outbox_uri(&actor.handle),
            following: self.config.following_uri(&actor.handle),
            followers: self.config.followers_uri(&actor.handle),
            liked: Some(self.config.liked_uri(&actor.handle)),
            featured: Some(self.config.featured_uri(&actor.handle)),
            url: Some(actor_uri.clone()),
            icon: actor.avatar_url.clone().map(Image::from_url),
            image: actor.banner_url.clone().map(Image::from_url),
            discoverable: Some(actor.discoverable),
            indexable: Some(actor.discoverable),
            manually_approves_followers: Some(!self.config.federation.auto_approve_follows),
            published: Some(actor.created_at.to_rfc3339()),
            public_key: PublicKey {
                id: actor.public_key_id.clone(),
                owner: actor_uri,
                public_key_pem: actor.public_key_pem.clone(),
            },
            attachment: actor.links.attachments(),
            endpoints: Some(Endpoints {
                shared_inbox: self.config.shared_inbox_uri(),
            }),
            posting_restricted_to_mods: None,
            sensitive: None,
            moderators: Vec::new(),
        }
    }

    pub async fn get_group(&self, handle: &str) -> Result<Option<StoredGroup>> {
        store::get_json(self.store.as_ref(), ns::GROUPS, handle).await
    }

    /// Fetch or create a group record, with its own keypair
    pub async fn get_or_create_group(
        &self,
        handle: &str,
        profile: &GroupProfile,
    ) -> Result<StoredGroup> {
        let _guard = self.locks.acquire(&format!("groups:{}", handle)).await;

        if let Some(existing) = self.get_group(handle).await? {
            return Ok(existing);
        }

        let (private_pem, public_pem) = generate_keypair()?;
        let now = Utc::now();
        let group = StoredGroup {
            handle: handle.to_string(),
            display_name: profile.display_name.clone(),
            summary: profile.summary.clone(),
            moderator_handles: profile.moderator_handles.clone(),
            posting_restricted_to_mods: profile.posting_restricted_to_mods,
            nsfw: profile.nsfw,
            public_key_id: format!("{}#main-key", self.config.group_uri(handle)),
            public_key_pem: public_pem,
            private_key_pem: private_pem,
            created_at: now,
            updated_at: now,
        };
        store::put_json(self.store.as_ref(), ns::GROUPS, handle, &group).await?;
        tracing::info!(%handle, "Created local group with new keypair");
        Ok(group)
    }

    /// The public JSON-LD document for a group
    pub fn group_document(&self, group: &StoredGroup) -> Actor {
        let group_uri = self.config.group_uri(&group.handle);
        Actor {
            context: group_context(),
            id: group_uri.clone(),
            kind: "Group".to_string(),
            preferred_username: group.handle.clone(),
            name: group.display_name.clone(),
            summary: group.summary.clone(),
            inbox: format!("{}/inbox", group_uri),
            outbox: format!("{}/outbox", group_uri),
            following: format!("{}/following", group_uri),
            followers: format!("{}/followers", group_uri),
            liked: None,
            featured: None,
            url: Some(group_uri.clone()),
            icon: None,
            image: None,
            discoverable: Some(true),
            indexable: None,
            manually_approves_followers: None,
            published: Some(group.created_at.to_rfc3339()),
            public_key: PublicKey {
                id: group.public_key_id.clone(),
                owner: group_uri,
                public_key_pem: group.public_key_pem.clone(),
            },
            attachment: Vec::new(),
            endpoints: Some(Endpoints {
                shared_inbox: self.config.shared_inbox_uri(),
            }),
            posting_restricted_to_mods: Some(group.posting_restricted_to_mods),
            sensitive: Some(group.nsfw),
            moderators: group
                .moderator_handles
                .iter()
                .map(|m| self.config.actor_uri(m))
                .collect(),
        }
    }
}

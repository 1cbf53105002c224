//! fedpress - ActivityPub federation core for a social publishing site
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Route Layer (Axum)                        │
//! │  - WebFinger / NodeInfo discovery                           │
//! │  - Actor documents and collections                          │
//! │  - Inbox endpoints                                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Federation Core                            │
//! │  - HTTP signatures and key cache                            │
//! │  - Inbound activity processing                              │
//! │  - Outbound delivery queue                                  │
//! │  - Content conversion and publish hooks                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    State Stores                              │
//! │  - Actors, follower graph, notifications                    │
//! │  - Interaction records, remote-content mirror               │
//! │  - Per-record JSON files (in-memory in tests)               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers for discovery and ActivityPub endpoints
//! - `federation`: signatures, delivery, inbound processing, publish hooks
//! - `model`: ActivityStreams envelopes and documents
//! - `actors`, `follow`, `notify`, `interactions`, `mirror`: state stores
//! - `content`, `text`: content conversion and mention/hashtag parsing
//! - `store`: storage abstraction
//! - `config`: configuration and URI derivation
//! - `error`: error types

pub mod actors;
pub mod api;
pub mod config;
pub mod content;
pub mod discovery;
pub mod error;
pub mod federation;
pub mod follow;
pub mod interactions;
pub mod mirror;
pub mod model;
pub mod notify;
pub mod store;
pub mod text;

use std::sync::Arc;
use std::time::Duration;

use actors::ActorStore;
use config::FederationConfig;
use discovery::InstanceStats;
use error::Result;
use federation::{
    DeliveryQueue, InboxProcessor, PublicKeyCache, Publisher, SignatureVerifier,
};
use follow::FollowGraph;
use interactions::InteractionStore;
use mirror::MirrorStore;
use notify::NotificationStore;
use store::{FsStore, Store};

/// A user known to the publishing site but not yet stored as an actor
#[derive(Debug, Clone)]
pub struct ResolvedUser {
    pub handle: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

/// External callback resolving a handle against the site's user base
pub type UserResolver = Arc<dyn Fn(&str) -> Option<ResolvedUser> + Send + Sync>;

/// Post/comment counts supplied by the external content store
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentStats {
    pub local_posts: u64,
    pub local_comments: u64,
}

/// External callback supplying content statistics for NodeInfo
pub type StatsProvider = Arc<dyn Fn() -> ContentStats + Send + Sync>;

/// Shared federation state
///
/// One runtime per configuration; tests construct a fresh runtime (with
/// an in-memory store) instead of mutating process globals. Cloning is
/// cheap and shares all state.
#[derive(Clone)]
pub struct FederationRuntime {
    pub config: Arc<FederationConfig>,
    pub store: Arc<dyn Store>,
    pub http_client: Arc<reqwest::Client>,
    pub actors: Arc<ActorStore>,
    pub follows: Arc<FollowGraph>,
    pub notifications: Arc<NotificationStore>,
    pub interactions: Arc<InteractionStore>,
    pub mirror: Arc<MirrorStore>,
    pub key_cache: Arc<PublicKeyCache>,
    pub queue: Arc<DeliveryQueue>,
    pub resolve_user: Option<UserResolver>,
    pub content_stats: Option<StatsProvider>,
}

impl FederationRuntime {
    /// Build a runtime backed by the configured on-disk state root
    pub fn new(config: FederationConfig) -> Result<Self> {
        let store: Arc<dyn Store> =
            Arc::new(FsStore::new(config.federation.activitypub_dir.clone()));
        Self::with_store(config, store)
    }

    /// Build a runtime over an explicit store backend
    pub fn with_store(config: FederationConfig, store: Arc<dyn Store>) -> Result<Self> {
        let config = Arc::new(config);
        let http_client = Arc::new(
            reqwest::Client::builder()
                .user_agent(format!(
                    "{}/{}",
                    config.instance.software_name, config.instance.software_version
                ))
                .timeout(Duration::from_secs(30))
                .build()
                .map_err(|e| {
                    error::FederationError::Federation(format!("http client: {}", e))
                })?,
        );

        let actors = Arc::new(ActorStore::new(config.clone(), store.clone()));
        let follows = Arc::new(FollowGraph::new(store.clone()));
        let notifications = Arc::new(NotificationStore::new(store.clone()));
        let interactions = Arc::new(InteractionStore::new(store.clone()));
        let mirror = Arc::new(MirrorStore::new(store.clone()));
        let key_cache = Arc::new(PublicKeyCache::new(
            store.clone(),
            http_client.clone(),
            Duration::from_secs(config.federation.actor_key_cache_ttl),
            config.federation_timeout(),
        ));
        let queue = Arc::new(DeliveryQueue::new(
            config.clone(),
            store.clone(),
            actors.clone(),
            http_client.clone(),
        ));

        Ok(Self {
            config,
            store,
            http_client,
            actors,
            follows,
            notifications,
            interactions,
            mirror,
            key_cache,
            queue,
            resolve_user: None,
            content_stats: None,
        })
    }

    /// Attach the site's user-resolution capability
    pub fn with_resolve_user(mut self, resolver: UserResolver) -> Self {
        self.resolve_user = Some(resolver);
        self
    }

    /// Attach the site's content statistics capability
    pub fn with_content_stats(mut self, provider: StatsProvider) -> Self {
        self.content_stats = Some(provider);
        self
    }

    /// Inbound request authenticator
    pub fn verifier(&self) -> SignatureVerifier {
        SignatureVerifier::new(self.config.clone(), self.key_cache.clone())
    }

    /// Inbound activity processor
    pub fn inbox_processor(&self) -> InboxProcessor {
        InboxProcessor::new(
            self.config.clone(),
            self.follows.clone(),
            self.notifications.clone(),
            self.interactions.clone(),
            self.mirror.clone(),
            self.queue.clone(),
        )
    }

    /// Publish hooks for the content lifecycle
    pub fn publisher(&self) -> Publisher {
        Publisher::new(
            self.config.clone(),
            self.actors.clone(),
            self.follows.clone(),
            self.interactions.clone(),
            self.queue.clone(),
        )
    }

    /// Instance statistics for NodeInfo
    pub async fn instance_stats(&self) -> Result<InstanceStats> {
        let content = self
            .content_stats
            .as_ref()
            .map(|provider| provider())
            .unwrap_or_default();
        Ok(InstanceStats {
            users_total: self.actors.count().await?,
            local_posts: content.local_posts,
            local_comments: content.local_comments,
        })
    }

    /// Spawn the background workers: delivery drain and key-cache sweep
    pub fn start_workers(&self) -> Vec<tokio::task::JoinHandle<()>> {
        let delivery = tokio::spawn(self.queue.clone().run());
        let key_cache = self.key_cache.clone();
        let sweeper = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(600)).await;
                if let Err(error) = key_cache.prune_expired().await {
                    tracing::error!(%error, "Key cache sweep failed");
                }
            }
        });
        vec![delivery, sweeper]
    }
}

/// Build the Axum router with all federation routes.
///
/// Shared by the binary and integration tests to keep route composition
/// consistent across environments.
pub fn build_router(runtime: FederationRuntime) -> axum::Router {
    use axum::Router;
    use tower_http::{compression::CompressionLayer, trace::TraceLayer};

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::wellknown_router())
        .merge(api::activitypub_router())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(runtime)
}

async fn health_check() -> &'static str {
    "OK"
}

//! Configuration and canonical URI derivation
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration files (config/default.toml, config/local.toml)
//! 3. Environment variables (FEDPRESS_*, override)
//!
//! All local URIs (actor, inbox, outbox, collections, WebFinger resource)
//! are derived here and nowhere else.

use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{FederationError, Result};

/// The ActivityStreams public addressing sentinel
pub const PUBLIC_SENTINEL: &str = "https://www.w3.org/ns/activitystreams#Public";

/// Main federation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
    pub server: ServerConfig,
    pub federation: FederationOptions,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub instance: InstanceConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number
    #[serde(default = "default_port")]
    pub port: u16,
    /// Scheme+host prefix for all local URIs; trailing slash stripped
    pub site_base_url: String,
}

/// Federation behavior toggles
#[derive(Debug, Clone, Deserialize)]
pub struct FederationOptions {
    /// If false, outbound delivery is a no-op
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Applied when content omits visibility
    #[serde(default = "default_visibility")]
    pub default_visibility: String,
    /// If true, Follow is accepted synchronously
    #[serde(default)]
    pub auto_approve_follows: bool,
    /// Terminal cap for per-task delivery retries
    #[serde(default = "default_max_retries")]
    pub max_delivery_retries: u32,
    /// Hard timeout per outbound HTTP request (ms)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Inbound signature gate
    #[serde(default = "default_true")]
    pub signature_verification_enabled: bool,
    /// Seconds before a cached remote public key expires
    #[serde(default = "default_key_ttl")]
    pub actor_key_cache_ttl: u64,
    /// Root of on-disk federation state
    #[serde(default = "default_activitypub_dir")]
    pub activitypub_dir: PathBuf,
}

/// Input caps
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,
    #[serde(default = "default_max_tags")]
    pub max_tags: usize,
    #[serde(default = "default_max_mentions")]
    pub max_mentions: usize,
    #[serde(default = "default_max_attachments")]
    pub max_attachments: usize,
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_content_length: default_max_content_length(),
            max_tags: default_max_tags(),
            max_mentions: default_max_mentions(),
            max_attachments: default_max_attachments(),
            max_upload_size: default_max_upload_size(),
        }
    }
}

/// Collection pagination
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

/// Instance metadata, reported via NodeInfo
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceConfig {
    #[serde(default = "default_software_name")]
    pub software_name: String,
    #[serde(default = "default_software_version")]
    pub software_version: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            software_name: default_software_name(),
            software_version: default_software_version(),
            title: String::new(),
            description: String::new(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_true() -> bool {
    true
}
fn default_visibility() -> String {
    "public".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_ms() -> u64 {
    10_000
}
fn default_key_ttl() -> u64 {
    3600
}
fn default_activitypub_dir() -> PathBuf {
    PathBuf::from(".activitypub")
}
fn default_max_content_length() -> usize {
    500_000
}
fn default_max_tags() -> usize {
    30
}
fn default_max_mentions() -> usize {
    50
}
fn default_max_attachments() -> usize {
    16
}
fn default_max_upload_size() -> usize {
    40_000_000
}
fn default_page_size() -> usize {
    20
}
fn default_max_page_size() -> usize {
    100
}
fn default_software_name() -> String {
    "fedpress".to_string()
}
fn default_software_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl FederationConfig {
    /// Load configuration from files and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (FEDPRESS_*)
    pub fn load() -> Result<Self> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("federation.enabled", true)?
            .set_default("federation.default_visibility", "public")?
            .set_default("federation.auto_approve_follows", false)?
            .set_default("federation.max_delivery_retries", 3)?
            .set_default("federation.timeout_ms", 10_000)?
            .set_default("federation.signature_verification_enabled", true)?
            .set_default("federation.actor_key_cache_ttl", 3600)?
            .set_default("federation.activitypub_dir", ".activitypub")?
            .set_default("pagination.default_page_size", 20)?
            .set_default("pagination.max_page_size", 100)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("FEDPRESS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut loaded: Self = config
            .try_deserialize()
            .map_err(|e| FederationError::Federation(format!("configuration: {}", e)))?;
        loaded.normalize()?;
        Ok(loaded)
    }

    /// Minimal configuration for a given base URL, with all defaults
    ///
    /// Tests construct a fresh configuration (and runtime) instead of
    /// mutating a process-wide one.
    pub fn for_base_url(site_base_url: &str, activitypub_dir: PathBuf) -> Self {
        let mut config = Self {
            server: ServerConfig {
                host: default_host(),
                port: 0,
                site_base_url: site_base_url.to_string(),
            },
            federation: FederationOptions {
                enabled: true,
                default_visibility: default_visibility(),
                auto_approve_follows: false,
                max_delivery_retries: default_max_retries(),
                timeout_ms: default_timeout_ms(),
                signature_verification_enabled: true,
                actor_key_cache_ttl: default_key_ttl(),
                activitypub_dir,
            },
            limits: LimitsConfig::default(),
            pagination: PaginationConfig::default(),
            instance: InstanceConfig::default(),
        };
        config
            .normalize()
            .expect("base URL for test configuration must be valid");
        config
    }

    /// Validate and canonicalize after loading
    fn normalize(&mut self) -> Result<()> {
        let trimmed = self.server.site_base_url.trim_end_matches('/').to_string();
        let parsed = url::Url::parse(&trimmed)
            .map_err(|e| FederationError::Federation(format!("invalid site_base_url: {}", e)))?;
        if parsed.host_str().is_none() {
            return Err(FederationError::Federation(
                "site_base_url must include a host".to_string(),
            ));
        }
        self.server.site_base_url = trimmed;
        Ok(())
    }

    /// Base URL with the trailing slash stripped
    pub fn base_url(&self) -> &str {
        &self.server.site_base_url
    }

    /// Instance domain: the host (plus explicit port) of the base URL
    pub fn instance_domain(&self) -> String {
        let parsed = url::Url::parse(&self.server.site_base_url)
            .expect("site_base_url validated at load time");
        let host = parsed.host_str().unwrap_or_default().to_string();
        match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host,
        }
    }

    /// Outbound HTTP timeout as a Duration
    pub fn federation_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.federation.timeout_ms)
    }

    // =========================================================================
    // Canonical URI derivation
    // =========================================================================

    /// `{base}/@{handle}`
    pub fn actor_uri(&self, handle: &str) -> String {
        format!("{}/@{}", self.base_url(), handle)
    }

    /// `{base}/c/{handle}` — group actors
    pub fn group_uri(&self, handle: &str) -> String {
        format!("{}/c/{}", self.base_url(), handle)
    }

    /// `{actor}/inbox`
    pub fn inbox_uri(&self, handle: &str) -> String {
        format!("{}/inbox", self.actor_uri(handle))
    }

    /// Shared inbox for the whole instance
    pub fn shared_inbox_uri(&self) -> String {
        format!("{}/inbox", self.base_url())
    }

    /// `{actor}/outbox`
    pub fn outbox_uri(&self, handle: &str) -> String {
        format!("{}/outbox", self.actor_uri(handle))
    }

    /// `{actor}/followers`
    pub fn followers_uri(&self, handle: &str) -> String {
        format!("{}/followers", self.actor_uri(handle))
    }

    /// `{actor}/following`
    pub fn following_uri(&self, handle: &str) -> String {
        format!("{}/following", self.actor_uri(handle))
    }

    /// `{actor}/liked`
    pub fn liked_uri(&self, handle: &str) -> String {
        format!("{}/liked", self.actor_uri(handle))
    }

    /// `{actor}/featured`
    pub fn featured_uri(&self, handle: &str) -> String {
        format!("{}/featured", self.actor_uri(handle))
    }

    /// `{actorId}#main-key`
    pub fn key_id(&self, handle: &str) -> String {
        format!("{}#main-key", self.actor_uri(handle))
    }

    /// WebFinger resource string: `acct:{handle}@{domain}`
    pub fn webfinger_resource(&self, handle: &str) -> String {
        format!("acct:{}@{}", handle, self.instance_domain())
    }

    /// True when the URI's host matches this instance
    pub fn is_local_uri(&self, uri: &str) -> bool {
        let Ok(parsed) = url::Url::parse(uri) else {
            return false;
        };
        let base =
            url::Url::parse(&self.server.site_base_url).expect("site_base_url validated at load");
        parsed.host_str() == base.host_str() && parsed.port_or_known_default() == base.port_or_known_default()
    }

    /// Extract the local handle from a local actor URI, or None
    ///
    /// Accepts both `{base}/@{handle}` and `{base}/c/{handle}` forms.
    pub fn local_handle_from_uri(&self, uri: &str) -> Option<String> {
        if !self.is_local_uri(uri) {
            return None;
        }
        let rest = uri.strip_prefix(self.base_url())?;
        let handle = rest
            .strip_prefix("/@")
            .or_else(|| rest.strip_prefix("/c/"))?;
        let handle = handle.split(['/', '?', '#']).next()?;
        if handle.is_empty()
            || !handle
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return None;
        }
        Some(handle.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> FederationConfig {
        FederationConfig::for_base_url("https://example.com/", PathBuf::from(".activitypub"))
    }

    #[test]
    fn base_url_trailing_slash_is_stripped() {
        let config = test_config();
        assert_eq!(config.base_url(), "https://example.com");
    }

    #[test]
    fn derives_canonical_uris() {
        let config = test_config();
        assert_eq!(config.actor_uri("alice"), "https://example.com/@alice");
        assert_eq!(
            config.inbox_uri("alice"),
            "https://example.com/@alice/inbox"
        );
        assert_eq!(
            config.outbox_uri("alice"),
            "https://example.com/@alice/outbox"
        );
        assert_eq!(
            config.followers_uri("alice"),
            "https://example.com/@alice/followers"
        );
        assert_eq!(
            config.following_uri("alice"),
            "https://example.com/@alice/following"
        );
        assert_eq!(
            config.liked_uri("alice"),
            "https://example.com/@alice/liked"
        );
        assert_eq!(config.group_uri("books"), "https://example.com/c/books");
        assert_eq!(
            config.key_id("alice"),
            "https://example.com/@alice#main-key"
        );
        assert_eq!(
            config.webfinger_resource("alice"),
            "acct:alice@example.com"
        );
    }

    #[test]
    fn instance_domain_keeps_explicit_port() {
        let config =
            FederationConfig::for_base_url("http://localhost:8080", PathBuf::from(".ap"));
        assert_eq!(config.instance_domain(), "localhost:8080");
    }

    #[test]
    fn is_local_uri_compares_hosts() {
        let config = test_config();
        assert!(config.is_local_uri("https://example.com/@alice"));
        assert!(config.is_local_uri("https://example.com/ap/content/blog/x"));
        assert!(!config.is_local_uri("https://mastodon.social/@bob"));
        assert!(!config.is_local_uri("not a url"));
    }

    #[test]
    fn local_handle_from_uri_extracts_handle() {
        let config = test_config();
        assert_eq!(
            config.local_handle_from_uri("https://example.com/@alice"),
            Some("alice".to_string())
        );
        assert_eq!(
            config.local_handle_from_uri("https://example.com/@alice/followers"),
            Some("alice".to_string())
        );
        assert_eq!(
            config.local_handle_from_uri("https://example.com/c/books"),
            Some("books".to_string())
        );
        assert_eq!(
            config.local_handle_from_uri("https://mastodon.social/@bob"),
            None
        );
        assert_eq!(
            config.local_handle_from_uri("https://example.com/tags/rust"),
            None
        );
    }
}

//! Content to ActivityStreams conversion
//!
//! Maps the publishing site's internal content records (blog posts, notes,
//! events, videos, …) to AS objects, derives canonical object and activity
//! ids, and computes visibility-driven addressing.

use serde_json::Value;

use crate::config::{FederationConfig, PUBLIC_SENTINEL};
use crate::model::{ApObject, Attachment, Place, Tag};
use crate::text::{self, Mention};

/// Content visibility, driving addressing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Unlisted,
    Followers,
    Private,
    Direct,
}

impl Visibility {
    /// Unknown values fall back to public
    pub fn parse(value: &str) -> Self {
        match value {
            "public" => Self::Public,
            "unlisted" => Self::Unlisted,
            "followers" => Self::Followers,
            "private" => Self::Private,
            "direct" => Self::Direct,
            _ => Self::Public,
        }
    }
}

/// Frontmatter-style metadata on a content record
#[derive(Debug, Clone, Default)]
pub struct Frontmatter {
    pub title: Option<String>,
    pub excerpt: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
    pub featured_image: Option<String>,
    pub no_federate: bool,
    pub sensitive: bool,
    pub spoiler_text: Option<String>,
    pub in_reply_to: Option<String>,
    // Event
    pub start_date_time: Option<String>,
    pub start_date: Option<String>,
    pub date: Option<String>,
    pub end_date_time: Option<String>,
    pub location_name: Option<String>,
    // Video
    pub url: Option<String>,
    pub embed_url: Option<String>,
    pub duration_secs: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub image: Option<String>,
}

/// A content record handed over by the publishing site
#[derive(Debug, Clone, Default)]
pub struct LocalContent {
    pub slug: String,
    /// Internal content type: blog, note, product, event, …
    pub kind: String,
    pub content: Option<String>,
    pub visibility: Option<String>,
    pub published_at: Option<String>,
    pub updated_at: Option<String>,
    pub author_handle: String,
    pub frontmatter: Frontmatter,
}

impl LocalContent {
    pub fn visibility(&self, config: &FederationConfig) -> Visibility {
        Visibility::parse(
            self.visibility
                .as_deref()
                .unwrap_or(&config.federation.default_visibility),
        )
    }
}

/// AS object type for an internal content type
pub fn as_type_for(kind: &str) -> &'static str {
    match kind {
        "blog" | "blog-post" => "Article",
        "note" => "Note",
        "product" => "Page",
        "profile" => "Person",
        "event" | "program" => "Event",
        "video" => "Video",
        "image" => "Image",
        "document" => "Document",
        _ => "Object",
    }
}

/// URL path segment for an internal content type
pub fn type_path_for(kind: &str) -> &'static str {
    match kind {
        "blog" | "blog-post" => "blog",
        "note" => "notes",
        "product" => "products",
        "event" => "events",
        "program" => "programs",
        "video" => "videos",
        "profile" => "profiles",
        "image" => "images",
        "document" => "docs",
        _ => "content",
    }
}

/// `{base}/ap/content/{typePath}/{slug}`
pub fn object_id(config: &FederationConfig, content: &LocalContent) -> String {
    format!(
        "{}/ap/content/{}/{}",
        config.base_url(),
        type_path_for(&content.kind),
        content.slug
    )
}

/// `{base}/ap/activities/{type-lowercase}/{slug}-{epoch-ms}`
pub fn activity_id(config: &FederationConfig, activity_type: &str, slug: &str) -> String {
    format!(
        "{}/ap/activities/{}/{}-{}",
        config.base_url(),
        activity_type.to_lowercase(),
        slug,
        chrono::Utc::now().timestamp_millis()
    )
}

/// Computed `to`/`cc` lists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Addressing {
    pub to: Vec<String>,
    pub cc: Vec<String>,
}

/// The visibility → addressing table
pub fn addressing_for(
    visibility: Visibility,
    actor_uri: &str,
    followers_uri: &str,
) -> Addressing {
    match visibility {
        Visibility::Public => Addressing {
            to: vec![PUBLIC_SENTINEL.to_string()],
            cc: vec![followers_uri.to_string()],
        },
        Visibility::Unlisted => Addressing {
            to: vec![followers_uri.to_string()],
            cc: vec![PUBLIC_SENTINEL.to_string()],
        },
        Visibility::Followers => Addressing {
            to: vec![followers_uri.to_string()],
            cc: Vec::new(),
        },
        Visibility::Private => Addressing {
            to: vec![actor_uri.to_string()],
            cc: Vec::new(),
        },
        Visibility::Direct => Addressing {
            to: Vec::new(),
            cc: Vec::new(),
        },
    }
}

/// Addressing with mentioned actors appended
///
/// Mentions land in `cc` for public/unlisted and in `to` for
/// followers/direct.
pub fn addressing_with_mentions(
    visibility: Visibility,
    actor_uri: &str,
    followers_uri: &str,
    mention_hrefs: &[String],
) -> Addressing {
    let mut addressing = addressing_for(visibility, actor_uri, followers_uri);
    match visibility {
        Visibility::Public | Visibility::Unlisted => {
            for href in mention_hrefs {
                if !addressing.cc.contains(href) {
                    addressing.cc.push(href.clone());
                }
            }
        }
        Visibility::Followers | Visibility::Direct => {
            for href in mention_hrefs {
                if !addressing.to.contains(href) {
                    addressing.to.push(href.clone());
                }
            }
        }
        Visibility::Private => {}
    }
    addressing
}

fn hashtag_tag(config: &FederationConfig, raw: &str) -> Tag {
    Tag::hashtag(
        format!("{}/tags/{}", config.base_url(), urlencoding::encode(raw)),
        format!("#{}", raw),
    )
}

fn mention_tag(config: &FederationConfig, mention: &Mention) -> Tag {
    Tag::mention(mention.href(config), mention.name())
}

/// ISO-8601 duration from whole seconds
fn iso8601_duration(secs: u64) -> String {
    format!("PT{}S", secs)
}

/// The publish gate
///
/// Content is not federated when its visibility is private or direct, when
/// frontmatter opts out, or when it was never published. Profiles are
/// exempt from the published requirement.
pub fn should_federate(content: &LocalContent, config: &FederationConfig) -> bool {
    if content.frontmatter.no_federate {
        return false;
    }
    match content.visibility(config) {
        Visibility::Private | Visibility::Direct => return false,
        _ => {}
    }
    content.published_at.is_some() || content.kind == "profile"
}

/// Convert a content record to its AS object, with addressing applied
pub fn to_object(config: &FederationConfig, content: &LocalContent) -> ApObject {
    let actor_uri = config.actor_uri(&content.author_handle);
    let followers_uri = config.followers_uri(&content.author_handle);
    let visibility = content.visibility(config);

    let text_body = content.content.clone().unwrap_or_default();
    let mentions = text::parse_mentions(&text_body);
    let mention_hrefs: Vec<String> = mentions.iter().map(|m| m.href(config)).collect();
    let addressing =
        addressing_with_mentions(visibility, &actor_uri, &followers_uri, &mention_hrefs);

    let fm = &content.frontmatter;
    let mut object = ApObject {
        id: Some(object_id(config, content)),
        kind: Some(as_type_for(&content.kind).to_string()),
        attributed_to: Some(actor_uri.clone()),
        published: content.published_at.clone(),
        updated: content.updated_at.clone(),
        to: addressing.to,
        cc: addressing.cc,
        ..Default::default()
    };

    match as_type_for(&content.kind) {
        "Article" => {
            object.name = Some(fm.title.clone().unwrap_or_else(|| content.slug.clone()));
            object.summary = fm.excerpt.clone().or_else(|| fm.description.clone());
            object.content = content.content.clone();
            if let Some(featured) = &fm.featured_image {
                object.attachment = vec![Attachment::image(featured.clone())];
            }
            object.tag = fm
                .tags
                .iter()
                .chain(fm.categories.iter())
                .map(|raw| hashtag_tag(config, raw))
                .collect();
        }
        "Note" => {
            object.content = content.content.clone();
            object.sensitive = Some(fm.sensitive);
            object.summary = fm.spoiler_text.clone();
            object.in_reply_to = fm.in_reply_to.clone();
            let mut tags: Vec<Tag> = text::parse_hashtags(&text_body)
                .iter()
                .map(|raw| hashtag_tag(config, raw))
                .collect();
            tags.extend(mentions.iter().map(|m| mention_tag(config, m)));
            object.tag = tags;
        }
        "Event" => {
            object.name = Some(fm.title.clone().unwrap_or_else(|| content.slug.clone()));
            object.content = content.content.clone();
            object.start_time = fm
                .start_date_time
                .clone()
                .or_else(|| fm.start_date.clone())
                .or_else(|| fm.date.clone())
                .or_else(|| content.published_at.clone());
            object.end_time = fm.end_date_time.clone();
            object.location = fm.location_name.clone().map(Place::named);
        }
        "Video" => {
            object.name = Some(fm.title.clone().unwrap_or_else(|| content.slug.clone()));
            object.content = content.content.clone();
            object.url = fm.url.clone().or_else(|| fm.embed_url.clone());
            object.duration = fm.duration_secs.map(iso8601_duration);
            object.width = fm.width;
            object.height = fm.height;
            if let Some(image) = &fm.image {
                object.attachment = vec![Attachment::named_image(
                    image.clone(),
                    "thumbnail".to_string(),
                )];
            }
        }
        "Person" => {
            return profile_object(config, content);
        }
        _ => {
            object.name = fm.title.clone();
            object.summary = fm.excerpt.clone().or_else(|| fm.description.clone());
            object.content = content.content.clone();
            object.url = fm.url.clone();
        }
    }

    object
}

/// The Person object emitted for profile content
fn profile_object(config: &FederationConfig, content: &LocalContent) -> ApObject {
    let handle = &content.author_handle;
    let actor_uri = config.actor_uri(handle);
    let mut extra = serde_json::Map::new();
    extra.insert("preferredUsername".to_string(), Value::String(handle.clone()));
    extra.insert(
        "inbox".to_string(),
        Value::String(config.inbox_uri(handle)),
    );
    extra.insert(
        "outbox".to_string(),
        Value::String(config.outbox_uri(handle)),
    );
    extra.insert(
        "followers".to_string(),
        Value::String(config.followers_uri(handle)),
    );
    extra.insert(
        "following".to_string(),
        Value::String(config.following_uri(handle)),
    );
    extra.insert(
        "liked".to_string(),
        Value::String(config.liked_uri(handle)),
    );
    extra.insert("discoverable".to_string(), Value::Bool(true));
    extra.insert("manuallyApprovesFollowers".to_string(), Value::Bool(false));

    ApObject {
        id: Some(actor_uri.clone()),
        kind: Some("Person".to_string()),
        name: content.frontmatter.title.clone(),
        summary: content
            .frontmatter
            .excerpt
            .clone()
            .or_else(|| content.frontmatter.description.clone()),
        url: Some(actor_uri),
        extra,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn test_config() -> FederationConfig {
        FederationConfig::for_base_url("https://example.com", PathBuf::from(".ap"))
    }

    fn blog_post() -> LocalContent {
        LocalContent {
            slug: "test-post".to_string(),
            kind: "blog".to_string(),
            content: Some("Hello".to_string()),
            visibility: Some("public".to_string()),
            published_at: Some("2024-01-01T00:00:00Z".to_string()),
            author_handle: "alice".to_string(),
            frontmatter: Frontmatter {
                title: Some("Test Post".to_string()),
                excerpt: Some("A test".to_string()),
                tags: vec!["t1".to_string()],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn addressing_table_holds_exactly() {
        let actor = "https://example.com/@alice";
        let followers = "https://example.com/@alice/followers";

        let public = addressing_for(Visibility::Public, actor, followers);
        assert_eq!(public.to, vec![PUBLIC_SENTINEL.to_string()]);
        assert_eq!(public.cc, vec![followers.to_string()]);

        let unlisted = addressing_for(Visibility::Unlisted, actor, followers);
        assert_eq!(unlisted.to, vec![followers.to_string()]);
        assert_eq!(unlisted.cc, vec![PUBLIC_SENTINEL.to_string()]);

        let followers_only = addressing_for(Visibility::Followers, actor, followers);
        assert_eq!(followers_only.to, vec![followers.to_string()]);
        assert!(followers_only.cc.is_empty());

        let private = addressing_for(Visibility::Private, actor, followers);
        assert_eq!(private.to, vec![actor.to_string()]);
        assert!(private.cc.is_empty());

        let direct = addressing_for(Visibility::Direct, actor, followers);
        assert!(direct.to.is_empty());
        assert!(direct.cc.is_empty());
    }

    #[test]
    fn mentions_append_to_cc_or_to() {
        let actor = "https://example.com/@alice";
        let followers = "https://example.com/@alice/followers";
        let bob = vec!["https://mastodon.social/@bob".to_string()];

        let public = addressing_with_mentions(Visibility::Public, actor, followers, &bob);
        assert!(public.cc.contains(&bob[0]));
        assert!(!public.to.contains(&bob[0]));

        let direct = addressing_with_mentions(Visibility::Direct, actor, followers, &bob);
        assert_eq!(direct.to, bob);
        assert!(direct.cc.is_empty());

        let followers_vis = addressing_with_mentions(Visibility::Followers, actor, followers, &bob);
        assert!(followers_vis.to.contains(&bob[0]));
    }

    #[test]
    fn unknown_visibility_falls_back_to_public() {
        assert_eq!(Visibility::parse("friends-of-friends"), Visibility::Public);
    }

    #[test]
    fn blog_maps_to_article() {
        let config = test_config();
        let object = to_object(&config, &blog_post());

        assert_eq!(object.kind.as_deref(), Some("Article"));
        assert_eq!(
            object.id.as_deref(),
            Some("https://example.com/ap/content/blog/test-post")
        );
        assert_eq!(object.name.as_deref(), Some("Test Post"));
        assert_eq!(object.summary.as_deref(), Some("A test"));
        assert_eq!(object.content.as_deref(), Some("Hello"));
        assert_eq!(object.to, vec![PUBLIC_SENTINEL.to_string()]);
        assert_eq!(
            object.cc,
            vec!["https://example.com/@alice/followers".to_string()]
        );
        assert_eq!(object.tag.len(), 1);
        assert_eq!(object.tag[0].name, "#t1");
        assert_eq!(object.tag[0].href, "https://example.com/tags/t1");
    }

    #[test]
    fn article_title_falls_back_to_slug() {
        let config = test_config();
        let mut content = blog_post();
        content.frontmatter.title = None;
        let object = to_object(&config, &content);
        assert_eq!(object.name.as_deref(), Some("test-post"));
    }

    #[test]
    fn note_carries_mentions_and_hashtags() {
        let config = test_config();
        let content = LocalContent {
            slug: "n1".to_string(),
            kind: "note".to_string(),
            content: Some("cc @bob@mastodon.social about #rust".to_string()),
            visibility: Some("public".to_string()),
            published_at: Some("2024-01-01T00:00:00Z".to_string()),
            author_handle: "alice".to_string(),
            frontmatter: Frontmatter {
                sensitive: true,
                spoiler_text: Some("cw".to_string()),
                in_reply_to: Some("https://mastodon.social/notes/5".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let object = to_object(&config, &content);

        assert_eq!(object.kind.as_deref(), Some("Note"));
        assert_eq!(
            object.id.as_deref(),
            Some("https://example.com/ap/content/notes/n1")
        );
        assert_eq!(object.sensitive, Some(true));
        assert_eq!(object.summary.as_deref(), Some("cw"));
        assert_eq!(
            object.in_reply_to.as_deref(),
            Some("https://mastodon.social/notes/5")
        );

        let kinds: Vec<&str> = object.tag.iter().map(|t| t.kind.as_str()).collect();
        assert_eq!(kinds, vec!["Hashtag", "Mention"]);
        assert_eq!(object.tag[1].href, "https://mastodon.social/@bob");
        assert_eq!(object.tag[1].name, "@bob@mastodon.social");
        // The mentioned remote goes into cc for public visibility
        assert!(object
            .cc
            .contains(&"https://mastodon.social/@bob".to_string()));
    }

    #[test]
    fn event_derives_start_time_chain() {
        let config = test_config();
        let mut content = LocalContent {
            slug: "meetup".to_string(),
            kind: "event".to_string(),
            visibility: Some("public".to_string()),
            published_at: Some("2024-01-01T00:00:00Z".to_string()),
            author_handle: "alice".to_string(),
            frontmatter: Frontmatter {
                start_date_time: Some("2024-05-01T18:00:00Z".to_string()),
                end_date_time: Some("2024-05-01T20:00:00Z".to_string()),
                location_name: Some("Town Hall".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let object = to_object(&config, &content);
        assert_eq!(object.kind.as_deref(), Some("Event"));
        assert_eq!(object.start_time.as_deref(), Some("2024-05-01T18:00:00Z"));
        assert_eq!(object.end_time.as_deref(), Some("2024-05-01T20:00:00Z"));
        assert_eq!(object.location.as_ref().unwrap().name, "Town Hall");
        assert_eq!(object.location.as_ref().unwrap().kind, "Place");

        // Falls back through startDate, date, published
        content.frontmatter.start_date_time = None;
        let object = to_object(&config, &content);
        assert_eq!(object.start_time.as_deref(), Some("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn video_carries_dimensions_and_thumbnail() {
        let config = test_config();
        let content = LocalContent {
            slug: "clip".to_string(),
            kind: "video".to_string(),
            visibility: Some("public".to_string()),
            published_at: Some("2024-01-01T00:00:00Z".to_string()),
            author_handle: "alice".to_string(),
            frontmatter: Frontmatter {
                embed_url: Some("https://example.com/embed/clip".to_string()),
                duration_secs: Some(95),
                width: Some(1280),
                height: Some(720),
                image: Some("https://example.com/thumbs/clip.jpg".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let object = to_object(&config, &content);
        assert_eq!(object.kind.as_deref(), Some("Video"));
        assert_eq!(
            object.url.as_deref(),
            Some("https://example.com/embed/clip")
        );
        assert_eq!(object.duration.as_deref(), Some("PT95S"));
        assert_eq!(object.width, Some(1280));
        assert_eq!(object.height, Some(720));
        assert_eq!(object.attachment[0].name.as_deref(), Some("thumbnail"));
    }

    #[test]
    fn profile_emits_person_with_endpoints() {
        let config = test_config();
        let content = LocalContent {
            slug: "alice".to_string(),
            kind: "profile".to_string(),
            author_handle: "alice".to_string(),
            ..Default::default()
        };
        let object = to_object(&config, &content);
        let value = object.to_value();
        assert_eq!(value["type"], "Person");
        assert_eq!(value["id"], "https://example.com/@alice");
        assert_eq!(value["inbox"], "https://example.com/@alice/inbox");
        assert_eq!(value["outbox"], "https://example.com/@alice/outbox");
        assert_eq!(value["liked"], "https://example.com/@alice/liked");
        assert_eq!(value["discoverable"], true);
        assert_eq!(value["manuallyApprovesFollowers"], false);
    }

    #[test]
    fn publish_gate() {
        let config = test_config();
        let mut content = blog_post();
        assert!(should_federate(&content, &config));

        content.visibility = Some("private".to_string());
        assert!(!should_federate(&content, &config));
        content.visibility = Some("direct".to_string());
        assert!(!should_federate(&content, &config));

        content.visibility = Some("public".to_string());
        content.frontmatter.no_federate = true;
        assert!(!should_federate(&content, &config));
        content.frontmatter.no_federate = false;

        content.published_at = None;
        assert!(!should_federate(&content, &config));

        // Profiles are exempt from the published requirement
        content.kind = "profile".to_string();
        assert!(should_federate(&content, &config));
    }

    #[test]
    fn activity_id_embeds_type_and_slug() {
        let config = test_config();
        let id = activity_id(&config, "Create", "test-post");
        assert!(id.starts_with("https://example.com/ap/activities/create/test-post-"));
        let suffix = id.rsplit('-').next().unwrap();
        assert!(suffix.chars().all(|c| c.is_ascii_digit()));
    }
}

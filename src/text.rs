//! Mention and hashtag parsing
//!
//! Mentions are `@user` or `@user@domain.tld`; hashtags are `#tag` not
//! preceded by a word character. Both parsers return first-occurrence
//! order; hashtags are de-duplicated case-insensitively.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::FederationConfig;

static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@([A-Za-z0-9_-]+)(?:@([A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}))?")
        .expect("invalid mention regex")
});

static HASHTAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#([A-Za-z0-9_]+)").expect("invalid hashtag regex"));

/// A parsed `@user[@domain]` mention
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    pub handle: String,
    /// None for bare `@user` mentions, which refer to local actors
    pub domain: Option<String>,
}

impl Mention {
    /// `@handle` or `@handle@domain`
    pub fn name(&self) -> String {
        match &self.domain {
            Some(domain) => format!("@{}@{}", self.handle, domain),
            None => format!("@{}", self.handle),
        }
    }

    /// True when the mention refers to an actor on this instance
    pub fn is_local(&self, config: &FederationConfig) -> bool {
        match &self.domain {
            None => true,
            Some(domain) => *domain == config.instance_domain(),
        }
    }

    /// Actor URI the mention resolves to
    pub fn href(&self, config: &FederationConfig) -> String {
        if self.is_local(config) {
            config.actor_uri(&self.handle)
        } else {
            let domain = self.domain.as_deref().expect("remote mention has a domain");
            format!("https://{}/@{}", domain, self.handle)
        }
    }

    fn dedup_key(&self) -> String {
        self.name().to_lowercase()
    }
}

/// Word characters never directly precede a mention or hashtag sigil
fn preceded_by_word_char(text: &str, offset: usize) -> bool {
    text[..offset]
        .chars()
        .next_back()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse mentions in first-occurrence order, de-duplicated
pub fn parse_mentions(text: &str) -> Vec<Mention> {
    let mut seen = std::collections::HashSet::new();
    let mut mentions = Vec::new();
    for captures in MENTION_RE.captures_iter(text) {
        let whole = captures.get(0).expect("match has a range");
        if preceded_by_word_char(text, whole.start()) {
            continue;
        }
        let mention = Mention {
            handle: captures[1].to_string(),
            domain: captures.get(2).map(|m| m.as_str().to_string()),
        };
        if seen.insert(mention.dedup_key()) {
            mentions.push(mention);
        }
    }
    mentions
}

/// Parse hashtags in first-occurrence order
///
/// De-duplication is case-insensitive; the first spelling wins.
pub fn parse_hashtags(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut hashtags = Vec::new();
    for captures in HASHTAG_RE.captures_iter(text) {
        let whole = captures.get(0).expect("match has a range");
        if preceded_by_word_char(text, whole.start()) {
            continue;
        }
        let raw = captures[1].to_string();
        if seen.insert(raw.to_lowercase()) {
            hashtags.push(raw);
        }
    }
    hashtags
}

/// True when `offset` falls inside an unclosed `<a …>` range
fn inside_anchor(text: &str, offset: usize) -> bool {
    let before = &text[..offset];
    let last_open = before.rfind("<a ").or_else(|| before.rfind("<a>"));
    let last_close = before.rfind("</a>");
    match (last_open, last_close) {
        (Some(open), Some(close)) => open > close,
        (Some(_), None) => true,
        _ => false,
    }
}

/// Substitute mention and hashtag occurrences with anchors
///
/// Ranges already inside an existing anchor are left untouched.
pub fn linkify(text: &str, config: &FederationConfig) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum MatchKind {
        Mention,
        Hashtag,
    }

    let mut matches: Vec<(usize, usize, MatchKind)> = Vec::new();
    for m in MENTION_RE.find_iter(text) {
        if !preceded_by_word_char(text, m.start()) {
            matches.push((m.start(), m.end(), MatchKind::Mention));
        }
    }
    for m in HASHTAG_RE.find_iter(text) {
        if !preceded_by_word_char(text, m.start()) {
            matches.push((m.start(), m.end(), MatchKind::Hashtag));
        }
    }
    matches.sort_by_key(|(start, _, _)| *start);

    let mut output = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, end, kind) in matches {
        if start < cursor || inside_anchor(text, start) {
            continue;
        }
        output.push_str(&text[cursor..start]);
        let matched = &text[start..end];
        match kind {
            MatchKind::Mention => {
                let captures = MENTION_RE.captures(matched).expect("matched above");
                let mention = Mention {
                    handle: captures[1].to_string(),
                    domain: captures.get(2).map(|m| m.as_str().to_string()),
                };
                output.push_str(&format!(
                    "<a href=\"{}\" class=\"u-url mention\">{}</a>",
                    mention.href(config),
                    matched
                ));
            }
            MatchKind::Hashtag => {
                let raw = &matched[1..];
                output.push_str(&format!(
                    "<a href=\"{}/tags/{}\" class=\"hashtag\" rel=\"tag\">{}</a>",
                    config.base_url(),
                    urlencoding::encode(raw),
                    matched
                ));
            }
        }
        cursor = end;
    }
    output.push_str(&text[cursor..]);
    output
}

/// Strip markup and truncate to `max_chars` characters
///
/// Used for notification excerpts of remote content.
pub fn excerpt(html: &str, max_chars: usize) -> String {
    let mut plain = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => plain.push(c),
            _ => {}
        }
    }
    plain.chars().take(max_chars).collect()
}

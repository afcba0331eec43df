//! Automatic facet detection: links, `@mentions` and `#tags`.
//!
//! Follows what Bluesky clients do when they render plain text into rich
//! text, so posts look the same as ones written in the official app.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use crate::facet::{Facet, FacetFeature};
use crate::grapheme::grapheme_count;

/// Turns a handle (without `@`) into a DID.
#[async_trait]
pub trait HandleResolver: Send + Sync {
    /// `None` if the handle does not resolve; the mention is then left as
    /// plain text.
    async fn resolve_handle(&self, handle: &str) -> Option<String>;
}

/// Resolver that never resolves anything, for when there is no session.
pub struct NoHandleResolver;

#[async_trait]
impl HandleResolver for NoHandleResolver {
    async fn resolve_handle(&self, _handle: &str) -> Option<String> {
        None
    }
}

pub const MAX_TAG_GRAPHEMES: usize = 64;

/// TLDs accepted for bare (scheme-less) domains like `example.com/a`.
const KNOWN_TLDS: &[&str] = &[
    "ai", "app", "art", "asia", "at", "au", "be", "biz", "blog", "br", "ca", "ch", "club", "cn",
    "co", "com", "cz", "de", "dev", "dk", "edu", "es", "eu", "fi", "fm", "fr", "gg", "gov", "hk",
    "in", "info", "io", "it", "jp", "kr", "ly", "me", "net", "news", "nl", "no", "nz", "online",
    "org", "page", "pl", "ru", "se", "sh", "site", "social", "tech", "to", "tv", "tw", "uk", "us",
    "xyz",
];

static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)(?:^|\s|\()((?:https?://\S+)|(?:(?P<domain>[a-z][a-z0-9]*(?:\.[a-z0-9]+)+)\S*))",
    )
    .expect("valid link regex")
});

static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(?:^|\s|\()@([a-zA-Z0-9.-]+)\b").expect("valid mention regex")
});

static HANDLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?$",
    )
    .expect("valid handle regex")
});

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)(?:^|\s)([#＃])(\S+)").expect("valid tag regex"));

static TAG_TRAILING_PUNCTUATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\p{P}+$").expect("valid tag punctuation regex"));

static NUMERIC_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9\p{P}]+$").expect("valid numeric tag regex"));

/// Detect all facets in `text`, ordered by start offset.
pub async fn detect_facets(text: &str, resolver: &dyn HandleResolver) -> Vec<Facet> {
    let mut facets = Vec::new();

    for (range, handle) in mention_candidates(text) {
        if let Some(did) = resolver.resolve_handle(&handle).await {
            facets.push(Facet::new(range, FacetFeature::Mention { did }));
        }
    }

    facets.extend(detect_links(text));
    facets.extend(detect_tags(text));

    facets.sort_by_key(|f| f.index.byte_start);
    facets
}

/// Link facets only. Needs no resolver, so it is synchronous.
pub fn detect_links(text: &str) -> Vec<Facet> {
    let mut facets = Vec::new();

    for caps in LINK_RE.captures_iter(text) {
        let Some(m) = caps.get(1) else {
            continue;
        };

        let mut matched = m.as_str();
        let is_bare = caps.name("domain").is_some();
        if let Some(domain) = caps.name("domain") {
            let tld = domain
                .as_str()
                .rsplit('.')
                .next()
                .unwrap_or_default()
                .to_ascii_lowercase();
            if !KNOWN_TLDS.contains(&tld.as_str()) {
                continue;
            }
        }

        matched = matched.trim_end_matches(['.', ',', ';', ':', '!', '?']);
        if matched.ends_with(')') && !matched.contains('(') {
            matched = &matched[..matched.len() - 1];
        }

        let uri = if is_bare {
            format!("https://{matched}")
        } else {
            matched.to_owned()
        };
        let start = m.start();
        facets.push(Facet::link(start..start + matched.len(), uri));
    }

    facets
}

/// Tag facets only.
pub fn detect_tags(text: &str) -> Vec<Facet> {
    let mut facets = Vec::new();

    for caps in TAG_RE.captures_iter(text) {
        let (Some(hash), Some(body)) = (caps.get(1), caps.get(2)) else {
            continue;
        };

        let body_start = body.start();
        let body = body.as_str();
        let tag = match TAG_TRAILING_PUNCTUATION_RE.find(body) {
            Some(punctuation) => &body[..punctuation.start()],
            None => body,
        };
        if tag.is_empty()
            || tag.starts_with(['\u{fe0f}', '\u{20e3}'])
            || MAX_TAG_GRAPHEMES < grapheme_count(tag)
            || NUMERIC_TAG_RE.is_match(tag)
        {
            continue;
        }

        let start = hash.start();
        facets.push(Facet::new(
            start..body_start + tag.len(),
            FacetFeature::Tag {
                tag: tag.to_owned(),
            },
        ));
    }

    facets
}

fn mention_candidates(text: &str) -> Vec<(std::ops::Range<usize>, String)> {
    MENTION_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let handle = caps.get(1)?;
            if 253 < handle.len() || !HANDLE_RE.is_match(handle.as_str()) {
                return None;
            }
            // The range covers the `@` as well.
            Some((handle.start() - 1..handle.end(), handle.as_str().to_owned()))
        })
        .collect()
}

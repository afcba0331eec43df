//! Post text composition.
//!
//! Three styles are supported:
//!
//! * short form ([`compose_short_form`]): `title + "\n" + link`, with the
//!   title cut to a grapheme threshold. The destination detects the URL by
//!   itself, so no facets are produced.
//! * long form ([`compose_long_form`]): `description + "\n" + key`, falling
//!   back to a cut title when over [`POST_MAX_GRAPHEMES`]. `key` is a short
//!   `host/path...` rendering of the link, made clickable by a trailing link
//!   facet.
//! * title with source ([`compose_title_with_source`]): the title alone,
//!   cut so a trailing `(Source: URL)` marker survives.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use snafu::{ResultExt as _, Snafu};
use url::Url;

use crate::detect::{HandleResolver, detect_facets};
use crate::facet::Facet;
use crate::grapheme::{grapheme_count, take_graphemes};

/// Bluesky's post length limit.
pub const POST_MAX_GRAPHEMES: usize = 300;

/// Title budget of the short form, which leaves room for an URL.
pub const SHORT_FORM_TITLE_MAX_GRAPHEMES: usize = 118;

/// How much of `host + path` goes into the link key.
pub const LINK_KEY_MAX_GRAPHEMES: usize = 19;

pub const ELLIPSIS: &str = "...\n";

const SOURCE_MARKER_SEPARATOR: &str = "...\n\n";

static SOURCE_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)^(.*)(\(Source: https?://[-_.!~*'()a-zA-Z0-9;/?:@&=+$,%#\x{3000}-\x{30FE}\x{4E00}-\x{9FA0}\x{FF01}-\x{FFE3}]+\))",
    )
    .expect("valid source marker regex")
});

#[derive(Debug, Snafu)]
pub enum ComposeError {
    #[snafu(display("Invalid link {link:?}"))]
    InvalidLink {
        link: String,
        source: url::ParseError,
    },
}

pub type ComposeResult<T> = std::result::Result<T, ComposeError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComposedPost {
    pub text: String,
    pub facets: Vec<Facet>,
    pub source_url: String,
}

/// Parse an entry link. Links without a host (`mailto:` and the like) are
/// rejected as well, since there would be nothing to build a key from.
pub fn parse_link(link: &str) -> ComposeResult<Url> {
    let url = Url::parse(link).context(InvalidLinkSnafu { link })?;
    if url.host_str().is_none() {
        return Err(url::ParseError::EmptyHost).context(InvalidLinkSnafu { link });
    }
    Ok(url)
}

/// First [`LINK_KEY_MAX_GRAPHEMES`] graphemes of `host[:port]/path`, followed
/// by [`ELLIPSIS`]. Query and fragment are left out.
pub fn link_key(url: &Url) -> String {
    let mut host_path = url.host_str().unwrap_or_default().to_owned();
    if let Some(port) = url.port() {
        host_path.push(':');
        host_path.push_str(&port.to_string());
    }
    host_path.push_str(url.path());

    format!(
        "{}{ELLIPSIS}",
        take_graphemes(&host_path, LINK_KEY_MAX_GRAPHEMES)
    )
}

pub fn short_form_text(title: &str, link: &str, threshold: usize) -> String {
    if grapheme_count(title) <= threshold {
        return format!("{title}\n{link}");
    }

    let budget = threshold.saturating_sub(grapheme_count(ELLIPSIS));
    format!("{}{ELLIPSIS}{link}", take_graphemes(title, budget))
}

pub fn compose_short_form(title: &str, link: &str, threshold: usize) -> ComposeResult<ComposedPost> {
    parse_link(link)?;
    Ok(ComposedPost {
        text: short_form_text(title, link, threshold),
        facets: vec![],
        source_url: link.to_owned(),
    })
}

/// Long form text ending in `key`.
///
/// The description is used when it fits. Otherwise the title is cut so that
/// `title + ELLIPSIS + key` fits in [`POST_MAX_GRAPHEMES`].
pub fn long_form_text(title: &str, description: &str, key: &str) -> String {
    let text = format!("{description}\n{key}");
    if grapheme_count(&text) <= POST_MAX_GRAPHEMES {
        return text;
    }

    let budget = POST_MAX_GRAPHEMES.saturating_sub(grapheme_count(&format!("{ELLIPSIS}{key}")));
    format!("{}{ELLIPSIS}{key}", take_graphemes(title, budget))
}

/// Link facet covering the trailing `key` of `text`.
///
/// `text` must end with `key`. Offsets are in bytes.
pub fn trailing_link_facet(text: &str, key: &str, link: &str) -> Facet {
    debug_assert!(text.ends_with(key));
    Facet::link(text.len() - key.len()..text.len(), link)
}

pub async fn compose_long_form(
    title: &str,
    description: &str,
    link: &str,
    resolver: &dyn HandleResolver,
) -> ComposeResult<ComposedPost> {
    let url = parse_link(link)?;
    let key = link_key(&url);
    let text = long_form_text(title, description, &key);

    // Detected facets may overlap the key; they are kept as they are.
    let mut facets = detect_facets(&text, resolver).await;
    facets.push(trailing_link_facet(&text, &key, link));

    Ok(ComposedPost {
        text,
        facets,
        source_url: link.to_owned(),
    })
}

/// Split off the last `(Source: URL)` marker.
///
/// Returns the text before the marker and the marker itself. Anything after
/// the marker is dropped.
pub fn split_source_marker(text: &str) -> Option<(&str, &str)> {
    let caps = SOURCE_MARKER_RE.captures(text)?;
    Some((caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}

pub fn title_with_source_text(title: &str, max: usize) -> String {
    if grapheme_count(title) <= max {
        return title.to_owned();
    }

    // With no room left for the body the marker is not kept.
    let marker_len =
        |marker: &str| grapheme_count(marker) + grapheme_count(SOURCE_MARKER_SEPARATOR);
    match split_source_marker(title).filter(|(_, marker)| marker_len(marker) < max) {
        Some((body, marker)) => format!(
            "{}{SOURCE_MARKER_SEPARATOR}{marker}",
            take_graphemes(body, max - marker_len(marker))
        ),
        None => format!("{}...", take_graphemes(title, max.saturating_sub(3))),
    }
}

pub async fn compose_title_with_source(
    title: &str,
    link: &str,
    max: usize,
    resolver: &dyn HandleResolver,
) -> ComposeResult<ComposedPost> {
    parse_link(link)?;
    let text = title_with_source_text(title, max);
    let facets = detect_facets(&text, resolver).await;

    Ok(ComposedPost {
        text,
        facets,
        source_url: link.to_owned(),
    })
}

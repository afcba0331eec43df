//! `app.bsky.richtext.facet` records.
//!
//! Facet ranges are byte offsets into the UTF-8 encoding of the post text,
//! which for a Rust `&str` are just its native indices.

use std::ops::Range;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

impl ByteSlice {
    pub fn range(self) -> Range<usize> {
        self.byte_start..self.byte_end
    }
}

impl From<Range<usize>> for ByteSlice {
    fn from(range: Range<usize>) -> Self {
        Self {
            byte_start: range.start,
            byte_end: range.end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum FacetFeature {
    #[serde(rename = "app.bsky.richtext.facet#link")]
    Link { uri: String },
    #[serde(rename = "app.bsky.richtext.facet#mention")]
    Mention { did: String },
    #[serde(rename = "app.bsky.richtext.facet#tag")]
    Tag { tag: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facet {
    pub index: ByteSlice,
    pub features: Vec<FacetFeature>,
}

impl Facet {
    pub fn new(range: Range<usize>, feature: FacetFeature) -> Self {
        Self {
            index: range.into(),
            features: vec![feature],
        }
    }

    pub fn link(range: Range<usize>, uri: impl Into<String>) -> Self {
        Self::new(range, FacetFeature::Link { uri: uri.into() })
    }

    /// The part of `text` this facet annotates.
    ///
    /// `None` if the range is out of bounds or not on a char boundary.
    pub fn slice<'t>(&self, text: &'t str) -> Option<&'t str> {
        text.get(self.index.range())
    }

    /// Link target, if this is a link facet.
    pub fn link_uri(&self) -> Option<&str> {
        self.features.iter().find_map(|f| match f {
            FacetFeature::Link { uri } => Some(uri.as_str()),
            _ => None,
        })
    }
}

//! Grapheme cluster counting and slicing.
//!
//! Every length limit a post is checked against is expressed in extended
//! grapheme clusters, never in bytes or `char`s.

use unicode_segmentation::UnicodeSegmentation as _;

/// Number of extended grapheme clusters in `s`.
pub fn grapheme_count(s: &str) -> usize {
    s.graphemes(true).count()
}

/// The prefix of `s` holding at most `n` grapheme clusters.
///
/// Never splits a cluster, so the result is always valid on its own.
pub fn take_graphemes(s: &str, n: usize) -> &str {
    match s.grapheme_indices(true).nth(n) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_clusters_not_chars() {
        assert_eq!(grapheme_count(""), 0);
        assert_eq!(grapheme_count("abc"), 3);
        // e + combining acute accent
        assert_eq!(grapheme_count("e\u{301}"), 1);
        // family emoji joined with ZWJ
        assert_eq!(grapheme_count("👨‍👩‍👧"), 1);
        assert_eq!(grapheme_count("日本語"), 3);
        assert_eq!(grapheme_count("\r\n"), 1);
    }

    #[test]
    fn take_never_splits_a_cluster() {
        assert_eq!(take_graphemes("👨‍👩‍👧👍x", 1), "👨‍👩‍👧");
        assert_eq!(take_graphemes("👨‍👩‍👧👍x", 2), "👨‍👩‍👧👍");
        assert_eq!(take_graphemes("e\u{301}tude", 1), "e\u{301}");
    }

    #[test]
    fn take_past_end_returns_everything() {
        assert_eq!(take_graphemes("short", 19), "short");
        assert_eq!(take_graphemes("", 3), "");
        assert_eq!(take_graphemes("abc", 0), "");
    }
}

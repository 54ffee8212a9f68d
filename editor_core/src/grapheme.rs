//! Grapheme cluster helpers.
//!
//! Editor columns count user-perceived characters (extended grapheme
//! clusters), which may span several code points. These functions are the
//! single place where byte offsets and cluster indices meet.

use unicode_segmentation::UnicodeSegmentation;

/// Returns the number of extended grapheme clusters in `text`.
pub fn count(text: &str) -> usize {
    text.graphemes(true).count()
}

/// Returns the byte offset where the `index`-th grapheme cluster starts.
///
/// An index past the last cluster clamps to `text.len()`; an empty text
/// always maps to 0.
pub fn byte_offset(text: &str, index: usize) -> usize {
    text.grapheme_indices(true)
        .nth(index)
        .map(|(offset, _)| offset)
        .unwrap_or(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii() {
        assert_eq!(count("hello"), 5);
        assert_eq!(byte_offset("hello", 0), 0);
        assert_eq!(byte_offset("hello", 3), 3);
    }

    #[test]
    fn empty() {
        assert_eq!(count(""), 0);
        assert_eq!(byte_offset("", 0), 0);
        assert_eq!(byte_offset("", 5), 0);
    }

    #[test]
    fn combining_mark_is_one_cluster() {
        // "e" followed by U+0301 COMBINING ACUTE ACCENT
        let text = "e\u{0301}";
        assert_eq!(text.len(), 3);
        assert_eq!(count(text), 1);
        assert_eq!(byte_offset(text, 0), 0);
        assert_eq!(byte_offset(text, 1), 3);
    }

    #[test]
    fn multibyte_clusters() {
        let text = "aé漢🙂";
        assert_eq!(count(text), 4);
        assert_eq!(byte_offset(text, 1), 1);
        assert_eq!(byte_offset(text, 2), 3);
        assert_eq!(byte_offset(text, 3), 6);
        assert_eq!(byte_offset(text, 4), text.len());
    }

    #[test]
    fn zwj_emoji_is_one_cluster() {
        let family = "\u{1F468}\u{200D}\u{1F469}\u{200D}\u{1F467}";
        assert_eq!(count(family), 1);
        assert_eq!(byte_offset(family, 1), family.len());
    }

    #[test]
    fn index_clamps_past_end() {
        assert_eq!(byte_offset("ab", 7), 2);
    }
}

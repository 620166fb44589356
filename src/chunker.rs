//! Splitting (C5 step 2-3): the sliding-window chunker for dense recall
//! and the line-based article splitter for reranked output.

use regex::Regex;
use std::sync::OnceLock;

/// One sliding-window unit, offset is the window's *start* index into the
/// source content (character offsets, not cumulative chunk length).
#[derive(Debug, Clone, PartialEq)]
pub struct SplitChunk {
    pub offset: usize,
    pub length: usize,
    pub text: String,
}

/// One line-based unit, contiguous with its neighbors so the union of all
/// article intervals covers `[0, len(content))`. Offset and length are byte
/// positions into `content`, not character counts (article offsets are
/// defined in bytes; chunk offsets above are defined in characters).
#[derive(Debug, Clone, PartialEq)]
pub struct SplitArticle {
    pub offset: usize,
    pub length: usize,
    pub text: String,
    pub title: String,
}

fn title_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new("第[一二三四五六七八九十百千万零]+条").expect("static pattern is valid")
    })
}

/// Sliding window over `content`, windows of `chunk_size` characters
/// advancing by `chunk_size - chunk_overlap`. Caller guarantees
/// `0 <= chunk_overlap < chunk_size`. The last window may be short; an
/// empty trailing window is never produced.
pub fn split_into_chunks(content: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<SplitChunk> {
    let chars: Vec<char> = content.chars().collect();
    let len = chars.len();
    if len == 0 {
        return Vec::new();
    }

    let advance = chunk_size - chunk_overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + chunk_size).min(len);
        let text: String = chars[start..end].iter().collect();
        chunks.push(SplitChunk {
            offset: start,
            length: end - start,
            text,
        });
        if end == len {
            break;
        }
        start += advance;
    }
    chunks
}

/// Split `content` into one article per line (line separator included in
/// the article's text and length), extracting a best-effort title. Offset
/// and length are byte positions, matching the data model.
pub fn split_into_articles(content: &str) -> Vec<SplitArticle> {
    let mut articles = Vec::new();
    let mut offset = 0usize;
    for line in content.split_inclusive('\n') {
        let length = line.len();
        if length == 0 {
            continue;
        }
        let title = title_pattern()
            .find(line)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        articles.push(SplitArticle {
            offset,
            length,
            text: line.to_string(),
            title,
        });
        offset += length;
    }
    articles
}

/// Byte offset of the `char_offset`-th character in `content`, matching how
/// `str::char_indices` enumerates codepoints; `char_offset == content.chars().count()`
/// yields `content.len()`. Used to compare a character-offset chunk interval
/// against a byte-offset article interval on a common unit.
pub fn char_offset_to_byte(content: &str, char_offset: usize) -> usize {
    content
        .char_indices()
        .nth(char_offset)
        .map(|(b, _)| b)
        .unwrap_or(content.len())
}

/// Whether chunk interval `[cs, ce)` overlaps article interval `[as_, ae)`.
pub fn intervals_overlap(cs: usize, ce: usize, as_: usize, ae: usize) -> bool {
    !(ce <= as_ || cs >= ae)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAW_TEXT: &str = "第一条 合同成立。\n第二条 合同生效。\n";

    #[test]
    fn test_chunk_short_text_is_single_window() {
        let chunks = split_into_chunks("short", 100, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].offset, 0);
        assert_eq!(chunks[0].text, "short");
    }

    #[test]
    fn test_chunk_offsets_are_window_start_not_cumulative_length() {
        let content = "0123456789abcdefghij";
        let chunks = split_into_chunks(content, 10, 2);
        assert_eq!(chunks[0].offset, 0);
        assert_eq!(chunks[1].offset, 8);
        assert_eq!(chunks[0].text, "0123456789");
        assert_eq!(chunks[1].text, &content[8..18]);
    }

    #[test]
    fn test_chunk_empty_content_produces_no_chunks() {
        let chunks = split_into_chunks("", 10, 2);
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_chunk_last_window_may_be_short() {
        let content = "0123456789abc";
        let chunks = split_into_chunks(content, 10, 0);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].length, 3);
    }

    #[test]
    fn test_split_articles_covers_full_content() {
        let articles = split_into_articles(LAW_TEXT);
        assert_eq!(articles.len(), 2);
        let total: usize = articles.iter().map(|a| a.length).sum();
        assert_eq!(total, LAW_TEXT.len());
        assert_eq!(articles[0].title, "第一条");
        assert_eq!(articles[1].title, "第二条");
    }

    #[test]
    fn test_split_articles_offsets_are_bytes_not_chars() {
        // Multi-byte characters make byte and char offsets diverge for
        // this non-ASCII content: the second article starts at the byte
        // length of the first line, not its char count.
        let articles = split_into_articles(LAW_TEXT);
        let first_line_char_count = LAW_TEXT.split_inclusive('\n').next().unwrap().chars().count();
        assert_eq!(articles[1].offset, articles[0].length);
        assert_ne!(articles[1].offset, first_line_char_count);
    }

    #[test]
    fn test_char_offset_to_byte_matches_char_indices() {
        let content = "第一条 a";
        assert_eq!(char_offset_to_byte(content, 0), 0);
        assert_eq!(char_offset_to_byte(content, 1), "第".len());
        assert_eq!(char_offset_to_byte(content, content.chars().count()), content.len());
    }

    #[test]
    fn test_split_articles_unknown_title_when_no_match() {
        let articles = split_into_articles("no enumerator here\n");
        assert_eq!(articles[0].title, "unknown");
    }

    #[test]
    fn test_intervals_overlap() {
        assert!(intervals_overlap(0, 10, 5, 15));
        assert!(!intervals_overlap(0, 10, 10, 20));
        assert!(!intervals_overlap(10, 20, 0, 10));
    }
}

//! Fixed-width character chunking.
//!
//! Splits text into contiguous, non-overlapping slices of at most `chunk_size` characters.
//! Width is counted in `char`s, not bytes, so slices never split a UTF-8 sequence. The
//! splitter ignores word and token boundaries.

/// Default chunk width used when indexing files.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Split `content` into slices of at most `chunk_size` characters, in order.
///
/// The last slice may be shorter. Empty input yields no slices. A `chunk_size` of `0` is
/// treated as `1`.
///
/// # Examples
/// ```rust
/// use llm_cli::chunker::chunk_text;
///
/// assert_eq!(chunk_text("abcdefg", 3), vec!["abc", "def", "g"]);
/// assert!(chunk_text("", 3).is_empty());
/// ```
pub fn chunk_text(content: &str, chunk_size: usize) -> Vec<&str> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (idx, _) in content.char_indices() {
        if count == chunk_size {
            chunks.push(&content[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }

    if start < content.len() {
        chunks.push(&content[start..]);
    }

    chunks
}

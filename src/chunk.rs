//! Fixed-size overlapping text chunker.
//!
//! Splits text into windows of `chunk_size` characters where each window
//! starts `chunk_size - overlap` characters after the previous one, so
//! consecutive windows share exactly `overlap` characters. The final
//! window always ends at the end of the text. Sizes are counted in Unicode
//! scalar values, never bytes, so multi-byte text is never split inside a
//! character.
//!
//! # Example
//!
//! ```rust
//! use multimodal_rag::chunk::split_text;
//!
//! let windows = split_text("abcdefghij", 4, 1);
//! assert_eq!(windows, vec!["abcd", "defg", "ghij"]);
//! ```

use crate::models::{Chunk, ChunkKind};

/// Split `text` into overlapping windows.
///
/// Empty or whitespace-only text yields no windows, as do windows that
/// consist only of whitespace.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.trim().is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let step = chunk_size.saturating_sub(overlap).max(1);

    let mut windows = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(total);
        let window: String = chars[start..end].iter().collect();
        if !window.trim().is_empty() {
            windows.push(window);
        }
        if end == total {
            break;
        }
        start += step;
    }
    windows
}

/// Chunk one unit of text (a whole file or a single PDF page).
///
/// `first_index` is the running chunk index within the document; it feeds
/// the deterministic chunk id so pages of the same file never collide.
pub fn chunk_text(
    text: &str,
    source: &str,
    page: Option<u32>,
    kind: ChunkKind,
    chunk_size: usize,
    overlap: usize,
    first_index: usize,
) -> Vec<Chunk> {
    split_text(text, chunk_size, overlap)
        .into_iter()
        .enumerate()
        .map(|(i, window)| Chunk::new(window, source, page, kind, first_index + i))
        .collect()
}

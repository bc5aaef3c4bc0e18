//! Token-window text chunker.
//!
//! Splits cleaned document text into overlapping windows of at most
//! `chunk_size` tokens. The window advances by `chunk_size - overlap`
//! tokens each step, so neighbouring chunks share `overlap` tokens and a
//! concept straddling a boundary appears whole in at least one of them.
//!
//! Chunking is deterministic for a fixed tokenizer: the same text and
//! parameters always produce the same boundaries.

use std::ops::Range;
use std::sync::Arc;

use crate::error::ChunkError;
use crate::tokenizer::Tokenizer;

/// One window of the token stream, decoded back to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub index: usize,
    pub text: String,
    /// Token offset of the first token (inclusive).
    pub start: usize,
    /// Token offset past the last token (exclusive).
    pub end: usize,
}

impl TextChunk {
    pub fn token_count(&self) -> usize {
        self.end - self.start
    }
}

/// Collapse every run of whitespace (newlines included) to one space and
/// trim the ends.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Reject parameter combinations that would stall the window.
pub fn validate(chunk_size: usize, overlap: usize) -> Result<(), ChunkError> {
    if chunk_size == 0 {
        return Err(ChunkError::ZeroChunkSize);
    }
    if overlap >= chunk_size {
        return Err(ChunkError::OverlapTooLarge {
            chunk_size,
            overlap,
        });
    }
    Ok(())
}

/// Token ranges `[start, end)` covering `0..total`.
pub fn windows(
    total: usize,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Range<usize>>, ChunkError> {
    validate(chunk_size, overlap)?;

    let step = chunk_size - overlap;
    let mut ranges = Vec::with_capacity(expected_chunk_count(total, chunk_size, overlap));
    let mut start = 0;
    while start < total {
        let end = (start + chunk_size).min(total);
        ranges.push(start..end);
        // A window that reaches the end already covers the tail; another
        // step would only emit a suffix of it.
        if end == total {
            break;
        }
        start += step;
    }
    Ok(ranges)
}

/// Number of windows [`windows`] emits for a `total`-token text:
/// `ceil(max(total - overlap, 1) / (chunk_size - overlap))`, or 0 when empty.
///
/// Callers must have validated `overlap < chunk_size`.
pub fn expected_chunk_count(total: usize, chunk_size: usize, overlap: usize) -> usize {
    if total == 0 || overlap >= chunk_size {
        return 0;
    }
    let span = total.saturating_sub(overlap).max(1);
    span.div_ceil(chunk_size - overlap)
}

/// Splits text with a fixed tokenizer and window configuration.
#[derive(Clone)]
pub struct Chunker {
    tokenizer: Arc<dyn Tokenizer>,
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(
        tokenizer: Arc<dyn Tokenizer>,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<Self, ChunkError> {
        validate(chunk_size, overlap)?;
        Ok(Self {
            tokenizer,
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn tokenizer_name(&self) -> &str {
        self.tokenizer.name()
    }

    /// Tokenize `text` once and emit each window as a [`TextChunk`].
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        let tokens = self.tokenizer.encode(text);
        // Parameters were validated in `new`.
        let ranges = windows(tokens.len(), self.chunk_size, self.overlap).unwrap_or_default();

        ranges
            .into_iter()
            .enumerate()
            .map(|(index, range)| TextChunk {
                index,
                text: self.tokenizer.decode(&tokens[range.clone()]),
                start: range.start,
                end: range.end,
            })
            .collect()
    }
}

//! Overlapping fixed-window text chunker.
//!
//! Splits a document's character stream into [`Chunk`]s of `window`
//! characters, advancing by `stride` characters each step, so consecutive
//! chunks share `window - stride` characters.
//!
//! # Algorithm
//!
//! 1. Fill a buffer of `window` characters from the stream.
//! 2. If the stream has more characters, emit the buffer, discard the oldest
//!    `stride` characters and refill the tail. Repeat.
//! 3. When the stream ends, emit whatever the buffer holds. The final chunk
//!    may be shorter than `window` but keeps its nominal offset
//!    (`sequence * stride`); it is never dropped.
//!
//! A document of `L` characters yields one chunk when `L <= window`, and
//! `1 + ceil((L - window) / stride)` chunks otherwise. Empty input yields a
//! single empty chunk.
//!
//! # Example
//!
//! ```rust
//! use pdfchat_core::chunk::Chunker;
//!
//! let chunker = Chunker::new(4, 2).unwrap();
//! let chunks = chunker.chunk_text("manual.pdf", "ABCDEFGHIJ");
//! let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
//! assert_eq!(texts, ["ABCD", "CDEF", "EFGH", "GHIJ"]);
//! assert_eq!(chunks[3].offset, 6);
//! ```

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::models::Chunk;

/// Default window size in characters.
pub const DEFAULT_WINDOW_CHARS: usize = 800;
/// Default stride in characters (half-window overlap).
pub const DEFAULT_STRIDE_CHARS: usize = 400;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("chunk stride must be between 1 and the window size {window}, got {stride}")]
pub struct InvalidWindow {
    pub window: usize,
    pub stride: usize,
}

/// Rotating-buffer chunker with a fixed window and stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    window: usize,
    stride: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW_CHARS,
            stride: DEFAULT_STRIDE_CHARS,
        }
    }
}

impl Chunker {
    pub fn new(window: usize, stride: usize) -> Result<Self, InvalidWindow> {
        if stride == 0 || stride > window {
            return Err(InvalidWindow { window, stride });
        }
        Ok(Self { window, stride })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of chunks a document of `chars` characters produces.
    pub fn expected_chunks(&self, chars: usize) -> usize {
        if chars <= self.window {
            1
        } else {
            1 + (chars - self.window).div_ceil(self.stride)
        }
    }

    /// Chunk an already-decoded document.
    pub fn chunk_text(&self, source_ref: &str, text: &str) -> Vec<Chunk> {
        let mut stream = text.chars();
        let mut buffer: Vec<char> = Vec::with_capacity(self.window);
        let mut chunks = Vec::with_capacity(self.expected_chunks(text.len()));

        fill(&mut buffer, &mut stream, self.window);

        loop {
            if buffer.len() < self.window {
                // Stream ended mid-refill (or the document is shorter than one window).
                chunks.push(self.make_chunk(source_ref, chunks.len(), &buffer));
                break;
            }
            let Some(next) = stream.next() else {
                chunks.push(self.make_chunk(source_ref, chunks.len(), &buffer));
                break;
            };
            chunks.push(self.make_chunk(source_ref, chunks.len(), &buffer));
            buffer.drain(..self.stride);
            buffer.push(next);
            fill(&mut buffer, &mut stream, self.window);
        }

        chunks
    }

    fn make_chunk(&self, source_ref: &str, sequence: usize, buffer: &[char]) -> Chunk {
        Chunk {
            source_ref: source_ref.to_string(),
            sequence,
            offset: sequence * self.stride,
            content: buffer.iter().collect(),
            content_hash: content_hash(source_ref, sequence),
        }
    }
}

fn fill(buffer: &mut Vec<char>, stream: &mut impl Iterator<Item = char>, window: usize) {
    while buffer.len() < window {
        match stream.next() {
            Some(c) => buffer.push(c),
            None => break,
        }
    }
}

/// Index record identifier for the `sequence`-th chunk of `source_ref`.
///
/// SHA-256 over the source reference, a NUL separator and the decimal
/// sequence number, hex encoded. Re-chunking an unchanged document
/// reproduces the same identifiers in the same order, so re-ingestion
/// overwrites rather than duplicates.
pub fn content_hash(source_ref: &str, sequence: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_ref.as_bytes());
    hasher.update([0u8]);
    hasher.update(sequence.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(chunks: &[Chunk]) -> Vec<String> {
        chunks.iter().map(|c| c.content.clone()).collect()
    }

    #[test]
    fn test_alphabet_window_four_stride_two() {
        let chunker = Chunker::new(4, 2).unwrap();
        let chunks = chunker.chunk_text("doc.pdf", "ABCDEFGHIJ");
        assert_eq!(contents(&chunks), ["ABCD", "CDEF", "EFGH", "GHIJ"]);
        let offsets: Vec<usize> = chunks.iter().map(|c| c.offset).collect();
        assert_eq!(offsets, [0, 2, 4, 6]);
    }

    #[test]
    fn test_trailing_chunk_is_short_but_kept() {
        let chunker = Chunker::new(4, 2).unwrap();
        let chunks = chunker.chunk_text("doc.pdf", "ABCDEFGHIJK");
        assert_eq!(contents(&chunks), ["ABCD", "CDEF", "EFGH", "GHIJ", "IJK"]);
        assert_eq!(chunks[4].offset, 8);
    }

    #[test]
    fn test_empty_text_single_empty_chunk() {
        let chunks = Chunker::new(4, 2).unwrap().chunk_text("doc.pdf", "");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "");
        assert_eq!(chunks[0].offset, 0);
    }

    #[test]
    fn test_text_shorter_than_window() {
        let chunks = Chunker::new(8, 4).unwrap().chunk_text("doc.pdf", "short");
        assert_eq!(contents(&chunks), ["short"]);
    }

    #[test]
    fn test_text_exactly_one_window() {
        let chunks = Chunker::new(4, 2).unwrap().chunk_text("doc.pdf", "ABCD");
        assert_eq!(contents(&chunks), ["ABCD"]);
    }

    #[test]
    fn test_chunk_count_matches_formula() {
        let text: String = (0..137).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        for (window, stride) in [(10, 3), (10, 10), (7, 1), (16, 5), (200, 50)] {
            let chunker = Chunker::new(window, stride).unwrap();
            for len in [0, 1, window - 1, window, window + 1, 50, 137] {
                let doc: String = text.chars().take(len).collect();
                let chunks = chunker.chunk_text("doc", &doc);
                assert_eq!(
                    chunks.len(),
                    chunker.expected_chunks(doc.chars().count()),
                    "window={} stride={} len={}",
                    window,
                    stride,
                    len
                );
            }
        }
    }

    #[test]
    fn test_consecutive_full_chunks_overlap() {
        let text: String = (0..500).map(|i| char::from(b'A' + (i % 26) as u8)).collect();
        let chunker = Chunker::new(40, 15).unwrap();
        let chunks = chunker.chunk_text("doc", &text);
        let overlap = 40 - 15;
        for pair in chunks.windows(2) {
            let a: Vec<char> = pair[0].content.chars().collect();
            let b: Vec<char> = pair[1].content.chars().collect();
            if a.len() == 40 && b.len() == 40 {
                assert_eq!(a[a.len() - overlap..], b[..overlap]);
            }
        }
    }

    #[test]
    fn test_offsets_and_sequences_follow_stride() {
        let chunker = Chunker::new(6, 4).unwrap();
        let chunks = chunker.chunk_text("doc", "0123456789abcdefghij");
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.sequence, i);
            assert_eq!(c.offset, i * 4);
            assert_eq!(c.content_hash, content_hash("doc", i));
        }
    }

    #[test]
    fn test_multibyte_characters_counted_as_chars() {
        let chunker = Chunker::new(3, 2).unwrap();
        let chunks = chunker.chunk_text("doc", "äöüßé");
        assert_eq!(contents(&chunks), ["äöü", "üßé"]);
    }

    #[test]
    fn test_invalid_window_rejected() {
        assert!(Chunker::new(4, 0).is_err());
        assert_eq!(
            Chunker::new(4, 5),
            Err(InvalidWindow {
                window: 4,
                stride: 5
            })
        );
        assert!(Chunker::new(4, 4).is_ok());
    }

    #[test]
    fn test_content_hash_deterministic_and_distinct() {
        assert_eq!(content_hash("a.pdf", 3), content_hash("a.pdf", 3));
        assert_ne!(content_hash("a.pdf", 3), content_hash("a.pdf", 4));
        assert_ne!(content_hash("a.pdf", 3), content_hash("b.pdf", 3));
        // Concatenation ambiguity: ("a1", 1) vs ("a", 11).
        assert_ne!(content_hash("a1", 1), content_hash("a", 11));
        assert_eq!(content_hash("a.pdf", 0).len(), 64);
    }

    #[test]
    fn test_rechunking_is_idempotent() {
        let chunker = Chunker::new(5, 2).unwrap();
        let first = chunker.chunk_text("doc", "the quick brown fox");
        let second = chunker.chunk_text("doc", "the quick brown fox");
        assert_eq!(first, second);
    }
}

//! This module splits raw documents into overlapping chunks for retrieval.
//!
//! A chunk is a contiguous span of the source text that is embedded and indexed
//! as one retrievable unit. Chunks are bounded in size so they fit the input
//! limits of embedding models and leave room for several of them in a prompt.
//!
//! The module defines two main structs:
//! - [`TextSplitter`]: Holds the chunk size, the overlap, and the ordered
//!   delimiters used to find natural break points.
//! - [`TextChunk`]: A single span of the source document with its byte offset.
//!
//! # Splitting Strategy
//!
//! *   **Recursive Segmentation**: The document is broken into segments using the
//!     most significant delimiter first (paragraph breaks), falling back to line
//!     breaks, sentence ends and finally whitespace only for spans that are still
//!     longer than the chunk size. Spans with no usable delimiter are hard-cut on
//!     character boundaries.
//! *   **Greedy Merging**: Consecutive segments are packed into windows of at most
//!     `chunk_size` characters.
//! *   **Overlap**: When a window is emitted, its trailing segments (up to
//!     `chunk_overlap` characters) seed the next window, so neighbouring chunks
//!     share context.
//! *   **Trimming**: Leading and trailing whitespace is removed from every chunk,
//!     and whitespace-only windows are dropped.
//!
//! # Usage
//!
//! ```
//! use ragchat_context::text::TextSplitter;
//!
//! let splitter = TextSplitter::new(4, 0).unwrap();
//! let chunks = splitter.split("A.\n\nB.\n\nC.");
//!
//! let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
//! assert_eq!(texts, vec!["A.", "B.", "C."]);
//!
//! // Every chunk points back into the source document
//! assert_eq!(chunks[1].source_offset, 4);
//! ```
use crate::error::{ChunkError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::ops::Range;

/// Default delimiters, ordered from most significant to least significant.
///
/// - `\n[ \t]*\n\s*`: Paragraph breaks (a blank line plus any following whitespace).
/// - `\n`: Line breaks.
/// - `[.!?]+\s+`: Sentence ends followed by whitespace.
/// - `\s+`: Whitespace between words, the most granular delimiter.
pub const DEFAULT_DELIMITERS: &[&str] = &[
    r"\n[ \t]*\n\s*", // Paragraphs
    r"\n",            // Line breaks
    r"[.!?]+\s+",     // Sentences
    r"\s+",           // Words
];

/// Splits documents into bounded, overlapping chunks.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    delimiters: Vec<Regex>,
    chunk_size: usize,
    chunk_overlap: usize,
}

/// A single chunk of a source document.
///
/// `text` is always an exact slice of the source:
/// `document[source_offset..source_offset + text.len()] == text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Position of this chunk in the splitter output (0-indexed).
    pub sequence: usize,
    /// Byte offset of the chunk text within the source document.
    pub source_offset: usize,
    /// The chunk text.
    pub text: String,
}

impl TextChunk {
    /// Byte range of this chunk in the source document.
    pub fn source_span(&self) -> Range<usize> {
        self.source_offset..self.source_offset + self.text.len()
    }

    /// Length of the chunk in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Split `document` with the default delimiters.
///
/// Convenience wrapper around [`TextSplitter::new`] and [`TextSplitter::split`].
pub fn split_text(document: &str, chunk_size: usize, chunk_overlap: usize) -> Result<Vec<TextChunk>> {
    Ok(TextSplitter::new(chunk_size, chunk_overlap)?.split(document))
}

impl TextSplitter {
    /// Creates a splitter using [`DEFAULT_DELIMITERS`].
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError::InvalidConfig`] unless `chunk_size > 0` and
    /// `chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        Self::with_delimiters(DEFAULT_DELIMITERS, chunk_size, chunk_overlap)
    }

    /// Creates a splitter with custom delimiter patterns.
    ///
    /// Delimiters are regular expressions applied in the order given, from most
    /// significant to least significant.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError::InvalidConfig`] for bad sizes and
    /// [`ChunkError::InvalidDelimiter`] if a pattern does not compile.
    pub fn with_delimiters<S: AsRef<str>>(
        delimiter_patterns: &[S],
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<Self> {
        if chunk_size == 0 {
            return Err(ChunkError::invalid_config("chunk_size must be greater than 0"));
        }
        if chunk_overlap >= chunk_size {
            return Err(ChunkError::invalid_config(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }

        let delimiters = delimiter_patterns
            .iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                Regex::new(pattern).map_err(|source| ChunkError::InvalidDelimiter {
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            delimiters,
            chunk_size,
            chunk_overlap,
        })
    }

    /// Maximum chunk length in characters.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Maximum number of characters shared by neighbouring chunks.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Splits `document` into chunks.
    ///
    /// An empty or whitespace-only document yields an empty vector rather than
    /// an error. Every returned chunk holds between 1 and `chunk_size`
    /// characters, chunk offsets never decrease, and every non-whitespace
    /// character of the document is covered by at least one chunk.
    ///
    /// # Examples
    ///
    /// ```
    /// use ragchat_context::text::TextSplitter;
    ///
    /// let splitter = TextSplitter::new(60, 20).unwrap();
    /// let document = (0..20).map(|i| format!("Sentence number {i}. ")).collect::<String>();
    /// let chunks = splitter.split(&document);
    ///
    /// assert!(chunks.len() > 1);
    /// for chunk in &chunks {
    ///     assert!(chunk.char_len() <= 60);
    ///     assert_eq!(&document[chunk.source_span()], chunk.text);
    /// }
    /// ```
    pub fn split(&self, document: &str) -> Vec<TextChunk> {
        let mut segments = Vec::new();
        self.segment(document, 0..document.len(), 0, &mut segments);

        let mut chunks: Vec<TextChunk> = Vec::new();
        let mut window: VecDeque<(Range<usize>, usize)> = VecDeque::new();
        let mut window_len = 0;

        for segment in segments {
            let segment_len = char_len(&document[segment.clone()]);

            // Emit the current window if this segment would overflow it, then
            // keep only a tail of at most `chunk_overlap` characters.
            if window_len + segment_len > self.chunk_size && !window.is_empty() {
                self.emit(document, &window, &mut chunks);
                while window_len > self.chunk_overlap
                    || (window_len > 0 && window_len + segment_len > self.chunk_size)
                {
                    let Some((_, len)) = window.pop_front() else {
                        break;
                    };
                    window_len -= len;
                }
            }

            window_len += segment_len;
            window.push_back((segment, segment_len));
        }

        if !window.is_empty() {
            self.emit(document, &window, &mut chunks);
        }

        chunks
    }

    // Recursively breaks `span` into segments no longer than `chunk_size`.
    // Segments are contiguous and cover `span` exactly.
    fn segment(&self, document: &str, span: Range<usize>, level: usize, out: &mut Vec<Range<usize>>) {
        if span.is_empty() {
            return;
        }

        let text = &document[span.clone()];
        if char_len(text) <= self.chunk_size {
            out.push(span);
            return;
        }

        let Some(delimiter) = self.delimiters.get(level) else {
            hard_cut(document, span, self.chunk_size, out);
            return;
        };

        let mut cursor = span.start;
        for mat in delimiter.find_iter(text) {
            let start = span.start + mat.start();
            let end = span.start + mat.end();
            if start > cursor {
                self.segment(document, cursor..start, level + 1, out);
            }
            if end > start {
                self.attach_delimiter(document, start..end, out);
            }
            cursor = end;
        }

        self.segment(document, cursor..span.end, level + 1, out);
    }

    // Delimiter text sticks to the segment before it when the result still fits.
    fn attach_delimiter(&self, document: &str, delimiter: Range<usize>, out: &mut Vec<Range<usize>>) {
        if let Some(last) = out.last_mut() {
            if last.end == delimiter.start
                && char_len(&document[last.start..delimiter.end]) <= self.chunk_size
            {
                last.end = delimiter.end;
                return;
            }
        }

        if char_len(&document[delimiter.clone()]) <= self.chunk_size {
            out.push(delimiter);
        } else {
            hard_cut(document, delimiter, self.chunk_size, out);
        }
    }

    fn emit(&self, document: &str, window: &VecDeque<(Range<usize>, usize)>, chunks: &mut Vec<TextChunk>) {
        let (Some((first, _)), Some((last, _))) = (window.front(), window.back()) else {
            return;
        };

        let raw = &document[first.start..last.end];
        let leading = raw.len() - raw.trim_start().len();
        let text = raw.trim();
        if text.is_empty() {
            return;
        }
        let source_offset = first.start + leading;

        // A window that only re-emits overlap already covered by the previous
        // chunk adds nothing.
        if let Some(previous) = chunks.last() {
            let span = previous.source_span();
            if source_offset >= span.start && source_offset + text.len() <= span.end {
                return;
            }
        }

        chunks.push(TextChunk {
            sequence: chunks.len(),
            source_offset,
            text: text.to_string(),
        });
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

// Cuts `span` into pieces of at most `max_chars` characters.
fn hard_cut(document: &str, span: Range<usize>, max_chars: usize, out: &mut Vec<Range<usize>>) {
    let mut start = span.start;
    let mut count = 0;

    for (idx, _) in document[span.clone()].char_indices() {
        if count == max_chars {
            out.push(start..span.start + idx);
            start = span.start + idx;
            count = 0;
        }
        count += 1;
    }

    if start < span.end {
        out.push(start..span.end);
    }
}

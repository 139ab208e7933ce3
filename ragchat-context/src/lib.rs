pub mod error;
pub mod text;

// Re-export the splitter for external use
pub use error::{ChunkError, Result};
pub use text::{DEFAULT_DELIMITERS, TextChunk, TextSplitter, split_text};

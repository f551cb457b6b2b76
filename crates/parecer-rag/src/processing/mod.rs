pub mod chunker;
pub mod pdf;

pub use chunker::{ChunkResult, TextChunker};
pub use pdf::extract_pages;

pub mod answer;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod llm;
pub mod processing;
pub mod storage;
pub mod types;

// Re-export primary types for convenience
pub use config::RagConfig;
pub use engine::RagEngine;
pub use embeddings::EmbeddingBackend;
pub use types::{Answer, AnswerMode, ChunkFilter, CitationGroup, IngestReport, PdfPage, RetrievedChunk};

// Re-export common types
pub use anyhow::{Error, Result};
pub use uuid::Uuid;

//! Embedding backends.
//!
//! Two implementations share one trait: a remote OpenAI embedding API and a
//! local ONNX MiniLM model. Vectors are L2-normalized by both backends, so
//! inner-product search in the store is cosine similarity.

pub mod minilm;
pub mod openai;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{EmbeddingBackendKind, EmbeddingConfig};

pub use minilm::MiniLmEmbeddings;
pub use openai::OpenAiEmbeddings;

#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a search query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of document chunks, one vector per input, in order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Output vector dimension.
    fn dimension(&self) -> usize;
}

/// Build the backend selected by the config.
pub fn build_backend(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingBackend>> {
    match &config.backend {
        EmbeddingBackendKind::OpenAi {
            model,
            dimension,
            api_key,
        } => {
            tracing::info!(model = %model, dimension, "using OpenAI embedding backend");
            Ok(Arc::new(OpenAiEmbeddings::new(
                model.clone(),
                *dimension,
                api_key.clone(),
                config.batch_size,
            )?))
        }
        EmbeddingBackendKind::Local {
            model_dir,
            dimension,
        } => {
            tracing::info!(dir = %model_dir.display(), dimension, "using local embedding backend");
            Ok(Arc::new(MiniLmEmbeddings::new(model_dir, *dimension)?))
        }
    }
}

/// L2-normalize in place. Zero vectors are left untouched.
pub(crate) fn l2_normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-12 {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}

/// Truncate to at most `max_chars` characters, respecting char boundaries.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_produces_unit_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn normalize_leaves_zero_vector() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("çãé", 2), "çã");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 5), "");
    }
}

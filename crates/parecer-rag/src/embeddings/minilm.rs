//! Local MiniLM embedding backend (ONNX Runtime + HuggingFace tokenizer).

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use parking_lot::{Mutex, RwLock};

use super::{l2_normalize, EmbeddingBackend};

const MAX_LENGTH: usize = 512;
const MAX_BATCH_SIZE: usize = 8;
const QUERY_CACHE_SIZE: usize = 1000;

pub struct MiniLmEmbeddings {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<tokenizers::Tokenizer>,
    dimension: usize,
    cache: Arc<RwLock<lru::LruCache<String, Vec<f32>>>>,
}

impl MiniLmEmbeddings {
    pub fn new(model_dir: &Path, dimension: usize) -> Result<Self> {
        let model_path = resolve_model_file(model_dir)?;
        let tokenizer_path = model_dir.join("tokenizer.json");
        if !tokenizer_path.exists() {
            return Err(anyhow!(
                "tokenizer.json not found in {}",
                model_dir.display()
            ));
        }

        ort::init().with_name("minilm_embeddings").commit();

        let model_bytes = std::fs::read(&model_path)
            .map_err(|e| anyhow!("Failed to read model {}: {:?}", model_path.display(), e))?;

        let num_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        let session = Session::builder()
            .map_err(|e| anyhow!("Session builder: {:?}", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow!("Optimization level: {:?}", e))?
            .with_intra_threads(num_threads)
            .map_err(|e| anyhow!("Intra threads: {:?}", e))?
            .with_inter_threads(1)
            .map_err(|e| anyhow!("Inter threads: {:?}", e))?
            .commit_from_memory(&model_bytes)
            .map_err(|e| anyhow!("Failed to load model: {:?}", e))?;

        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer: {:?}", e))?;

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            dimension,
            cache: Arc::new(RwLock::new(lru::LruCache::new(
                NonZeroUsize::new(QUERY_CACHE_SIZE).unwrap(),
            ))),
        })
    }

    fn embed_batch_sync(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH_SIZE) {
            let mut encodings = Vec::with_capacity(batch.len());
            for text in batch {
                let encoding = self
                    .tokenizer
                    .encode(*text, true)
                    .map_err(|e| anyhow!("Tokenization failed: {:?}", e))?;
                encodings.push(encoding);
            }

            let padded_len = encodings
                .iter()
                .map(|e| e.get_ids().len().min(MAX_LENGTH))
                .max()
                .unwrap_or(1)
                .max(1);
            let batch_size = encodings.len();

            let mut ids_flat = Vec::with_capacity(batch_size * padded_len);
            let mut mask_flat = Vec::with_capacity(batch_size * padded_len);
            let mut type_flat = Vec::with_capacity(batch_size * padded_len);

            for enc in &encodings {
                let len = enc.get_ids().len().min(padded_len);
                for i in 0..len {
                    ids_flat.push(enc.get_ids()[i] as i64);
                    mask_flat.push(enc.get_attention_mask()[i] as i64);
                    type_flat.push(0i64);
                }
                for _ in len..padded_len {
                    ids_flat.push(0i64);
                    mask_flat.push(0i64);
                    type_flat.push(0i64);
                }
            }

            let shape = vec![batch_size, padded_len];
            let input_ids = Value::from_array((shape.clone(), ids_flat))
                .map_err(|e| anyhow!("input_ids tensor: {:?}", e))?;
            let attention_mask = Value::from_array((shape.clone(), mask_flat.clone()))
                .map_err(|e| anyhow!("attention_mask tensor: {:?}", e))?;
            let token_type_ids = Value::from_array((shape, type_flat))
                .map_err(|e| anyhow!("token_type_ids tensor: {:?}", e))?;

            let inputs = ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "token_type_ids" => token_type_ids,
            ];

            let mut session = self.session.lock();
            let outputs = session
                .run(inputs)
                .map_err(|e| anyhow!("Inference failed: {:?}", e))?;

            let (out_shape, data) = outputs["last_hidden_state"]
                .try_extract_tensor::<f32>()
                .map_err(|e| anyhow!("Failed to extract last_hidden_state: {:?}", e))?;

            let seq_len = out_shape[1] as usize;
            let hidden_dim = out_shape[2] as usize;
            if hidden_dim != self.dimension {
                return Err(anyhow!(
                    "Model produced {}-dim vectors, expected {}",
                    hidden_dim,
                    self.dimension
                ));
            }

            for sample_idx in 0..batch_size {
                let mask_offset = sample_idx * padded_len;
                let sample_offset = sample_idx * seq_len * hidden_dim;
                let mut pooled = vec![0.0f32; hidden_dim];
                let mut mask_sum = 0.0f32;

                for pos in 0..seq_len {
                    let mask_val = if mask_offset + pos < mask_flat.len() {
                        mask_flat[mask_offset + pos] as f32
                    } else {
                        0.0
                    };
                    if mask_val > 0.0 {
                        mask_sum += mask_val;
                        let offset = sample_offset + pos * hidden_dim;
                        for dim in 0..hidden_dim {
                            pooled[dim] += data[offset + dim] * mask_val;
                        }
                    }
                }

                if mask_sum > 0.0 {
                    for dim in 0..hidden_dim {
                        pooled[dim] /= mask_sum;
                    }
                }

                l2_normalize(&mut pooled);
                all_embeddings.push(pooled);
            }
        }

        Ok(all_embeddings)
    }
}

#[async_trait]
impl EmbeddingBackend for MiniLmEmbeddings {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.cache.write().get(text) {
            return Ok(cached.clone());
        }

        let mut vectors = self.embed_batch_sync(&[text])?;
        let vector = vectors
            .pop()
            .ok_or_else(|| anyhow!("Model returned no embedding for query"))?;

        self.cache.write().put(text.to_string(), vector.clone());
        Ok(vector)
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        self.embed_batch_sync(&refs)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Pick the ONNX file inside the model directory, preferring quantized variants.
fn resolve_model_file(model_dir: &Path) -> Result<PathBuf> {
    for candidate in ["model_quantized.onnx", "model_O4.onnx", "model.onnx"] {
        let path = model_dir.join(candidate);
        if path.exists() {
            return Ok(path);
        }
    }
    Err(anyhow!(
        "No ONNX model file found in {}",
        model_dir.display()
    ))
}

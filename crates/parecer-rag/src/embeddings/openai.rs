//! OpenAI embedding API backend.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{l2_normalize, truncate_chars, EmbeddingBackend};

const EMBEDDINGS_ENDPOINT: &str = "https://api.openai.com/v1/embeddings";

// The API rejects very long inputs; anything past this is noise for retrieval anyway.
const MAX_INPUT_CHARS: usize = 16_000;

pub struct OpenAiEmbeddings {
    client: Client,
    model: String,
    dimension: usize,
    api_key: String,
    batch_size: usize,
}

impl OpenAiEmbeddings {
    pub fn new(model: String, dimension: usize, api_key: String, batch_size: usize) -> Result<Self> {
        if api_key.is_empty() {
            return Err(anyhow!("OpenAI embedding backend requires an API key"));
        }
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(15))
            .timeout(std::time::Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            model,
            dimension,
            api_key,
            batch_size: batch_size.max(1),
        })
    }

    async fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let request = json!({
            "model": self.model,
            "input": inputs,
        });

        let response = self
            .client
            .post(EMBEDDINGS_ENDPOINT)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow!("Request to {} timed out", EMBEDDINGS_ENDPOINT)
                } else if e.is_connect() {
                    anyhow!("Failed to connect to {}: {}", EMBEDDINGS_ENDPOINT, e)
                } else {
                    anyhow!("Request to {} failed: {}", EMBEDDINGS_ENDPOINT, e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await?;
            return Err(anyhow!("OpenAI embeddings API error ({}): {}", status, error));
        }

        let result: EmbeddingsResponse = parse_json_response(response).await?;

        // The API documents order-preserving output, but index is authoritative.
        let mut data = result.data;
        data.sort_by_key(|d| d.index);

        if data.len() != inputs.len() {
            return Err(anyhow!(
                "OpenAI returned {} embeddings for {} inputs",
                data.len(),
                inputs.len()
            ));
        }

        let mut vectors = Vec::with_capacity(data.len());
        for item in data {
            if item.embedding.len() != self.dimension {
                return Err(anyhow!(
                    "OpenAI returned a {}-dim vector, expected {}",
                    item.embedding.len(),
                    self.dimension
                ));
            }
            let mut v = item.embedding;
            l2_normalize(&mut v);
            vectors.push(v);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAiEmbeddings {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let input = truncate_chars(text, MAX_INPUT_CHARS);
        let mut vectors = self.embed_batch(&[input]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow!("OpenAI returned no embedding for query"))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let truncated: Vec<&str> = texts
            .iter()
            .map(|t| truncate_chars(t, MAX_INPUT_CHARS))
            .collect();

        let mut all_vectors = Vec::with_capacity(texts.len());
        for batch in truncated.chunks(self.batch_size) {
            tracing::debug!(batch_len = batch.len(), "embedding batch via OpenAI");
            all_vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(all_vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Parse a response body as JSON, with a clear error if the server returned HTML.
async fn parse_json_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| anyhow!("Failed to read response body: {}", e))?;
    let trimmed = body.trim_start();
    if trimmed.starts_with('<') {
        let preview: String = trimmed.chars().take(200).collect();
        return Err(anyhow!(
            "Endpoint returned HTML instead of JSON (HTTP {}) — service may be down. Response: {}",
            status,
            preview
        ));
    }
    serde_json::from_str::<T>(&body).map_err(|e| {
        let preview: String = body.chars().take(300).collect();
        anyhow!("Failed to parse JSON (HTTP {}): {}. Body: {}", status, e, preview)
    })
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

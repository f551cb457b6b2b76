use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub data_dir: PathBuf,
    /// Base name for the vector collection. The embedding backend and its
    /// dimensionality are appended so incompatible vector spaces never mix.
    pub collection_base: String,
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkingConfig,
    pub search: SearchConfig,
    pub answer: AnswerConfig,
    #[serde(default)]
    pub llm: LlmSettings,
}

/// Chat-completion settings for generative answers. With no model set the
/// engine answers extractively only.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmSettings {
    #[serde(default)]
    pub provider: LlmProviderKind,
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: String,
    /// Endpoint override; for Ollama this is the server base URL
    /// (`OLLAMA_HOST`), otherwise a full chat-completions URL.
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LlmProviderKind {
    #[default]
    OpenAi,
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackendKind,
    /// Chunks embedded per API/inference call during ingestion.
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmbeddingBackendKind {
    OpenAi {
        model: String,
        dimension: usize,
        #[serde(default)]
        api_key: String,
    },
    Local {
        model_dir: PathBuf,
        dimension: usize,
    },
}

impl EmbeddingBackendKind {
    pub fn dimension(&self) -> usize {
        match self {
            Self::OpenAi { dimension, .. } => *dimension,
            Self::Local { dimension, .. } => *dimension,
        }
    }

    /// Short collection-name suffix identifying the vector space.
    pub fn collection_suffix(&self) -> String {
        match self {
            Self::OpenAi { dimension, .. } => format!("openai_{}", dimension),
            Self::Local { dimension, .. } => format!("minilm_{}", dimension),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Window length, in characters.
    pub chunk_size: usize,
    /// Overlap between consecutive windows, in characters.
    pub chunk_overlap: usize,
    /// Hard cap applied after chunking so records fit storage limits.
    pub max_chunk_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub default_k: usize,
    pub min_score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerConfig {
    /// Bullet cap for extractive answers.
    pub max_sentences: usize,
}

impl RagConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<()> {
        if self.embedding.backend.dimension() == 0 {
            bail!("embedding dimension must be > 0");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        if self.chunking.chunk_size < 100 {
            bail!("chunking.chunk_size must be >= 100");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            bail!("chunking.chunk_overlap must be < chunk_size");
        }
        if self.chunking.max_chunk_chars < self.chunking.chunk_size {
            bail!("chunking.max_chunk_chars must be >= chunk_size");
        }
        if self.search.default_k == 0 {
            bail!("search.default_k must be > 0");
        }
        if !(0.0..=1.0).contains(&self.search.min_score) {
            bail!("search.min_score must be in [0.0, 1.0]");
        }
        if self.answer.max_sentences == 0 {
            bail!("answer.max_sentences must be > 0");
        }
        if self.collection_base.is_empty() {
            bail!("collection_base must not be empty");
        }
        Ok(())
    }

    /// Load config from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides. `OPENAI_API_KEY` selects the
    /// cloud embedding backend; without it the local ONNX backend is used.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("PARECER_DATA_DIR") {
            if !dir.trim().is_empty() {
                config.data_dir = PathBuf::from(dir);
            }
        }
        if let Ok(name) = std::env::var("PARECER_COLLECTION") {
            if !name.trim().is_empty() {
                config.collection_base = name;
            }
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.trim().is_empty() {
                config.embedding.backend = EmbeddingBackendKind::OpenAi {
                    model: "text-embedding-3-large".to_string(),
                    dimension: 3072,
                    api_key: key.clone(),
                };
                config.llm.api_key = key;
            }
        }
        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            if !model.trim().is_empty() {
                config.llm.provider = LlmProviderKind::Ollama;
                config.llm.model = Some(model);
            }
        }
        if let Ok(host) = std::env::var("OLLAMA_HOST") {
            if !host.trim().is_empty() {
                config.llm.provider = LlmProviderKind::Ollama;
                config.llm.endpoint = Some(host.trim_end_matches('/').to_string());
            }
        }
        if let Ok(model) = std::env::var("PARECER_LLM_MODEL") {
            if !model.trim().is_empty() {
                config.llm.model = Some(model);
            }
        }
        if let Ok(endpoint) = std::env::var("PARECER_LLM_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                config.llm.endpoint = Some(endpoint);
            }
        }

        config
    }

    /// Full collection name for the configured embedding backend.
    pub fn collection_name(&self) -> String {
        let base: String = self
            .collection_base
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        format!("{}_{}", base, self.embedding.backend.collection_suffix())
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("parecer-rag");

        let model_dir = if Path::new("models").exists() {
            PathBuf::from("models")
        } else if let Ok(env_path) = std::env::var("MODEL_PATH") {
            PathBuf::from(env_path)
        } else {
            data_dir.join("models")
        };

        Self {
            data_dir,
            collection_base: "docs_parecer".to_string(),
            embedding: EmbeddingConfig {
                backend: EmbeddingBackendKind::Local {
                    model_dir,
                    dimension: 384,
                },
                batch_size: 64,
            },
            chunking: ChunkingConfig {
                chunk_size: 1200,
                chunk_overlap: 200,
                max_chunk_chars: 16_000,
            },
            search: SearchConfig {
                default_k: 5,
                min_score: 0.0,
            },
            answer: AnswerConfig { max_sentences: 5 },
            llm: LlmSettings::default(),
        }
    }
}

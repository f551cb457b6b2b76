//! The engine wires the pipeline together: PDF extraction, chunking,
//! embedding, LanceDB storage, retrieval and answer composition.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use walkdir::WalkDir;

use crate::answer::{extractive_answer, format_citations, generative_answer};
use crate::answer::citations::group_citations;
use crate::config::RagConfig;
use crate::embeddings::{build_backend, EmbeddingBackend};
use crate::llm::{GenerationConfig, LlmProvider};
use crate::processing::{extract_pages, TextChunker};
use crate::storage::LanceStore;
use crate::types::{Answer, AnswerMode, ChunkFilter, ChunkRecord, IngestReport, PdfPage};

pub struct RagEngine {
    config: RagConfig,
    store: LanceStore,
    embedder: Arc<dyn EmbeddingBackend>,
    llm: Option<Arc<dyn LlmProvider>>,
    generation: GenerationConfig,
}

impl RagEngine {
    /// Build the engine from config: embedding backend first, then the store
    /// sized to the backend's dimension.
    pub async fn new(config: RagConfig) -> Result<Self> {
        config.validate()?;
        let embedder = build_backend(&config.embedding)?;
        Self::with_backend(config, embedder).await
    }

    /// Same, with a caller-supplied embedding backend.
    pub async fn with_backend(
        config: RagConfig,
        embedder: Arc<dyn EmbeddingBackend>,
    ) -> Result<Self> {
        config.validate()?;

        let expected = config.embedding.backend.dimension();
        if embedder.dimension() != expected {
            return Err(anyhow!(
                "Embedding backend produces {}-dim vectors but config expects {}",
                embedder.dimension(),
                expected
            ));
        }

        let db_path = config.data_dir.join("lancedb");
        let db_path = db_path
            .to_str()
            .ok_or_else(|| anyhow!("Data dir path is not valid UTF-8"))?
            .to_string();

        let table_name = config.collection_name();
        let store = LanceStore::new(&db_path, &table_name, embedder.dimension()).await?;

        let llm: Option<Arc<dyn LlmProvider>> = match &config.llm.model {
            Some(model) => Some(Arc::new(crate::llm::ExternalProvider::new(
                crate::llm::provider_for(&config.llm),
                config.llm.api_key.clone(),
                model.clone(),
            )?)),
            None => None,
        };

        tracing::info!(
            table = %table_name,
            dimension = embedder.dimension(),
            generative = llm.is_some(),
            "RAG engine ready"
        );

        Ok(Self {
            config,
            store,
            embedder,
            llm,
            generation: GenerationConfig::default(),
        })
    }

    pub fn set_llm_provider(&mut self, provider: Arc<dyn LlmProvider>) {
        self.llm = Some(provider);
    }

    pub fn set_generation_config(&mut self, config: GenerationConfig) {
        self.generation = config;
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    // ── Ingestion ────────────────────────────────────────────────────

    /// Index one PDF under the given license/enterprise classification.
    /// Re-ingesting the same file replaces its previous chunks.
    pub async fn ingest_pdf(
        &self,
        path: &Path,
        license_type: &str,
        enterprise_type: &str,
    ) -> Result<IngestReport> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("Invalid PDF path: {}", path.display()))?;

        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read PDF: {}", path.display()))?;
        let pages = extract_pages(&bytes)
            .with_context(|| format!("Failed to extract text from {}", path.display()))?;

        let source = source_label(license_type, enterprise_type, file_name);
        self.ingest_pages(&source, license_type, enterprise_type, &pages)
            .await
    }

    /// Index every `.pdf` under a directory, recursively. Files that fail to
    /// parse are skipped with a warning; the report covers what went in.
    pub async fn ingest_dir(
        &self,
        dir: &Path,
        license_type: &str,
        enterprise_type: &str,
    ) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let is_pdf = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
            if !is_pdf {
                continue;
            }

            match self.ingest_pdf(path, license_type, enterprise_type).await {
                Ok(r) => {
                    report.files += r.files;
                    report.pages += r.pages;
                    report.chunks += r.chunks;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping PDF");
                }
            }
        }

        Ok(report)
    }

    /// Core ingest path: chunk the pages, embed in batches, replace any
    /// previous chunks for this source, insert the new ones.
    pub async fn ingest_pages(
        &self,
        source: &str,
        license_type: &str,
        enterprise_type: &str,
        pages: &[PdfPage],
    ) -> Result<IngestReport> {
        let chunker = TextChunker::new(
            self.config.chunking.chunk_size,
            self.config.chunking.chunk_overlap,
        );

        let mut texts: Vec<String> = Vec::new();
        let mut page_numbers: Vec<i64> = Vec::new();

        let max_chars = self.config.chunking.max_chunk_chars;
        for page in pages {
            for chunk in chunker.chunk(&page.text) {
                let text = crate::embeddings::truncate_chars(chunk.text.trim(), max_chars);
                if text.is_empty() {
                    continue;
                }
                texts.push(text.to_string());
                page_numbers.push(page.number);
            }
        }

        // Replace-by-source first, so re-ingesting a file is idempotent and
        // a now-empty document drops out of the index.
        let removed = self.store.delete_by_source(source).await?;
        if removed > 0 {
            tracing::info!(source = %source, removed, "Replaced previous chunks for source");
        }

        if texts.is_empty() {
            tracing::warn!(source = %source, "No text extracted, nothing to index");
            return Ok(IngestReport {
                files: 1,
                pages: pages.len(),
                chunks: 0,
            });
        }

        let vectors = self.embedder.embed_documents(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(anyhow!(
                "Embedding backend returned {} vectors for {} chunks",
                vectors.len(),
                texts.len()
            ));
        }

        let now = chrono::Utc::now().timestamp();
        let records: Vec<ChunkRecord> = texts
            .into_iter()
            .zip(page_numbers)
            .zip(vectors)
            .map(|((text, page), vector)| ChunkRecord {
                id: uuid::Uuid::new_v4().to_string(),
                text,
                source: source.to_string(),
                page,
                license_type: license_type.to_string(),
                enterprise_type: enterprise_type.to_string(),
                vector,
                created_at: now,
            })
            .collect();

        let chunk_count = records.len();
        self.store.insert_chunks(records).await?;
        self.store.create_index_if_needed().await?;

        tracing::info!(
            source = %source,
            pages = pages.len(),
            chunks = chunk_count,
            "Indexed document"
        );

        Ok(IngestReport {
            files: 1,
            pages: pages.len(),
            chunks: chunk_count,
        })
    }

    // ── Retrieval & answering ────────────────────────────────────────

    /// Top-k chunks for a query, optionally constrained by metadata filter.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        filter: &ChunkFilter,
    ) -> Result<Vec<crate::types::RetrievedChunk>> {
        let query_vec = self.embedder.embed_query(query).await?;
        let predicate = filter.to_predicate();

        let mut hits = self
            .store
            .vector_search(&query_vec, k, predicate.as_deref())
            .await?;
        hits.retain(|h| h.score >= self.config.search.min_score);
        Ok(hits)
    }

    /// Retrieve, compose an answer in the requested mode, attach citations.
    pub async fn answer(
        &self,
        query: &str,
        mode: AnswerMode,
        filter: &ChunkFilter,
    ) -> Result<Answer> {
        let hits = self
            .retrieve(query, self.config.search.default_k, filter)
            .await?;

        if hits.is_empty() {
            return Ok(Answer {
                text: crate::answer::extractive::NO_ANSWER_MESSAGE.to_string(),
                citations: Vec::new(),
                hits,
            });
        }

        let body = match mode {
            AnswerMode::Generative => match &self.llm {
                Some(provider) => {
                    generative_answer(provider.as_ref(), query, &hits, &self.generation).await
                }
                None => {
                    tracing::warn!("No LLM provider configured, answering extractively");
                    extractive_answer(query, &hits, self.config.answer.max_sentences)
                }
            },
            AnswerMode::Extractive => {
                extractive_answer(query, &hits, self.config.answer.max_sentences)
            }
        };

        let citations = group_citations(&hits);
        let citation_block = format_citations(&hits);
        let text = if citation_block.is_empty() {
            body
        } else {
            format!("{}\n\n{}", body, citation_block)
        };

        Ok(Answer {
            text,
            citations,
            hits,
        })
    }

    // ── Maintenance ──────────────────────────────────────────────────

    pub async fn delete_source(&self, source: &str) -> Result<usize> {
        self.store.delete_by_source(source).await
    }

    pub async fn list_sources(&self) -> Result<Vec<String>> {
        self.store.list_sources().await
    }

    pub async fn chunk_count(&self) -> Result<usize> {
        self.store.count().await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }
}

/// Source label that keys a document in the store. Classification is part of
/// the label so the same file can be indexed under different license types.
pub fn source_label(license_type: &str, enterprise_type: &str, file_name: &str) -> String {
    format!("{}_{}_{}", license_type, enterprise_type, file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingBackendKind;
    use crate::types::RetrievedChunk;
    use async_trait::async_trait;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    const DIM: usize = 8;

    /// Deterministic word-bucket embedder: identical text always maps to the
    /// identical unit vector, so exact-text queries rank their chunk first.
    struct BucketEmbedder;

    fn bucket_vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIM];
        for token in text.to_lowercase().split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            v[(hasher.finish() % DIM as u64) as usize] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        } else {
            v[0] = 1.0;
        }
        v
    }

    #[async_trait]
    impl EmbeddingBackend for BucketEmbedder {
        async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
            Ok(bucket_vector(text))
        }

        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| bucket_vector(t)).collect())
        }

        fn dimension(&self) -> usize {
            DIM
        }
    }

    fn test_config(data_dir: &Path) -> RagConfig {
        let mut config = RagConfig::default();
        config.data_dir = data_dir.to_path_buf();
        config.embedding.backend = EmbeddingBackendKind::Local {
            model_dir: data_dir.join("models"),
            dimension: DIM,
        };
        config
    }

    async fn test_engine(data_dir: &Path) -> RagEngine {
        RagEngine::with_backend(test_config(data_dir), Arc::new(BucketEmbedder))
            .await
            .expect("engine builds")
    }

    fn pages() -> Vec<PdfPage> {
        vec![
            PdfPage {
                number: 1,
                text: "A licença de operação tem validade de quatro anos contados da emissão."
                    .to_string(),
            },
            PdfPage {
                number: 2,
                text: "O monitoramento da qualidade da água deve ser realizado semestralmente."
                    .to_string(),
            },
        ]
    }

    #[test]
    fn source_label_prefixes_classification() {
        assert_eq!(
            source_label("LO", "mineracao", "parecer_12.pdf"),
            "LO_mineracao_parecer_12.pdf"
        );
    }

    #[tokio::test]
    async fn ingest_and_retrieve_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = test_engine(dir.path()).await;

        let report = engine
            .ingest_pages("LO_mineracao_parecer.pdf", "LO", "mineracao", &pages())
            .await
            .expect("ingest succeeds");
        assert_eq!(report.pages, 2);
        assert_eq!(report.chunks, 2);

        // Exact chunk text embeds to the identical vector, so it must rank first.
        let hits: Vec<RetrievedChunk> = engine
            .retrieve(
                "A licença de operação tem validade de quatro anos contados da emissão.",
                5,
                &ChunkFilter::default(),
            )
            .await
            .expect("retrieve succeeds");

        assert!(!hits.is_empty());
        assert!(hits[0].text.contains("validade de quatro anos"));
        assert_eq!(hits[0].source, "LO_mineracao_parecer.pdf");
        assert_eq!(hits[0].page, 1);
        assert_eq!(hits[0].license_type, "LO");
        assert!(hits[0].score > 0.99);
    }

    #[tokio::test]
    async fn filter_restricts_results_to_matching_metadata() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = test_engine(dir.path()).await;

        engine
            .ingest_pages("LO_mineracao_a.pdf", "LO", "mineracao", &pages())
            .await
            .expect("ingest LO");
        engine
            .ingest_pages("LP_industria_b.pdf", "LP", "industria", &pages())
            .await
            .expect("ingest LP");

        let filter = ChunkFilter {
            license_type: Some("LO".to_string()),
            ..Default::default()
        };
        let hits = engine
            .retrieve("validade da licença de operação", 10, &filter)
            .await
            .expect("filtered retrieve");

        assert!(!hits.is_empty());
        assert!(hits.iter().all(|h| h.license_type == "LO"));
    }

    #[tokio::test]
    async fn reingesting_a_source_does_not_duplicate_chunks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = test_engine(dir.path()).await;

        engine
            .ingest_pages("LO_mineracao_parecer.pdf", "LO", "mineracao", &pages())
            .await
            .expect("first ingest");
        let count_first = engine.chunk_count().await.expect("count");

        engine
            .ingest_pages("LO_mineracao_parecer.pdf", "LO", "mineracao", &pages())
            .await
            .expect("second ingest");
        let count_second = engine.chunk_count().await.expect("count");

        assert_eq!(count_first, count_second);
        assert_eq!(
            engine.list_sources().await.expect("sources"),
            vec!["LO_mineracao_parecer.pdf".to_string()]
        );
    }

    #[tokio::test]
    async fn empty_store_answers_with_fallback_and_no_citations() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = test_engine(dir.path()).await;

        let answer = engine
            .answer("qualquer pergunta", AnswerMode::Extractive, &ChunkFilter::default())
            .await
            .expect("answer succeeds");

        assert_eq!(answer.text, crate::answer::extractive::NO_ANSWER_MESSAGE);
        assert!(answer.citations.is_empty());
        assert!(answer.hits.is_empty());
    }

    #[tokio::test]
    async fn extractive_answer_cites_its_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = test_engine(dir.path()).await;

        engine
            .ingest_pages("LO_mineracao_parecer.pdf", "LO", "mineracao", &pages())
            .await
            .expect("ingest");

        let answer = engine
            .answer(
                "A licença de operação tem validade de quatro anos contados da emissão.",
                AnswerMode::Extractive,
                &ChunkFilter::default(),
            )
            .await
            .expect("answer");

        assert!(answer.text.contains("validade de quatro anos"));
        assert!(answer.text.contains("Fontes:"));
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.citations[0].source, "LO_mineracao_parecer.pdf");
        assert!(answer.citations[0].pages.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn delete_source_removes_its_chunks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = test_engine(dir.path()).await;

        engine
            .ingest_pages("LO_mineracao_a.pdf", "LO", "mineracao", &pages())
            .await
            .expect("ingest");
        let removed = engine
            .delete_source("LO_mineracao_a.pdf")
            .await
            .expect("delete");

        assert_eq!(removed, 2);
        assert_eq!(engine.chunk_count().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = test_config(dir.path());
        config.embedding.backend = EmbeddingBackendKind::Local {
            model_dir: dir.path().join("models"),
            dimension: DIM + 1,
        };

        let result = RagEngine::with_backend(config, Arc::new(BucketEmbedder)).await;
        assert!(result.is_err());
    }
}

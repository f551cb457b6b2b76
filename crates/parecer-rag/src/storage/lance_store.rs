//! LanceDB-backed chunk store.
//!
//! One table per collection. Vectors are stored L2-normalized, so cosine
//! distance search orders hits by cosine similarity; scores returned to
//! callers are `1 - distance`.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use lancedb::query::{ExecutableQuery, QueryBase};

use crate::types::{ChunkRecord, RetrievedChunk};

pub struct LanceStore {
    db: lancedb::Connection,
    dimension: usize,
    table_name: String,
}

impl LanceStore {
    pub async fn new(path: &str, table_name: &str, dimension: usize) -> Result<Self> {
        std::fs::create_dir_all(path).ok();
        let db = lancedb::connect(path)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        let store = Self {
            db,
            dimension,
            table_name: table_name.to_string(),
        };

        store.ensure_table().await?;
        Ok(store)
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("page", DataType::Int64, false),
            Field::new("license_type", DataType::Utf8, false),
            Field::new("enterprise_type", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension as i32,
                ),
                true,
            ),
            Field::new("created_at", DataType::Int64, false),
        ]))
    }

    async fn ensure_table(&self) -> Result<()> {
        let names = self.db.table_names().execute().await?;
        if !names.contains(&self.table_name) {
            // LanceDB infers the schema from the first batch, so create with a
            // seed row and delete it.
            let schema = self.schema();
            let seed_vec = vec![0.0f32; self.dimension];
            let values = Float32Array::from(seed_vec);
            let vector_field = Field::new("item", DataType::Float32, true);
            let vector_array = FixedSizeListArray::new(
                Arc::new(vector_field),
                self.dimension as i32,
                Arc::new(values) as Arc<dyn Array>,
                None,
            );

            let batch = RecordBatch::try_new(
                schema.clone(),
                vec![
                    Arc::new(StringArray::from(vec!["__seed__"])) as Arc<dyn Array>,
                    Arc::new(StringArray::from(vec![""])),
                    Arc::new(StringArray::from(vec![""])),
                    Arc::new(Int64Array::from(vec![0i64])),
                    Arc::new(StringArray::from(vec![""])),
                    Arc::new(StringArray::from(vec![""])),
                    Arc::new(vector_array) as Arc<dyn Array>,
                    Arc::new(Int64Array::from(vec![0i64])),
                ],
            )
            .context("Failed to create seed RecordBatch")?;

            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
            self.db
                .create_table(&self.table_name, Box::new(batches))
                .execute()
                .await
                .with_context(|| format!("Failed to create table {}", self.table_name))?;

            // The schema row must not survive into search results.
            let table = self.db.open_table(&self.table_name).execute().await?;
            table
                .delete("id = '__seed__'")
                .await
                .context("Failed to remove schema seed row")?;
        }
        Ok(())
    }

    pub async fn insert_chunks(&self, chunks: Vec<ChunkRecord>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let table = self
            .db
            .open_table(&self.table_name)
            .execute()
            .await
            .with_context(|| format!("Failed to open table {}", self.table_name))?;

        let len = chunks.len();
        let schema = self.schema();

        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let sources: Vec<&str> = chunks.iter().map(|c| c.source.as_str()).collect();
        let pages: Vec<i64> = chunks.iter().map(|c| c.page).collect();
        let license_types: Vec<&str> = chunks.iter().map(|c| c.license_type.as_str()).collect();
        let enterprise_types: Vec<&str> =
            chunks.iter().map(|c| c.enterprise_type.as_str()).collect();
        let created_ats: Vec<i64> = chunks.iter().map(|c| c.created_at).collect();

        let flat_vectors: Vec<f32> = chunks
            .iter()
            .flat_map(|c| c.vector.iter().copied())
            .collect();
        let values = Float32Array::from(flat_vectors);
        let vector_field = Field::new("item", DataType::Float32, true);
        let vector_array = FixedSizeListArray::new(
            Arc::new(vector_field),
            self.dimension as i32,
            Arc::new(values) as Arc<dyn Array>,
            None,
        );

        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(ids)) as Arc<dyn Array>,
                Arc::new(StringArray::from(texts)),
                Arc::new(StringArray::from(sources)),
                Arc::new(Int64Array::from(pages)),
                Arc::new(StringArray::from(license_types)),
                Arc::new(StringArray::from(enterprise_types)),
                Arc::new(vector_array) as Arc<dyn Array>,
                Arc::new(Int64Array::from(created_ats)),
            ],
        )
        .context("Failed to create RecordBatch")?;

        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table
            .add(Box::new(reader))
            .execute()
            .await
            .context("Failed to insert chunks")?;

        tracing::debug!(table = %self.table_name, inserted = len, "Inserted chunks into LanceDB");
        Ok(())
    }

    pub async fn vector_search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>> {
        let table = self.db.open_table(&self.table_name).execute().await?;

        let mut query_builder = table.query().nearest_to(query)?;
        query_builder = query_builder
            .distance_type(lancedb::DistanceType::Cosine)
            .limit(k);

        if let Some(predicate) = filter {
            query_builder = query_builder.only_if(predicate);
        }

        let results = query_builder
            .execute()
            .await
            .context("LanceDB vector search failed")?;

        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results).await?;
        Ok(extract_hits_from_batches(&batches))
    }

    /// Remove every chunk ingested from a source, returning the count removed.
    pub async fn delete_by_source(&self, source: &str) -> Result<usize> {
        let table = self.db.open_table(&self.table_name).execute().await?;
        let count_before = table.count_rows(None).await.unwrap_or(0);
        let predicate = format!("source = '{}'", source.replace('\'', "''"));
        table.delete(&predicate).await?;
        let count_after = table.count_rows(None).await.unwrap_or(0);
        Ok(count_before.saturating_sub(count_after))
    }

    pub async fn clear(&self) -> Result<()> {
        let names = self.db.table_names().execute().await?;
        if names.contains(&self.table_name) {
            self.db.drop_table(&self.table_name, &[]).await?;
        }
        self.ensure_table().await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<usize> {
        let table = self.db.open_table(&self.table_name).execute().await?;
        let count = table.count_rows(None).await?;
        Ok(count)
    }

    /// Distinct source labels currently in the collection, sorted.
    pub async fn list_sources(&self) -> Result<Vec<String>> {
        let table = self.db.open_table(&self.table_name).execute().await?;
        let results = table
            .query()
            .select(lancedb::query::Select::columns(&["source"]))
            .execute()
            .await
            .context("Failed to query sources")?;

        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results).await?;
        let mut sources = BTreeSet::new();

        for batch in &batches {
            if let Some(col) = batch
                .column_by_name("source")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            {
                for i in 0..col.len() {
                    let val = col.value(i);
                    if !val.is_empty() {
                        sources.insert(val.to_string());
                    }
                }
            }
        }

        Ok(sources.into_iter().collect())
    }

    pub async fn create_index_if_needed(&self) -> Result<()> {
        let count = self.count().await?;
        if count >= 1_000 {
            let table = self.db.open_table(&self.table_name).execute().await?;
            table
                .create_index(&["vector"], lancedb::index::Index::Auto)
                .execute()
                .await
                .context("Failed to create vector index")?;
            tracing::info!(rows = count, "Created vector index");
        }
        Ok(())
    }
}

fn extract_hits_from_batches(batches: &[RecordBatch]) -> Vec<RetrievedChunk> {
    let mut hits = Vec::new();
    for batch in batches {
        let texts = batch
            .column_by_name("text")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let sources = batch
            .column_by_name("source")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let pages = batch
            .column_by_name("page")
            .and_then(|c| c.as_any().downcast_ref::<Int64Array>());
        let license_types = batch
            .column_by_name("license_type")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let enterprise_types = batch
            .column_by_name("enterprise_type")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let distances = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

        let (Some(texts), Some(sources), Some(pages)) = (texts, sources, pages) else {
            continue;
        };

        for i in 0..batch.num_rows() {
            let score = distances
                .map(|d| (1.0 - d.value(i)).max(0.0))
                .unwrap_or(0.0);

            hits.push(RetrievedChunk {
                score,
                text: texts.value(i).to_string(),
                source: sources.value(i).to_string(),
                page: pages.value(i),
                license_type: license_types
                    .map(|l| l.value(i).to_string())
                    .unwrap_or_default(),
                enterprise_type: enterprise_types
                    .map(|e| e.value(i).to_string())
                    .unwrap_or_default(),
            });
        }
    }
    hits
}

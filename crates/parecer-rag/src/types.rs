use serde::{Deserialize, Serialize};

/// One page of text extracted from a PDF. Page numbers are 1-based.
#[derive(Debug, Clone)]
pub struct PdfPage {
    pub number: i64,
    pub text: String,
}

/// Internal chunk record for storage operations
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: String,
    pub text: String,
    pub source: String,
    pub page: i64,
    pub license_type: String,
    pub enterprise_type: String,
    pub vector: Vec<f32>,
    pub created_at: i64,
}

/// A chunk returned from vector search, with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub score: f32,
    pub text: String,
    pub source: String,
    pub page: i64,
    pub license_type: String,
    pub enterprise_type: String,
}

/// Equality filter over chunk metadata. All present fields must match.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChunkFilter {
    pub license_type: Option<String>,
    pub enterprise_type: Option<String>,
    pub source: Option<String>,
}

impl ChunkFilter {
    pub fn to_predicate(&self) -> Option<String> {
        let mut predicates = Vec::new();

        if let Some(ref license) = self.license_type {
            predicates.push(format!(
                "license_type = '{}'",
                license.replace('\'', "''")
            ));
        }
        if let Some(ref enterprise) = self.enterprise_type {
            predicates.push(format!(
                "enterprise_type = '{}'",
                enterprise.replace('\'', "''")
            ));
        }
        if let Some(ref source) = self.source {
            predicates.push(format!("source = '{}'", source.replace('\'', "''")));
        }

        if predicates.is_empty() {
            None
        } else {
            Some(predicates.join(" AND "))
        }
    }
}

/// Summary of an ingestion run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub files: usize,
    pub pages: usize,
    pub chunks: usize,
}

/// One citation bullet: a (source, license, enterprise) group and the
/// distinct pages that contributed retrieved chunks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CitationGroup {
    pub source: String,
    pub license_type: String,
    pub enterprise_type: String,
    /// Strictly ascending, deduplicated.
    pub pages: Vec<i64>,
}

/// How the answer text is produced from the retrieved context.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AnswerMode {
    /// LLM synthesis constrained to the retrieved excerpts.
    Generative,
    /// Verbatim top-scoring sentences from the retrieved excerpts.
    Extractive,
}

/// Final answer with citations and the raw hits that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<CitationGroup>,
    pub hits: Vec<RetrievedChunk>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_has_no_predicate() {
        assert_eq!(ChunkFilter::default().to_predicate(), None);
    }

    #[test]
    fn filter_builds_conjunction() {
        let filter = ChunkFilter {
            license_type: Some("LO".to_string()),
            enterprise_type: Some("posto".to_string()),
            source: None,
        };
        assert_eq!(
            filter.to_predicate().as_deref(),
            Some("license_type = 'LO' AND enterprise_type = 'posto'")
        );
    }

    #[test]
    fn filter_escapes_quotes() {
        let filter = ChunkFilter {
            license_type: None,
            enterprise_type: None,
            source: Some("o'reilly.pdf".to_string()),
        };
        assert_eq!(
            filter.to_predicate().as_deref(),
            Some("source = 'o''reilly.pdf'")
        );
    }
}

//! Generative answering through an LLM provider.

use crate::llm::{format_rag_prompt, GenerationConfig, LlmProvider};
use crate::types::RetrievedChunk;

/// Generate an answer grounded in the retrieved chunks. A provider failure
/// is reported inside the answer text so a chat session keeps working when
/// the model endpoint is down.
pub async fn generative_answer(
    provider: &dyn LlmProvider,
    query: &str,
    hits: &[RetrievedChunk],
    config: &GenerationConfig,
) -> String {
    let context: Vec<String> = hits
        .iter()
        .map(|h| {
            format!(
                "{} (página {}):\n{}",
                h.source, h.page, h.text
            )
        })
        .collect();

    let prompt = format_rag_prompt(query, &context);
    match provider.generate(&prompt, config).await {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            tracing::error!(error = %e, "LLM generation failed");
            format!("Não foi possível gerar a resposta: {}", e)
        }
    }
}

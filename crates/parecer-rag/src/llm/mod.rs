//! LLM providers for generative answering.

pub mod external;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use external::ExternalProvider;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.2,
            top_p: 0.9,
        }
    }
}

/// Which chat-completion API to talk to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ApiProvider {
    OpenAi,
    Ollama,
    Custom { endpoint: String },
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String>;
}

/// Map configured LLM settings onto a concrete API provider. An Ollama
/// endpoint is a server base URL; the chat-completions path is appended here.
pub fn provider_for(settings: &crate::config::LlmSettings) -> ApiProvider {
    use crate::config::LlmProviderKind;

    match (settings.provider, &settings.endpoint) {
        (LlmProviderKind::Ollama, Some(host)) => ApiProvider::Custom {
            endpoint: format!("{}/v1/chat/completions", host.trim_end_matches('/')),
        },
        (LlmProviderKind::Ollama, None) => ApiProvider::Ollama,
        (LlmProviderKind::OpenAi, Some(endpoint)) => ApiProvider::Custom {
            endpoint: endpoint.clone(),
        },
        (LlmProviderKind::OpenAi, None) => ApiProvider::OpenAi,
    }
}

/// Assemble the grounded prompt sent to the model: numbered context passages
/// followed by the user question, with an instruction to answer only from
/// the passages.
pub fn format_rag_prompt(query: &str, context: &[String]) -> String {
    let mut prompt = String::from(
        "Você é um assistente técnico de licenciamento ambiental. Responda à pergunta \
         usando somente os trechos de contexto abaixo. Se o contexto não contiver a \
         resposta, diga que a informação não foi encontrada nos documentos.\n\n",
    );

    for (i, passage) in context.iter().enumerate() {
        prompt.push_str(&format!("[Trecho {}]\n{}\n\n", i + 1, passage));
    }

    prompt.push_str(&format!("Pergunta: {}\nResposta:", query));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LlmProviderKind, LlmSettings};

    #[test]
    fn ollama_settings_map_to_ollama_provider() {
        let settings = LlmSettings {
            provider: LlmProviderKind::Ollama,
            model: Some("llama3".to_string()),
            api_key: String::new(),
            endpoint: None,
        };
        assert_eq!(provider_for(&settings), ApiProvider::Ollama);
    }

    #[test]
    fn ollama_host_override_becomes_chat_completions_endpoint() {
        let settings = LlmSettings {
            provider: LlmProviderKind::Ollama,
            model: Some("llama3".to_string()),
            api_key: String::new(),
            endpoint: Some("http://gpu-box:11434/".to_string()),
        };
        assert_eq!(
            provider_for(&settings),
            ApiProvider::Custom {
                endpoint: "http://gpu-box:11434/v1/chat/completions".to_string()
            }
        );
    }

    #[test]
    fn default_settings_map_to_openai() {
        assert_eq!(provider_for(&LlmSettings::default()), ApiProvider::OpenAi);
    }

    #[test]
    fn rag_prompt_numbers_passages_and_ends_with_question() {
        let prompt = format_rag_prompt(
            "Qual a validade da licença?",
            &["trecho um".to_string(), "trecho dois".to_string()],
        );
        assert!(prompt.contains("[Trecho 1]\ntrecho um"));
        assert!(prompt.contains("[Trecho 2]\ntrecho dois"));
        assert!(prompt.ends_with("Pergunta: Qual a validade da licença?\nResposta:"));
    }
}

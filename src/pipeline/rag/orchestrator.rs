use std::path::Path;

use super::prompt::{compose_prompt, Locale};
use super::retrieval::Retriever;
use super::RagError;
use crate::pipeline::storage::types::EmbeddingModel;

/// Trait for LLM text generation within the RAG pipeline.
pub trait LlmGenerate {
    fn generate(&self, prompt: &str) -> Result<String, RagError>;
}

/// What the service produced for one question.
#[derive(Debug, Clone, PartialEq)]
pub struct RagAnswer {
    pub text: String,
    pub locale: Locale,
    pub passages_used: usize,
    /// False when the fixed no-information reply was returned.
    pub grounded: bool,
}

/// Question answering over the health index.
///
/// Built once at startup and shared; retrieval state is loaded lazily and
/// read-only thereafter.
pub struct RagService<E: EmbeddingModel, G: LlmGenerate> {
    retriever: Retriever<E>,
    generator: G,
}

impl<E: EmbeddingModel, G: LlmGenerate> RagService<E, G> {
    pub fn new(embedder: E, generator: G, index_dir: &Path, top_k: usize) -> Self {
        Self {
            retriever: Retriever::new(embedder, index_dir, top_k),
            generator,
        }
    }

    /// Answer `query` in the language identified by `language_code`.
    ///
    /// Unregistered codes answer in English. When retrieval finds nothing the
    /// locale's no-information reply is returned and the model is not called.
    pub fn answer(&self, query: &str, language_code: &str) -> Result<RagAnswer, RagError> {
        let locale = Locale::resolve(language_code);
        let retrieved = self.retriever.retrieve(query)?;

        if retrieved.is_empty() {
            tracing::info!(
                locale = locale.code(),
                "No passages retrieved, sending no-information reply"
            );
            return Ok(RagAnswer {
                text: locale.no_information_reply().to_string(),
                locale,
                passages_used: 0,
                grounded: false,
            });
        }

        let passages: Vec<_> = retrieved.into_iter().map(|r| r.passage).collect();
        let prompt = compose_prompt(locale, &passages, query);
        let text = self.generator.generate(&prompt)?;

        tracing::info!(
            locale = locale.code(),
            passages = passages.len(),
            answer_len = text.len(),
            "Answer generated"
        );

        Ok(RagAnswer {
            text,
            locale,
            passages_used: passages.len(),
            grounded: true,
        })
    }
}

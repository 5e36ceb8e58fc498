pub mod language;
pub mod prompt;
pub mod ollama;
pub mod retrieval;
pub mod orchestrator;

use thiserror::Error;

use crate::pipeline::storage::StorageError;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Ollama connection failed: {0}")]
    OllamaConnection(String),

    #[error("Ollama returned error {status}: {body}")]
    OllamaError { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Model '{0}' is not available on the Ollama server")]
    NoModel(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Index error: {0}")]
    Index(#[from] StorageError),

    #[error("Invalid prompt template for '{locale}': {reason}")]
    Template { locale: &'static str, reason: String },
}

pub mod types;
pub mod embedder;
pub mod vectordb;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Vector DB error: {0}")]
    VectorDb(String),

    #[error("Index was built with embedding model '{index_model}', but '{configured}' is configured")]
    ModelMismatch {
        index_model: String,
        configured: String,
    },

    #[error("Embedding dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding model not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("Embedding model initialization: {0}")]
    ModelInit(String),

    #[error("Tokenization error: {0}")]
    Tokenization(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Embedding service unreachable at {0}")]
    EmbeddingConnection(String),
}

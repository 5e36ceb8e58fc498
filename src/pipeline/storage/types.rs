use super::StorageError;
use crate::pipeline::ingest::types::Passage;

/// Embedding model abstraction.
///
/// `model_id` is recorded in the index at ingestion time and checked again
/// when serving, so both sides must report the same identity.
pub trait EmbeddingModel {
    fn embed(&self, text: &str) -> Result<Vec<f32>, StorageError>;
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StorageError>;
    fn model_id(&self) -> &str;
}

/// Allow `Box<dyn EmbeddingModel>` to be used as `&impl EmbeddingModel`.
impl EmbeddingModel for Box<dyn EmbeddingModel + Send + Sync> {
    fn embed(&self, text: &str) -> Result<Vec<f32>, StorageError> {
        (**self).embed(text)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StorageError> {
        (**self).embed_batch(texts)
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

/// A passage returned by similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPassage {
    pub id: String,
    pub passage: Passage,
    pub score: f32,
}

/// Summary of what is persisted in an index directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub embedding_model: Option<String>,
    pub dimension: Option<usize>,
    pub passages: usize,
}

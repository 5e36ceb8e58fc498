use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use super::RagError;
use crate::pipeline::storage::types::{EmbeddingModel, ScoredPassage};
use crate::pipeline::storage::vectordb::VectorIndex;

/// Nearest-passage lookup over the persisted index.
///
/// The index is opened on first use and kept in memory afterwards. Concurrent
/// first callers serialize on `init`; a failed open is retried by the next call.
pub struct Retriever<E: EmbeddingModel> {
    embedder: E,
    index_dir: PathBuf,
    top_k: usize,
    index: OnceLock<VectorIndex>,
    init: Mutex<()>,
}

impl<E: EmbeddingModel> Retriever<E> {
    pub fn new(embedder: E, index_dir: &Path, top_k: usize) -> Self {
        Self {
            embedder,
            index_dir: index_dir.to_path_buf(),
            top_k,
            index: OnceLock::new(),
            init: Mutex::new(()),
        }
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    fn index(&self) -> Result<&VectorIndex, RagError> {
        if let Some(index) = self.index.get() {
            return Ok(index);
        }

        let _guard = self.init.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(index) = self.index.get() {
            return Ok(index);
        }

        let loaded = VectorIndex::open(&self.index_dir, self.embedder.model_id())?;
        Ok(self.index.get_or_init(|| loaded))
    }

    /// The `top_k` most similar passages, best first.
    /// An empty index returns nothing without embedding the query.
    pub fn retrieve(&self, query: &str) -> Result<Vec<ScoredPassage>, RagError> {
        let index = self.index()?;
        if index.is_empty() {
            tracing::debug!("Index is empty, skipping query embedding");
            return Ok(Vec::new());
        }

        let query_embedding = self
            .embedder
            .embed(query)
            .map_err(|e| RagError::EmbeddingFailed(e.to_string()))?;

        let results = index.search(&query_embedding, self.top_k)?;
        tracing::debug!(
            retrieved = results.len(),
            top_score = results.first().map(|r| r.score),
            "Passages retrieved"
        );
        Ok(results)
    }
}

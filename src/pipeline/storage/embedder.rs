use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::types::EmbeddingModel;
use super::StorageError;
use crate::config::{EmbedderKind, EmbedderSettings};

/// Output dimension of paraphrase-multilingual-mpnet-base-v2.
pub const MULTILINGUAL_EMBEDDING_DIM: usize = 768;

/// Per-request timeout for Ollama embedding calls, in seconds.
pub const EMBED_TIMEOUT_SECS: u64 = 120;

pub type BoxedEmbedder = Box<dyn EmbeddingModel + Send + Sync>;

/// Construct the configured embedding backend.
pub fn build_embedder(settings: &EmbedderSettings) -> Result<BoxedEmbedder, StorageError> {
    match settings.kind {
        EmbedderKind::Ollama => {
            let embedder =
                OllamaEmbedder::new(&settings.ollama_url, &settings.model, EMBED_TIMEOUT_SECS)?;
            tracing::info!(
                url = embedder.base_url(),
                model = %settings.model,
                "Using Ollama embedder"
            );
            Ok(Box::new(embedder))
        }
        #[cfg(feature = "onnx-embeddings")]
        EmbedderKind::Onnx => Ok(Box::new(OnnxEmbedder::load(
            &settings.onnx_model_dir,
            &settings.model,
        )?)),
        #[cfg(not(feature = "onnx-embeddings"))]
        EmbedderKind::Onnx => Err(StorageError::ModelInit(
            "ONNX embeddings need a build with the `onnx-embeddings` feature".into(),
        )),
    }
}

/// Scale a vector to unit length in place (zero vectors are left untouched).
pub fn l2_normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in vec.iter_mut() {
            *val /= norm;
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Ollama embedder (default)
// ═══════════════════════════════════════════════════════════

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embeddings served by a local Ollama instance through `/api/embed`.
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self, StorageError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StorageError::ModelInit(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StorageError> {
        let url = format!("{}/api/embed", self.base_url);
        let body = OllamaEmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response = self.client.post(&url).json(&body).send().map_err(|e| {
            if e.is_connect() {
                StorageError::EmbeddingConnection(self.base_url.clone())
            } else {
                StorageError::Embedding(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(StorageError::Embedding(format!(
                "Ollama returned {}: {body}",
                status.as_u16()
            )));
        }

        let parsed: OllamaEmbedResponse = response
            .json()
            .map_err(|e| StorageError::Embedding(format!("Response parsing: {e}")))?;

        if parsed.embeddings.len() != texts.len() {
            return Err(StorageError::Embedding(format!(
                "Requested {} embeddings, received {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }

        Ok(parsed
            .embeddings
            .into_iter()
            .map(|mut v| {
                l2_normalize(&mut v);
                v
            })
            .collect())
    }
}

impl EmbeddingModel for OllamaEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, StorageError> {
        self.request(&[text])?
            .pop()
            .ok_or_else(|| StorageError::Embedding("Empty embedding response".into()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StorageError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// ═══════════════════════════════════════════════════════════
// ONNX embedder (`onnx-embeddings` feature)
// ═══════════════════════════════════════════════════════════

#[cfg(feature = "onnx-embeddings")]
mod onnx {
    use super::{l2_normalize, EmbeddingModel, StorageError, MULTILINGUAL_EMBEDDING_DIM};
    use ort::session::Session;
    use std::path::Path;
    use std::sync::Mutex;

    /// Local inference of paraphrase-multilingual-mpnet-base-v2 via ONNX Runtime.
    ///
    /// The model directory must contain `model.onnx` and `tokenizer.json`.
    /// The XLM-R based export takes `input_ids` and `attention_mask` only.
    ///
    /// `ort::Session::run` needs `&mut self`, hence the Mutex.
    pub struct OnnxEmbedder {
        session: Mutex<Session>,
        tokenizer: tokenizers::Tokenizer,
        model_id: String,
    }

    impl OnnxEmbedder {
        pub fn load(model_dir: &Path, model_id: &str) -> Result<Self, StorageError> {
            let model_path = model_dir.join("model.onnx");
            let tokenizer_path = model_dir.join("tokenizer.json");

            if !model_path.exists() {
                return Err(StorageError::ModelNotFound(model_path));
            }
            if !tokenizer_path.exists() {
                return Err(StorageError::ModelNotFound(tokenizer_path));
            }

            let session = Session::builder()
                .map_err(|e: ort::Error| StorageError::ModelInit(e.to_string()))?
                .with_intra_threads(2)
                .map_err(|e: ort::Error| StorageError::ModelInit(e.to_string()))?
                .commit_from_file(&model_path)
                .map_err(|e: ort::Error| {
                    StorageError::ModelInit(format!("ONNX load failed: {e}"))
                })?;

            let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
                .map_err(|e| StorageError::ModelInit(format!("Tokenizer load failed: {e}")))?;

            tracing::info!(model_dir = %model_dir.display(), "ONNX embedder loaded");

            Ok(Self {
                session: Mutex::new(session),
                tokenizer,
                model_id: model_id.to_string(),
            })
        }

        /// Tokenize, run inference, mean-pool over the attention mask, normalise.
        fn infer(&self, text: &str) -> Result<Vec<f32>, StorageError> {
            use ort::value::TensorRef;

            let encoding = self
                .tokenizer
                .encode(text, true)
                .map_err(|e| StorageError::Tokenization(e.to_string()))?;

            let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
            let attention_mask: Vec<i64> = encoding
                .get_attention_mask()
                .iter()
                .map(|&m| m as i64)
                .collect();
            let seq_len = input_ids.len();

            let ids_array = ndarray::Array2::from_shape_vec((1, seq_len), input_ids)
                .map_err(|e| StorageError::Embedding(e.to_string()))?;
            let mask_array = ndarray::Array2::from_shape_vec((1, seq_len), attention_mask.clone())
                .map_err(|e| StorageError::Embedding(e.to_string()))?;

            let ids_tensor = TensorRef::from_array_view(&ids_array)
                .map_err(|e| StorageError::Embedding(e.to_string()))?;
            let mask_tensor = TensorRef::from_array_view(&mask_array)
                .map_err(|e| StorageError::Embedding(e.to_string()))?;

            let mut session = self
                .session
                .lock()
                .map_err(|_| StorageError::Embedding("Session lock poisoned".to_string()))?;

            let outputs = session
                .run(ort::inputs![ids_tensor, mask_tensor])
                .map_err(|e| StorageError::Embedding(format!("ONNX inference failed: {e}")))?;

            let (shape, output_data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| StorageError::Embedding(format!("Output extraction: {e}")))?;

            if shape.len() != 3 || shape[2] as usize != MULTILINGUAL_EMBEDDING_DIM {
                return Err(StorageError::Embedding(format!(
                    "Unexpected output shape: {shape:?}, \
                     expected [1, {seq_len}, {MULTILINGUAL_EMBEDDING_DIM}]"
                )));
            }

            let mut pooled = vec![0.0f32; MULTILINGUAL_EMBEDDING_DIM];
            let mut mask_sum = 0.0f32;

            for (token_idx, &mask_val_i64) in attention_mask.iter().enumerate().take(seq_len) {
                let mask_val = mask_val_i64 as f32;
                mask_sum += mask_val;
                let offset = token_idx * MULTILINGUAL_EMBEDDING_DIM;
                for (dim_idx, p) in pooled.iter_mut().enumerate() {
                    *p += output_data[offset + dim_idx] * mask_val;
                }
            }

            if mask_sum > 0.0 {
                for val in &mut pooled {
                    *val /= mask_sum;
                }
            }

            l2_normalize(&mut pooled);
            Ok(pooled)
        }
    }

    impl EmbeddingModel for OnnxEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, StorageError> {
            self.infer(text)
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StorageError> {
            texts.iter().map(|t| self.infer(t)).collect()
        }

        fn model_id(&self) -> &str {
            &self.model_id
        }
    }
}

#[cfg(feature = "onnx-embeddings")]
pub use onnx::OnnxEmbedder;

// ═══════════════════════════════════════════════════════════
// Mock embedder
// ═══════════════════════════════════════════════════════════

/// Deterministic embedder for tests.
pub struct MockEmbedder {
    dimension: usize,
    model_id: String,
}

impl MockEmbedder {
    pub const MODEL_ID: &'static str = "mock-embedder";

    pub fn new() -> Self {
        Self::with_model_id(Self::MODEL_ID)
    }

    pub fn with_model_id(model_id: &str) -> Self {
        Self {
            dimension: 32,
            model_id: model_id.to_string(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingModel for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, StorageError> {
        Ok(deterministic_vector(text, self.dimension))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StorageError> {
        Ok(texts
            .iter()
            .map(|t| deterministic_vector(t, self.dimension))
            .collect())
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Generate a deterministic unit vector from text (for testing).
fn deterministic_vector(text: &str, dim: usize) -> Vec<f32> {
    let mut vec = vec![0.0f32; dim];
    let bytes = text.as_bytes();

    for (i, slot) in vec.iter_mut().enumerate() {
        let byte_idx = i % bytes.len().max(1);
        *slot = (bytes.get(byte_idx).copied().unwrap_or(0) as f32 + i as f32) / 255.0;
    }

    l2_normalize(&mut vec);
    vec
}

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "Arogya";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default local Ollama instance.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Ollama tag for paraphrase-multilingual-mpnet-base-v2.
pub const RECOMMENDED_EMBEDDING_MODEL: &str = "paraphrase-multilingual";

/// Directory holding the persisted similarity index.
pub const DEFAULT_INDEX_DIR: &str = "health_index";

/// Directory holding the source health datasets.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Liveness endpoint bind address.
pub const DEFAULT_HEALTH_ADDR: &str = "127.0.0.1:8000";

/// Passages handed to the prompt per question.
pub const DEFAULT_TOP_K: usize = 4;

/// Messages processed concurrently by the chat gateway.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

/// Telegram clears the "typing…" status after ~5s, so refresh before that.
pub const TYPING_INTERVAL: Duration = Duration::from_secs(4);

/// The only text a user ever sees when the pipeline fails.
pub const APOLOGY_MESSAGE: &str = "I encountered an error while analyzing your message.";

/// Default log filter when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "arogya=info,arogya_lib=info,warn"
}

/// Get the application data directory (~/.arogya/)
pub fn app_data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".arogya"))
}

/// Default ONNX model directory for paraphrase-multilingual-mpnet-base-v2.
pub fn default_onnx_model_dir() -> PathBuf {
    app_data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("models")
        .join("paraphrase-multilingual-mpnet-base-v2")
}

/// Where ingestion reads its four source files from.
#[derive(Debug, Clone)]
pub struct DataSources {
    pub disease_symptoms: PathBuf,
    pub disease_descriptions: PathBuf,
    pub disease_precautions: PathBuf,
    pub vaccination_stats: PathBuf,
}

impl DataSources {
    /// Standard file names inside a data directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            disease_symptoms: dir.join("dataset.csv"),
            disease_descriptions: dir.join("symptom_Description.csv"),
            disease_precautions: dir.join("symptom_precaution.csv"),
            vaccination_stats: dir.join("Baby_Vaccination_India_2021.xlsx"),
        }
    }
}

/// Which backend produces embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EmbedderKind {
    /// Local Ollama server (`/api/embed`).
    Ollama,
    /// In-process ONNX Runtime; needs the `onnx-embeddings` feature.
    Onnx,
}

/// Embedding backend selection shared by every subcommand.
#[derive(Debug, Clone)]
pub struct EmbedderSettings {
    pub kind: EmbedderKind,
    pub model: String,
    pub ollama_url: String,
    pub onnx_model_dir: PathBuf,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Reject a required setting that is absent or blank.
pub fn require(field: &'static str, value: Option<&str>) -> Result<String, ConfigError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ConfigError::Missing(field)),
    }
}

/// Everything `serve` needs, validated before any network activity.
#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub telegram_token: String,
    pub llm_model: String,
    pub embedding_model: String,
    pub ollama_url: String,
    pub index_dir: PathBuf,
    pub health_addr: SocketAddr,
    pub top_k: usize,
    pub max_in_flight: usize,
}

impl ServeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("TELEGRAM_BOT_TOKEN", Some(&self.telegram_token))?;
        require("AROGYA_LLM_MODEL", Some(&self.llm_model))?;
        require("AROGYA_EMBEDDING_MODEL", Some(&self.embedding_model))?;
        if self.top_k == 0 {
            return Err(ConfigError::Invalid {
                field: "AROGYA_TOP_K",
                reason: "must be at least 1".into(),
            });
        }
        if self.max_in_flight == 0 {
            return Err(ConfigError::Invalid {
                field: "AROGYA_MAX_IN_FLIGHT",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Parse a `host:port` bind address.
pub fn parse_bind_addr(raw: &str) -> Result<SocketAddr, ConfigError> {
    raw.parse().map_err(|e| ConfigError::Invalid {
        field: "AROGYA_HEALTH_ADDR",
        reason: format!("{raw}: {e}"),
    })
}

pub mod config;
pub mod pipeline;
pub mod gateway;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use config::ConfigError;
use gateway::GatewayError;
use pipeline::ingest::IngestError;
use pipeline::rag::RagError;
use pipeline::storage::StorageError;

/// Top-level failure of a subcommand.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Rag(#[from] RagError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

impl AppError {
    /// Process exit status: 2 for configuration problems, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            _ => 1,
        }
    }
}

/// Install the global fmt subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}

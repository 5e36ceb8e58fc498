pub mod types;
pub mod loader;
pub mod synthesize;
pub mod orchestrator;

use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::storage::StorageError;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Source file not found: {0}")]
    MissingFile(PathBuf),

    #[error("Malformed delimited file {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Unreadable spreadsheet {path}: {reason}")]
    Spreadsheet { path: PathBuf, reason: String },

    #[error("Column '{column}' missing from {table}")]
    MissingColumn { column: String, table: String },

    #[error("No passages were produced from any data source")]
    EmptyCorpus,

    #[error("Index error: {0}")]
    Storage(#[from] StorageError),
}

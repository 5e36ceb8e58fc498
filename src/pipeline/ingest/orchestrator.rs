use std::path::{Path, PathBuf};

use super::loader;
use super::synthesize;
use super::types::{Passage, PassageKind};
use super::IngestError;
use crate::config::DataSources;
use crate::pipeline::storage::types::EmbeddingModel;
use crate::pipeline::storage::vectordb::{IndexWriter, WriteMode};
use crate::pipeline::storage::StorageError;

/// Passages sent to the embedder per request.
pub const EMBED_BATCH_SIZE: usize = 32;

/// Outcome of one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub index_dir: PathBuf,
    pub embedding_model: String,
    pub disease_passages: usize,
    pub vaccination_passages: usize,
    pub passages_stored: usize,
    pub replaced: bool,
}

/// Load and synthesize every data source.
///
/// The disease files and the vaccination file are independent sources: a
/// failure in one is logged and the other still contributes its passages.
pub fn collect_passages(sources: &DataSources) -> Vec<Passage> {
    let mut passages = Vec::new();

    let disease = loader::load_disease_tables(sources)
        .and_then(|tables| synthesize::disease_passages(&tables));
    match disease {
        Ok(disease) => {
            tracing::info!(count = disease.len(), "Disease passages synthesized");
            passages.extend(disease);
        }
        Err(e) => tracing::error!(error = %e, "Skipping disease data"),
    }

    let vaccination_path = &sources.vaccination_stats;
    match loader::load_vaccination_stats(vaccination_path) {
        Ok(table) => {
            let source = vaccination_path.display().to_string();
            let vaccination = synthesize::vaccination_passages(&table, &source);
            tracing::info!(count = vaccination.len(), "Vaccination passages synthesized");
            passages.extend(vaccination);
        }
        Err(e) => tracing::error!(
            error = %e,
            path = %vaccination_path.display(),
            "Skipping vaccination data"
        ),
    }

    passages
}

/// Embed `passages` and persist them in the index at `index_dir`.
///
/// `make_embedder` is only called once there is something to embed, so an
/// empty corpus never touches the embedding backend.
pub fn build_index<E, F>(
    passages: &[Passage],
    index_dir: &Path,
    mode: WriteMode,
    make_embedder: F,
) -> Result<IngestReport, IngestError>
where
    E: EmbeddingModel,
    F: FnOnce() -> Result<E, StorageError>,
{
    if passages.is_empty() {
        return Err(IngestError::EmptyCorpus);
    }

    let embedder = make_embedder()?;
    // Opened before embedding so a model mismatch fails fast.
    let mut writer = IndexWriter::open(index_dir, embedder.model_id(), mode)?;

    let total = passages.len();
    let mut embeddings = Vec::with_capacity(total);
    for (batch_idx, batch) in passages.chunks(EMBED_BATCH_SIZE).enumerate() {
        let texts: Vec<&str> = batch.iter().map(|p| p.body.as_str()).collect();
        embeddings.extend(embedder.embed_batch(&texts)?);
        tracing::info!(
            batch = batch_idx + 1,
            embedded = embeddings.len(),
            total,
            "Embedding progress"
        );
    }

    let passages_stored = writer.commit(passages, &embeddings)?;
    let count_kind = |kind| passages.iter().filter(|p| p.metadata.kind == kind).count();

    Ok(IngestReport {
        index_dir: index_dir.to_path_buf(),
        embedding_model: embedder.model_id().to_string(),
        disease_passages: count_kind(PassageKind::Disease),
        vaccination_passages: count_kind(PassageKind::Vaccination),
        passages_stored,
        replaced: mode == WriteMode::Replace,
    })
}

/// The one-shot ingestion run: load, synthesize, embed, persist.
pub fn run_ingestion<E, F>(
    sources: &DataSources,
    index_dir: &Path,
    mode: WriteMode,
    make_embedder: F,
) -> Result<IngestReport, IngestError>
where
    E: EmbeddingModel,
    F: FnOnce() -> Result<E, StorageError>,
{
    let passages = collect_passages(sources);
    let report = build_index(&passages, index_dir, mode, make_embedder)?;

    tracing::info!(
        index_dir = %report.index_dir.display(),
        model = %report.embedding_model,
        stored = report.passages_stored,
        replaced = report.replaced,
        "Ingestion complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::fs;

    use super::*;
    use crate::pipeline::storage::embedder::MockEmbedder;
    use crate::pipeline::storage::vectordb::{index_stats, VectorIndex};

    fn write_disease_files(dir: &Path) {
        fs::write(
            dir.join("dataset.csv"),
            "Disease,Symptom_1,Symptom_2\nFlu,fever,cough\nFlu,fever,chills\nMalaria,chills,\n",
        )
        .unwrap();
        fs::write(
            dir.join("symptom_Description.csv"),
            "Disease,Description\nFlu,A viral infection\nMalaria,A mosquito-borne disease\n",
        )
        .unwrap();
        fs::write(
            dir.join("symptom_precaution.csv"),
            "Disease,Precaution_1,Precaution_2\nFlu,rest,fluids\n",
        )
        .unwrap();
    }

    fn mock_embedder() -> Result<MockEmbedder, StorageError> {
        Ok(MockEmbedder::new())
    }

    fn write_vaccination_csv(dir: &Path) -> PathBuf {
        let path = dir.join("vaccination.csv");
        let mut body = String::from("title\nsubtitle\nheader\n");
        body.push_str("Odisha,Rural,90.5,80.1,98.2,,,,,,,,,\n");
        fs::write(&path, body).unwrap();
        path
    }

    fn sources(dir: &Path) -> DataSources {
        let mut sources = DataSources::in_dir(dir);
        sources.vaccination_stats = write_vaccination_csv(dir);
        sources
    }

    #[test]
    fn collects_passages_from_both_sources() {
        let dir = tempfile::tempdir().unwrap();
        write_disease_files(dir.path());

        let passages = collect_passages(&sources(dir.path()));
        let count = |kind: PassageKind| passages.iter().filter(|p| p.metadata.kind == kind).count();
        let diseases = count(PassageKind::Disease);
        let vaccinations = count(PassageKind::Vaccination);
        assert_eq!(diseases, 2);
        assert_eq!(vaccinations, 3);
    }

    #[test]
    fn failing_source_does_not_stop_the_other() {
        let dir = tempfile::tempdir().unwrap();
        // No disease files written.
        let passages = collect_passages(&sources(dir.path()));
        assert_eq!(passages.len(), 3);
        assert!(passages.iter().all(|p| p.metadata.kind == PassageKind::Vaccination));
    }

    #[test]
    fn empty_corpus_aborts_before_embedder_is_built() {
        let dir = tempfile::tempdir().unwrap();
        let called = Cell::new(false);

        let result = build_index(&[], dir.path(), WriteMode::Append, || {
            called.set(true);
            Ok(MockEmbedder::new())
        });

        assert!(matches!(result, Err(IngestError::EmptyCorpus)));
        assert!(!called.get());
        assert!(!dir.path().join("index.db").exists());
    }

    #[test]
    fn run_ingestion_persists_every_passage() {
        let data = tempfile::tempdir().unwrap();
        let index = tempfile::tempdir().unwrap();
        write_disease_files(data.path());

        let report = run_ingestion(&sources(data.path()), index.path(), WriteMode::Append, || {
            Ok(MockEmbedder::new())
        })
        .unwrap();

        assert_eq!(report.disease_passages, 2);
        assert_eq!(report.vaccination_passages, 3);
        assert_eq!(report.passages_stored, 5);
        assert_eq!(report.embedding_model, MockEmbedder::MODEL_ID);

        let loaded = VectorIndex::open(index.path(), MockEmbedder::MODEL_ID).unwrap();
        assert_eq!(loaded.len(), 5);
    }

    #[test]
    fn batches_larger_corpora() {
        let index = tempfile::tempdir().unwrap();
        let passages: Vec<Passage> = (0..(EMBED_BATCH_SIZE * 2 + 5))
            .map(|i| {
                let column = format!("Stat {i}");
                synthesize::vaccination_passage("Odisha (Rural)", &column, "50", "test")
            })
            .collect();

        let report =
            build_index(&passages, index.path(), WriteMode::Append, mock_embedder).unwrap();
        assert_eq!(report.passages_stored, passages.len());
        assert_eq!(index_stats(index.path()).unwrap().passages, passages.len());
    }

    #[test]
    fn replace_mode_discards_previous_run() {
        let data = tempfile::tempdir().unwrap();
        let index = tempfile::tempdir().unwrap();
        write_disease_files(data.path());
        let sources = sources(data.path());

        run_ingestion(&sources, index.path(), WriteMode::Append, mock_embedder).unwrap();
        run_ingestion(&sources, index.path(), WriteMode::Append, mock_embedder).unwrap();
        assert_eq!(index_stats(index.path()).unwrap().passages, 10);

        let report =
            run_ingestion(&sources, index.path(), WriteMode::Replace, mock_embedder).unwrap();
        assert!(report.replaced);
        assert_eq!(index_stats(index.path()).unwrap().passages, 5);
    }

    #[test]
    fn appending_with_another_model_fails() {
        let data = tempfile::tempdir().unwrap();
        let index = tempfile::tempdir().unwrap();
        write_disease_files(data.path());
        let sources = sources(data.path());

        run_ingestion(&sources, index.path(), WriteMode::Append, mock_embedder).unwrap();
        let err = run_ingestion(&sources, index.path(), WriteMode::Append, || {
            Ok(MockEmbedder::with_model_id("other-model"))
        })
        .unwrap_err();

        assert!(matches!(err, IngestError::Storage(StorageError::ModelMismatch { .. })));
    }
}

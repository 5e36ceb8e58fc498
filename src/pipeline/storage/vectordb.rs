//! Persisted similarity index.
//!
//! Passages and their embeddings live in `index.db` (SQLite) inside a named
//! directory. Ingestion writes through [`IndexWriter`]; serving opens the file
//! read-only once with [`VectorIndex::open`], loads every vector into memory and
//! answers nearest-neighbour queries by brute-force cosine similarity.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use super::types::{IndexStats, ScoredPassage};
use super::StorageError;
use crate::pipeline::ingest::types::{Passage, PassageKind, PassageMetadata};

/// File name of the SQLite database inside the index directory.
pub const INDEX_FILE: &str = "index.db";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS index_meta (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS passages (
        id          TEXT PRIMARY KEY,
        body        TEXT NOT NULL,
        source      TEXT NOT NULL,
        entity_key  TEXT NOT NULL,
        kind        TEXT NOT NULL,
        embedding   BLOB NOT NULL,
        ingested_at TEXT NOT NULL
    );";

const META_MODEL: &str = "embedding_model";
const META_DIMENSION: &str = "dimension";
const META_CREATED_AT: &str = "created_at";
const META_UPDATED_AT: &str = "updated_at";

/// Whether a new ingestion run keeps or discards what is already persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Append,
    Replace,
}

pub fn index_path(dir: &Path) -> PathBuf {
    dir.join(INDEX_FILE)
}

fn encode_embedding(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>, StorageError> {
    if bytes.len() % 4 != 0 {
        return Err(StorageError::VectorDb(format!(
            "Embedding blob of {} bytes is not a whole number of f32 values",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn read_meta(conn: &Connection, key: &str) -> Result<Option<String>, StorageError> {
    Ok(conn
        .query_row(
            "SELECT value FROM index_meta WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()?)
}

fn read_dimension(conn: &Connection) -> Result<Option<usize>, StorageError> {
    read_meta(conn, META_DIMENSION)?
        .map(|raw| {
            raw.parse::<usize>()
                .map_err(|_| StorageError::VectorDb(format!("Invalid stored dimension: {raw}")))
        })
        .transpose()
}

fn has_schema(conn: &Connection) -> Result<bool, StorageError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master
         WHERE type='table' AND name IN ('index_meta', 'passages')",
        [],
        |row| row.get(0),
    )?;
    Ok(count == 2)
}

// ═══════════════════════════════════════════════════════════
// Writer (ingestion)
// ═══════════════════════════════════════════════════════════

/// Write handle used by the one-shot ingestion run.
pub struct IndexWriter {
    conn: Connection,
    model_id: String,
    mode: WriteMode,
    dimension: Option<usize>,
}

impl IndexWriter {
    /// Open (creating if needed) the index in `dir` for the given embedding model.
    ///
    /// Appending to an index built with another model is refused; replacing
    /// reassigns the index to the new model.
    pub fn open(dir: &Path, model_id: &str, mode: WriteMode) -> Result<Self, StorageError> {
        std::fs::create_dir_all(dir)?;
        let conn = Connection::open(index_path(dir))?;
        conn.execute_batch("PRAGMA journal_mode=DELETE;")?;
        conn.execute_batch(SCHEMA)?;

        let mut dimension = None;
        if mode == WriteMode::Append {
            if let Some(existing) = read_meta(&conn, META_MODEL)? {
                if existing != model_id {
                    return Err(StorageError::ModelMismatch {
                        index_model: existing,
                        configured: model_id.to_string(),
                    });
                }
            }
            dimension = read_dimension(&conn)?;
        }

        Ok(Self {
            conn,
            model_id: model_id.to_string(),
            mode,
            dimension,
        })
    }

    /// Persist passages with their vectors in a single transaction.
    /// In replace mode the previous contents are deleted in the same transaction.
    pub fn commit(
        &mut self,
        passages: &[Passage],
        embeddings: &[Vec<f32>],
    ) -> Result<usize, StorageError> {
        if passages.len() != embeddings.len() {
            return Err(StorageError::VectorDb(
                "Passage count does not match embedding count".into(),
            ));
        }

        // A stored dimension of 0 comes from an empty commit and binds nothing.
        let dimension = match (self.dimension, embeddings.first()) {
            (Some(d), _) if d > 0 => d,
            (_, Some(first)) => first.len(),
            (_, None) => 0,
        };
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension) {
            return Err(StorageError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        let now = chrono::Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;

        if self.mode == WriteMode::Replace {
            let cleared = tx.execute("DELETE FROM passages", [])?;
            tx.execute("DELETE FROM index_meta", [])?;
            tracing::info!(cleared, "Existing index contents replaced");
        }

        tx.execute(
            "INSERT OR IGNORE INTO index_meta (key, value) VALUES (?1, ?2)",
            params![META_CREATED_AT, now],
        )?;
        for (key, value) in [
            (META_MODEL, self.model_id.clone()),
            (META_DIMENSION, dimension.to_string()),
            (META_UPDATED_AT, now.clone()),
        ] {
            tx.execute(
                "INSERT OR REPLACE INTO index_meta (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?;
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO passages (id, body, source, entity_key, kind, embedding, ingested_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for (passage, embedding) in passages.iter().zip(embeddings) {
                stmt.execute(params![
                    uuid::Uuid::new_v4().to_string(),
                    passage.body,
                    passage.metadata.source,
                    passage.metadata.entity_key,
                    passage.metadata.kind.as_str(),
                    encode_embedding(embedding),
                    now,
                ])?;
            }
        }

        tx.commit()?;
        self.dimension = Some(dimension);
        Ok(passages.len())
    }
}

/// Read the index metadata without loading vectors. A missing index reports zero passages.
pub fn index_stats(dir: &Path) -> Result<IndexStats, StorageError> {
    let path = index_path(dir);
    if !path.is_file() {
        return Ok(IndexStats {
            embedding_model: None,
            dimension: None,
            passages: 0,
        });
    }

    let conn = Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    if !has_schema(&conn)? {
        return Ok(IndexStats {
            embedding_model: None,
            dimension: None,
            passages: 0,
        });
    }

    let passages: i64 = conn.query_row("SELECT COUNT(*) FROM passages", [], |row| row.get(0))?;
    Ok(IndexStats {
        embedding_model: read_meta(&conn, META_MODEL)?,
        dimension: read_dimension(&conn)?,
        passages: passages as usize,
    })
}

// ═══════════════════════════════════════════════════════════
// Read-only index (serving)
// ═══════════════════════════════════════════════════════════

struct IndexedPassage {
    id: String,
    passage: Passage,
    embedding: Vec<f32>,
}

/// In-memory copy of a persisted index; immutable once loaded.
pub struct VectorIndex {
    entries: Vec<IndexedPassage>,
    dimension: Option<usize>,
}

impl VectorIndex {
    /// Load the index in `dir`, checking it was built with `expected_model`.
    ///
    /// A directory without an index file (or with an empty index) yields an
    /// empty index rather than an error.
    pub fn open(dir: &Path, expected_model: &str) -> Result<Self, StorageError> {
        let path = index_path(dir);
        if !path.is_file() {
            tracing::warn!(
                path = %path.display(),
                "No persisted index found, serving without context"
            );
            return Ok(Self::empty());
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        if !has_schema(&conn)? {
            tracing::warn!(
                path = %path.display(),
                "Index file has no schema, serving without context"
            );
            return Ok(Self::empty());
        }

        if let Some(index_model) = read_meta(&conn, META_MODEL)? {
            if index_model != expected_model {
                return Err(StorageError::ModelMismatch {
                    index_model,
                    configured: expected_model.to_string(),
                });
            }
        }
        let dimension = read_dimension(&conn)?;

        let mut stmt = conn.prepare(
            "SELECT id, body, source, entity_key, kind, embedding FROM passages ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Vec<u8>>(5)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, body, source, entity_key, kind, blob) = row?;
            let kind = PassageKind::parse(&kind)
                .ok_or_else(|| StorageError::VectorDb(format!("Unknown passage kind '{kind}'")))?;
            entries.push(IndexedPassage {
                id,
                passage: Passage {
                    body,
                    metadata: PassageMetadata {
                        source,
                        entity_key,
                        kind,
                    },
                },
                embedding: decode_embedding(&blob)?,
            });
        }

        tracing::info!(
            path = %path.display(),
            passages = entries.len(),
            model = expected_model,
            "Vector index loaded"
        );

        Ok(Self { entries, dimension })
    }

    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            dimension: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `top_k` passages most similar to `query_embedding`, best first.
    pub fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredPassage>, StorageError> {
        if let Some(expected) = self.dimension {
            if !self.entries.is_empty() && query_embedding.len() != expected {
                return Err(StorageError::DimensionMismatch {
                    expected,
                    actual: query_embedding.len(),
                });
            }
        }

        let mut scored: Vec<(f32, &IndexedPassage)> = self
            .entries
            .iter()
            .map(|entry| (cosine_similarity(query_embedding, &entry.embedding), entry))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, entry)| ScoredPassage {
                id: entry.id.clone(),
                passage: entry.passage.clone(),
                score,
            })
            .collect())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(entity: &str, kind: PassageKind) -> Passage {
        Passage {
            body: format!("About {entity}"),
            metadata: PassageMetadata {
                source: "test".into(),
                entity_key: entity.into(),
                kind,
            },
        }
    }

    fn write(dir: &Path, model: &str, mode: WriteMode, items: &[(&str, Vec<f32>)]) -> usize {
        let passages: Vec<_> = items
            .iter()
            .map(|(e, _)| passage(e, PassageKind::Disease))
            .collect();
        let vectors: Vec<_> = items.iter().map(|(_, v)| v.clone()).collect();
        IndexWriter::open(dir, model, mode)
            .unwrap()
            .commit(&passages, &vectors)
            .unwrap()
    }

    #[test]
    fn cosine_similarity_identical_vectors() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]);
        assert!((sim - 1.0).abs() < 0.01);
    }

    #[test]
    fn cosine_similarity_orthogonal_vectors() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 0.01);
    }

    #[test]
    fn embedding_blob_round_trip() {
        let v = vec![0.25f32, -1.5, 3.0];
        assert_eq!(decode_embedding(&encode_embedding(&v)).unwrap(), v);
        assert!(decode_embedding(&[0u8; 5]).is_err());
    }

    #[test]
    fn persisted_index_reopens_with_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = IndexWriter::open(dir.path(), "m1", WriteMode::Append).unwrap();
        let stored = writer
            .commit(
                &[
                    passage("Flu", PassageKind::Disease),
                    passage("Odisha (Rural)", PassageKind::Vaccination),
                ],
                &[vec![1.0, 0.0], vec![0.0, 1.0]],
            )
            .unwrap();
        assert_eq!(stored, 2);
        drop(writer);

        let index = VectorIndex::open(dir.path(), "m1").unwrap();
        assert_eq!(index.len(), 2);

        let results = index.search(&[0.0, 1.0], 1).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].passage.metadata.entity_key, "Odisha (Rural)");
        assert_eq!(results[0].passage.metadata.kind, PassageKind::Vaccination);
        assert!(!results[0].id.is_empty());
    }

    #[test]
    fn search_returns_top_k_best_first() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "m1",
            WriteMode::Append,
            &[
                ("Flu", vec![1.0, 0.0, 0.0]),
                ("Cold", vec![0.8, 0.6, 0.0]),
                ("Malaria", vec![0.0, 1.0, 0.0]),
            ],
        );

        let index = VectorIndex::open(dir.path(), "m1").unwrap();
        let results = index.search(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].passage.metadata.entity_key, "Flu");
        assert_eq!(results[1].passage.metadata.entity_key, "Cold");
        assert!(results[0].score >= results[1].score);
    }

    #[test]
    fn rerun_appends_by_default() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "m1", WriteMode::Append, &[("Flu", vec![1.0, 0.0])]);
        write(dir.path(), "m1", WriteMode::Append, &[("Flu", vec![1.0, 0.0])]);

        assert_eq!(index_stats(dir.path()).unwrap().passages, 2);
    }

    #[test]
    fn replace_clears_previous_passages() {
        let dir = tempfile::tempdir().unwrap();
        let items = [("Flu", vec![1.0, 0.0]), ("Cold", vec![0.0, 1.0])];
        write(dir.path(), "m1", WriteMode::Append, &items);
        write(dir.path(), "m2", WriteMode::Replace, &[("Malaria", vec![1.0, 0.0, 0.0])]);

        let stats = index_stats(dir.path()).unwrap();
        assert_eq!(stats.passages, 1);
        assert_eq!(stats.embedding_model.as_deref(), Some("m2"));
        assert_eq!(stats.dimension, Some(3));
    }

    #[test]
    fn append_with_other_model_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "m1", WriteMode::Append, &[("Flu", vec![1.0, 0.0])]);

        let err = IndexWriter::open(dir.path(), "m2", WriteMode::Append).err().unwrap();
        assert!(matches!(err, StorageError::ModelMismatch { .. }));
    }

    #[test]
    fn append_with_other_dimension_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "m1", WriteMode::Append, &[("Flu", vec![1.0, 0.0])]);

        let mut writer = IndexWriter::open(dir.path(), "m1", WriteMode::Append).unwrap();
        let err = writer
            .commit(&[passage("Cold", PassageKind::Disease)], &[vec![1.0, 0.0, 0.0]])
            .unwrap_err();
        assert!(matches!(err, StorageError::DimensionMismatch { expected: 2, actual: 3 }));
        assert_eq!(index_stats(dir.path()).unwrap().passages, 1);
    }

    #[test]
    fn mismatched_passages_and_embeddings_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = IndexWriter::open(dir.path(), "m1", WriteMode::Append).unwrap();
        let result = writer.commit(&[passage("Flu", PassageKind::Disease)], &[]);
        assert!(matches!(result, Err(StorageError::VectorDb(_))));
    }

    #[test]
    fn serving_with_other_model_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "m1", WriteMode::Append, &[("Flu", vec![1.0, 0.0])]);

        let err = VectorIndex::open(dir.path(), "m2").err().unwrap();
        assert!(matches!(
            err,
            StorageError::ModelMismatch { ref index_model, ref configured }
                if index_model == "m1" && configured == "m2"
        ));
    }

    #[test]
    fn missing_index_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open(&dir.path().join("nowhere"), "m1").unwrap();
        assert!(index.is_empty());
        assert!(index.search(&[1.0], 4).unwrap().is_empty());
    }

    #[test]
    fn empty_commit_produces_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "m1", WriteMode::Append, &[]);

        let index = VectorIndex::open(dir.path(), "m1").unwrap();
        assert!(index.is_empty());
        assert!(index.search(&[1.0, 0.0], 4).unwrap().is_empty());
    }

    #[test]
    fn query_dimension_must_match_index() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "m1", WriteMode::Append, &[("Flu", vec![1.0, 0.0])]);

        let index = VectorIndex::open(dir.path(), "m1").unwrap();
        assert!(matches!(
            index.search(&[1.0, 0.0, 0.0], 1),
            Err(StorageError::DimensionMismatch { .. })
        ));
    }
}

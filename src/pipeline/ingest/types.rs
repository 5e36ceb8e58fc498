use std::fmt;

use serde::{Deserialize, Serialize};

/// A source file as read from disk: header names plus rows of cells.
/// `None` marks a missing cell (empty or an NA token).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Table {
    pub fn new(name: &str, headers: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self {
            name: name.to_string(),
            headers,
            rows,
        }
    }

    /// Index of the column with exactly this header.
    pub fn column(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }

    /// Indices of every column whose header contains `needle`.
    pub fn columns_containing(&self, needle: &str) -> Vec<usize> {
        self.headers
            .iter()
            .enumerate()
            .filter(|(_, h)| h.contains(needle))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Cell accessor tolerant of short rows.
pub fn cell(row: &[Option<String>], index: usize) -> Option<&str> {
    row.get(index).and_then(|c| c.as_deref())
}

/// One disease after grouping its symptom, description and precaution rows.
#[derive(Debug, Clone, PartialEq)]
pub struct DiseaseRecord {
    pub name: String,
    pub description: Option<String>,
    pub symptoms: Vec<String>,
    pub precautions: Vec<String>,
}

/// One regional row of vaccination statistics, keyed by "Region (Area)".
/// Only non-missing statistics are kept as attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: String,
    pub attributes: Vec<(String, String)>,
}

/// Which dataset a passage was synthesized from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassageKind {
    Disease,
    Vaccination,
}

impl PassageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disease => "disease",
            Self::Vaccination => "vaccination",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "disease" => Some(Self::Disease),
            "vaccination" => Some(Self::Vaccination),
            _ => None,
        }
    }
}

impl fmt::Display for PassageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance carried by every passage into the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassageMetadata {
    /// Originating dataset ("disease_database" or the vaccination file path).
    pub source: String,
    /// Disease name, or "Region (Area)" for vaccination statistics.
    pub entity_key: String,
    pub kind: PassageKind,
}

/// A natural-language unit of knowledge, the thing that gets embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub body: String,
    pub metadata: PassageMetadata,
}

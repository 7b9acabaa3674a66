//! Domain types shared by the embedding, store and retrieval crates.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata attached to every stored record (source, page_number, company, ...).
pub type Meta = HashMap<String, String>;

/// The channel a piece of content was embedded and indexed under.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Table,
}

impl Modality {
    pub fn as_str(self) -> &'static str {
        match self {
            Modality::Text => "text",
            Modality::Table => "table",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Modality::Text),
            "table" => Some(Modality::Table),
            _ => None,
        }
    }
}

/// A table extracted from a source document: one header row plus data rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableData {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// One result from a single-channel nearest-neighbor search.
///
/// `text` is absent for pure-table records with no generated caption.
/// `table_blob` is the compressed, text-safe table payload and is present
/// only for table-modality records. The channel-local rank is positional
/// (1-based order in the returned list), not stored here.
#[derive(Debug, Clone)]
pub struct RetrievalHit {
    pub text: Option<String>,
    pub table_blob: Option<String>,
    pub modality: Modality,
    pub metadata: Meta,
    pub score: f32,
}

/// Final output unit of the retrieval pipeline.
///
/// `score` is a cost in `[0, 1]` where lower means more relevant,
/// rounded to 4 decimal digits.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredResult {
    pub text: Option<String>,
    pub table: Option<TableData>,
    pub score: f32,
    pub metadata: Meta,
    pub modality: Modality,
}

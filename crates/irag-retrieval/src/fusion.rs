//! Reciprocal-rank fusion across the two retrieval channels.

use std::collections::HashMap;

use irag_core::types::{Meta, Modality, RetrievalHit};

/// Identity of the logical source unit a hit belongs to: `"{source}|p{page}"`.
///
/// A text hit and a table hit from the same PDF page share a key, so the two
/// channels fuse into one entry for that location.
pub fn doc_key(meta: &Meta) -> String {
    let source = meta.get("source").map(String::as_str).unwrap_or("unknown");
    let page = meta.get("page_number").map(String::as_str).unwrap_or("na");
    format!("{}|p{}", source, page)
}

/// Aggregate for one document identity. `score` is the running sum of
/// `weight * (1/rank)` contributions; the payload fields hold the
/// representative hit (last contributing channel wins).
#[derive(Debug, Clone)]
pub struct FusionEntry {
    pub score: f32,
    pub text: Option<String>,
    pub table_blob: Option<String>,
    pub modality: Modality,
    pub metadata: Meta,
}

/// Insertion-ordered fusion accumulator. Order of first insertion is the
/// stable tie-break for equal fusion scores, so iteration must not depend
/// on hash order.
#[derive(Default)]
pub struct FusionList {
    entries: Vec<FusionEntry>,
    index: HashMap<String, usize>,
}

impl FusionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one channel's ranked hits into the accumulator. Each hit at
    /// 1-based rank `r` contributes `weight * (1/r)` to its identity.
    /// Call exactly once per channel per query.
    pub fn add_channel(&mut self, hits: &[RetrievalHit], weight: f32) {
        for (i, hit) in hits.iter().enumerate() {
            let rank = (i + 1) as f32;
            let contribution = weight * (1.0 / rank);
            let key = doc_key(&hit.metadata);
            match self.index.get(&key) {
                Some(&at) => {
                    let entry = &mut self.entries[at];
                    entry.score += contribution;
                    entry.text = hit.text.clone();
                    entry.table_blob = hit.table_blob.clone();
                    entry.modality = hit.modality;
                    entry.metadata = hit.metadata.clone();
                }
                None => {
                    self.index.insert(key, self.entries.len());
                    self.entries.push(FusionEntry {
                        score: contribution,
                        text: hit.text.clone(),
                        table_blob: hit.table_blob.clone(),
                        modality: hit.modality,
                        metadata: hit.metadata.clone(),
                    });
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in first-insertion order.
    pub fn into_entries(self) -> Vec<FusionEntry> {
        self.entries
    }
}

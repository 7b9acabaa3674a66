use anyhow::Result;
use arrow_array::{Array, Float32Array, RecordBatch, StringArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType};
use std::path::Path;

use irag_core::error::Error;
use irag_core::traits::VectorStore;
use irag_core::types::{Meta, Modality, RetrievalHit};

use crate::table::open_db;

/// Sync [`VectorStore`] over a LanceDB table with two vector columns.
///
/// LanceDB's API is async; the store owns a runtime and blocks on each
/// search, which keeps the retrieval core synchronous per query.
pub struct LanceVectorStore {
    db: Connection,
    table_name: String,
    runtime: tokio::runtime::Runtime,
}

impl LanceVectorStore {
    pub fn open(db_path: &Path, table_name: &str) -> Result<Self> {
        let runtime = tokio::runtime::Runtime::new()?;
        let db = runtime.block_on(open_db(db_path.to_string_lossy().as_ref()))?;
        Ok(Self { db, table_name: table_name.to_string(), runtime })
    }

    fn search_field(
        &self,
        field: &str,
        query_vec: &[f32],
        top_k: usize,
        filters: Option<&Meta>,
    ) -> Result<Vec<RetrievalHit>> {
        // Over-fetch when post-filtering on metadata so filters don't
        // starve the channel.
        let fetch = if filters.is_some() { top_k * 4 } else { top_k };
        let batches = self.runtime.block_on(async {
            let table = self.db.open_table(&self.table_name).execute().await?;
            let mut stream = table
                .vector_search(query_vec.to_vec())?
                .column(field)
                .distance_type(DistanceType::Cosine)
                .limit(fetch)
                .execute()
                .await?;
            let mut out = Vec::new();
            while let Some(batch) = TryStreamExt::try_next(&mut stream).await? {
                out.push(batch);
            }
            Ok::<_, anyhow::Error>(out)
        })?;

        let mut hits = Vec::new();
        for batch in &batches {
            for i in 0..batch.num_rows() {
                let hit = parse_hit(batch, i)?;
                if matches_filters(&hit.metadata, filters) {
                    hits.push(hit);
                }
                if hits.len() >= top_k {
                    break;
                }
            }
            if hits.len() >= top_k {
                break;
            }
        }
        Ok(hits)
    }
}

impl VectorStore for LanceVectorStore {
    fn search_text(
        &self,
        query_vec: &[f32],
        top_k: usize,
        filters: Option<&Meta>,
    ) -> Result<Vec<RetrievalHit>> {
        self.search_field("text_vector", query_vec, top_k, filters)
    }

    fn search_table(
        &self,
        query_vec: &[f32],
        top_k: usize,
        filters: Option<&Meta>,
    ) -> Result<Vec<RetrievalHit>> {
        self.search_field("table_vector", query_vec, top_k, filters)
    }
}

fn matches_filters(meta: &Meta, filters: Option<&Meta>) -> bool {
    match filters {
        None => true,
        Some(f) => f.iter().all(|(k, v)| meta.get(k) == Some(v)),
    }
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| Error::Search(format!("missing string column: {}", name)).into())
}

fn parse_hit(batch: &RecordBatch, i: usize) -> Result<RetrievalHit> {
    let text_col = string_col(batch, "text")?;
    let blob_col = string_col(batch, "table_blob")?;
    let modality_col = string_col(batch, "modality")?;
    let meta_col = string_col(batch, "metadata")?;

    let text = if text_col.is_null(i) || text_col.value(i).is_empty() {
        None
    } else {
        Some(text_col.value(i).to_string())
    };
    let table_blob = if blob_col.is_null(i) || blob_col.value(i).is_empty() {
        None
    } else {
        Some(blob_col.value(i).to_string())
    };
    let modality = Modality::parse(modality_col.value(i)).unwrap_or(Modality::Text);
    let metadata: Meta = serde_json::from_str(meta_col.value(i)).unwrap_or_default();

    // Cosine distance comes back in `_distance`; similarity is 1 - d.
    let score = if let Some(col) = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
    {
        1.0 - col.value(i)
    } else if let Some(col) = batch
        .column_by_name("_score")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
    {
        col.value(i)
    } else {
        0.5
    };

    Ok(RetrievalHit { text, table_blob, modality, metadata, score })
}

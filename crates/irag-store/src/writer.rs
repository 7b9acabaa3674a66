use anyhow::Result;
use arrow_array::{
    FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray,
};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::Connection;
use std::path::Path;
use std::sync::Arc;

use irag_core::types::{Meta, Modality};
use irag_core::vector::fit_dim;

use crate::schema::{build_arrow_schema, TABLE_DIM, TEXT_DIM};
use crate::table::open_db;

/// One row destined for the multi-modal table. Vectors may arrive at the
/// wrong length (upstream encoder quirks); the writer fits them to the
/// column dimensions before insert.
#[derive(Debug, Clone)]
pub struct StoreRecord {
    pub text: Option<String>,
    pub table_blob: Option<String>,
    pub modality: Modality,
    pub metadata: Meta,
    pub text_vec: Vec<f32>,
    pub table_vec: Vec<f32>,
}

pub struct MultiModalIndexer {
    pub(crate) db: Connection,
    pub(crate) table_name: String,
}

impl MultiModalIndexer {
    pub async fn new(db_path: &Path, table_name: &str) -> Result<Self> {
        let db = open_db(db_path.to_string_lossy().as_ref()).await?;
        Ok(Self { db, table_name: table_name.to_string() })
    }

    pub async fn add_records(&self, records: &[StoreRecord]) -> Result<()> {
        if records.is_empty() {
            tracing::info!("no records to index");
            return Ok(());
        }
        tracing::info!("indexing {} records into table {}", records.len(), self.table_name);
        let pb = ProgressBar::new(records.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} records ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        let batch_size = 1000usize;
        let mut pending: Vec<StoreRecord> = Vec::new();
        for (i, record) in records.iter().enumerate() {
            pending.push(record.clone());
            pb.set_position((i + 1) as u64);
            if pending.len() >= batch_size || i == records.len() - 1 {
                self.insert_batch(&pending).await?;
                pending.clear();
            }
        }
        pb.finish_with_message("indexing complete");
        Ok(())
    }

    async fn insert_batch(&self, records: &[StoreRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let record_batch = records_to_batch(records)?;
        let schema = record_batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(record_batch)].into_iter(), schema));
        if self.db.table_names().execute().await?.contains(&self.table_name) {
            self.db.open_table(&self.table_name).execute().await?.add(reader).execute().await?;
        } else {
            self.db.create_table(&self.table_name, reader).execute().await?;
        }
        Ok(())
    }
}

/// Stable record id derived from the payload and its source location, so
/// re-ingesting the same file yields the same ids.
pub fn record_id(record: &StoreRecord) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(record.text.as_deref().unwrap_or("").as_bytes());
    hasher.update(record.table_blob.as_deref().unwrap_or("").as_bytes());
    hasher.update(record.metadata.get("source").map(String::as_str).unwrap_or("unknown").as_bytes());
    hasher.update(record.metadata.get("page_number").map(String::as_str).unwrap_or("na").as_bytes());
    hasher.finalize().to_hex().to_string()
}

fn records_to_batch(records: &[StoreRecord]) -> Result<RecordBatch> {
    let schema = build_arrow_schema();
    let mut ids = Vec::new();
    let mut texts: Vec<Option<String>> = Vec::new();
    let mut blobs: Vec<Option<String>> = Vec::new();
    let mut modalities = Vec::new();
    let mut metas = Vec::new();
    let mut timestamps = Vec::new();
    let mut text_vectors: Vec<Option<Vec<Option<f32>>>> = Vec::new();
    let mut table_vectors: Vec<Option<Vec<Option<f32>>>> = Vec::new();

    let now = Utc::now().timestamp_millis();
    for record in records {
        ids.push(record_id(record));
        texts.push(record.text.clone());
        blobs.push(record.table_blob.clone());
        modalities.push(record.modality.as_str().to_string());
        metas.push(serde_json::to_string(&record.metadata)?);
        timestamps.push(now);
        let tv = fit_dim(record.text_vec.clone(), TEXT_DIM as usize);
        let bv = fit_dim(record.table_vec.clone(), TABLE_DIM as usize);
        text_vectors.push(Some(tv.into_iter().map(Some).collect()));
        table_vectors.push(Some(bv.into_iter().map(Some).collect()));
    }

    let record_batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(texts)),
            Arc::new(StringArray::from(blobs)),
            Arc::new(StringArray::from(modalities)),
            Arc::new(StringArray::from(metas)),
            Arc::new(TimestampMillisecondArray::from(timestamps)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(
                text_vectors.into_iter(),
                TEXT_DIM,
            )),
            Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(
                table_vectors.into_iter(),
                TABLE_DIM,
            )),
        ],
    )?;
    Ok(record_batch)
}

//! Ingest pre-extracted insurance document records into the vector store.
//!
//! Input is one or more JSONL files of records produced by the PDF
//! extraction pipeline: `{"text": ..., "table": {"header": [...], "rows":
//! [[...]]}, "modality": ..., "metadata": {...}}`. Vectors may be supplied
//! precomputed (`text_vector` / `table_vector`); otherwise both spaces are
//! embedded here.

use std::env;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use irag_core::config::{expand_path, Config};
use irag_core::table_blob::encode_table;
use irag_core::traits::EmbeddingProvider;
use irag_core::types::{Meta, Modality, TableData};
use irag_core::vector::normalize_vector;
use irag_embed::get_default_provider;
use irag_store::{MultiModalIndexer, StoreRecord};

#[derive(Debug, Deserialize)]
struct IngestRecord {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    table: Option<TableData>,
    #[serde(default)]
    modality: Option<String>,
    #[serde(default)]
    metadata: Meta,
    #[serde(default)]
    text_vector: Option<serde_json::Value>,
    #[serde(default)]
    table_vector: Option<serde_json::Value>,
}

fn list_jsonl_files(root: &PathBuf) -> Vec<PathBuf> {
    if root.is_file() {
        return vec![root.clone()];
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    files
}

fn to_store_record(
    rec: IngestRecord,
    provider: &dyn EmbeddingProvider,
) -> anyhow::Result<StoreRecord> {
    let modality = rec
        .modality
        .as_deref()
        .and_then(Modality::parse)
        .unwrap_or(if rec.table.is_some() { Modality::Table } else { Modality::Text });

    let text_vec = match (&rec.text_vector, &rec.text) {
        (Some(raw), _) => normalize_vector(raw, provider.text_dim()),
        (None, Some(text)) if !text.is_empty() => {
            provider.embed_text(&[text.clone()])?.remove(0)
        }
        _ => vec![0.0; provider.text_dim()],
    };

    let table_vec = match (&rec.table_vector, &rec.table) {
        (Some(raw), _) => normalize_vector(raw, provider.table_dim()),
        (None, Some(table)) => provider.embed_table(&table.header, &table.rows)?,
        _ => vec![0.0; provider.table_dim()],
    };

    let table_blob = match &rec.table {
        Some(table) => Some(encode_table(table)?),
        None => None,
    };

    Ok(StoreRecord {
        text: rec.text,
        table_blob,
        modality,
        metadata: rec.metadata,
        text_vec,
        table_vec,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let config = Config::load()?;

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <records.jsonl|records_dir> [db_path] [table_name]", args[0]);
        std::process::exit(1);
    }
    let input = PathBuf::from(&args[1]);
    let db_path = args
        .get(2)
        .cloned()
        .unwrap_or_else(|| config.get("data.lancedb_dir").unwrap_or_else(|_| "data/lancedb".to_string()));
    let table_name = args
        .get(3)
        .cloned()
        .unwrap_or_else(|| config.get("data.table_name").unwrap_or_else(|_| "insurance_docs".to_string()));

    let files = list_jsonl_files(&input);
    if files.is_empty() {
        println!("No .jsonl files found under {}.", input.display());
        return Ok(());
    }

    let provider = get_default_provider()?;
    let mut records = Vec::new();
    for (i, file) in files.iter().enumerate() {
        println!("Reading file {}/{}: {}", i + 1, files.len(), file.display());
        let content = fs::read_to_string(file)?;
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<IngestRecord>(line) {
                Ok(rec) => records.push(to_store_record(rec, provider.as_ref())?),
                Err(e) => {
                    tracing::warn!("skipping {}:{}: {}", file.display(), line_no + 1, e);
                }
            }
        }
    }
    println!("Parsed {} records from {} files", records.len(), files.len());

    let indexer = MultiModalIndexer::new(&expand_path(&db_path), &table_name).await?;
    indexer.add_records(&records).await?;
    println!("Ingest complete ({} records into {}/{})", records.len(), db_path, table_name);
    Ok(())
}

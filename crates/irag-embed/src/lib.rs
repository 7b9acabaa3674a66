//! Embedding providers for the two retrieval spaces.
//!
//! The text space is served by a local BGE-M3 style model (candle,
//! XLM-RoBERTa weights, d=1024). The table space linearizes a table's
//! header and rows into a flat string before encoding (d=768); by default
//! a deterministic hashing encoder stands in for a structure-aware table
//! model, and `IRAG_USE_FAKE_EMBEDDINGS=1` switches the text space to the
//! same hashing scheme for tests and offline runs.

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::DType;
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;

use irag_core::traits::EmbeddingProvider;

pub mod device;
pub mod pool;
pub mod tokenize;

use device::select_device;
use pool::masked_mean_l2;
use tokenize::tokenize_on_device;

pub const TEXT_DIM: usize = 1024;
pub const TABLE_DIM: usize = 768;

/// Single-space encoder: one string in, one fixed-length vector out.
pub trait Encoder: Send + Sync {
    fn dim(&self) -> usize;
    fn encode(&self, text: &str) -> Result<Vec<f32>>;
}

pub struct EmbeddingModel {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: candle_core::Device,
}

impl EmbeddingModel {
    pub fn new() -> Result<Self> {
        let device = select_device();
        let model_dir = resolve_model_dir()?;
        tracing::info!("loading text embedding model from {}", model_dir.display());

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_path = model_dir.join("config.json");
        let config: XLMRobertaConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;

        let weights_path = model_dir.join("pytorch_model.bin");
        let weights = candle_core::pickle::read_all(&weights_path)?;
        let weights_map: std::collections::HashMap<String, candle_core::Tensor> =
            weights.into_iter().collect();
        let vb = VarBuilder::from_tensors(weights_map, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb)?;
        tracing::info!("text embedding model loaded");
        Ok(Self { model, tokenizer, device })
    }
}

impl Encoder for EmbeddingModel {
    fn dim(&self) -> usize {
        TEXT_DIM
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let max_len = 256usize;
        let (input_ids, attention_mask) =
            tokenize_on_device(&self.tokenizer, text, max_len, &self.device)?;
        let token_type_ids =
            candle_core::Tensor::zeros((1, max_len), DType::I64, &self.device)?;
        let hidden = self
            .model
            .forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let emb: Vec<f32> = pooled.to_device(&candle_core::Device::Cpu)?.squeeze(0)?.to_vec1()?;
        assert_eq!(emb.len(), TEXT_DIM);
        if start.elapsed().as_millis() > 100 {
            tracing::debug!("slow embedding: {}ms", start.elapsed().as_millis());
        }
        Ok(emb)
    }
}

/// Deterministic hashing encoder: each whitespace token bumps one bucket of
/// an L2-normalized vector. Not semantically meaningful, but stable across
/// runs, which is what tests and offline smoke runs need.
pub struct HashingEncoder {
    dim: usize,
}

impl HashingEncoder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl Encoder for HashingEncoder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        Ok(v)
    }
}

/// Flatten a table into a string the table-space encoder can consume:
/// the header line, then one `col: cell | col: cell` line per row.
pub fn linearize_table(header: &[String], rows: &[Vec<String>]) -> String {
    let mut lines = vec![header.join(" | ")];
    for row in rows {
        let cells: Vec<String> = header
            .iter()
            .zip(row.iter())
            .map(|(h, c)| format!("{}: {}", h, c))
            .collect();
        lines.push(cells.join(" | "));
    }
    lines.join("\n")
}

/// Dual-space [`EmbeddingProvider`] combining a text encoder and a table
/// encoder.
pub struct MultiModalProvider {
    text: Box<dyn Encoder>,
    table: Box<dyn Encoder>,
}

impl MultiModalProvider {
    pub fn new(text: Box<dyn Encoder>, table: Box<dyn Encoder>) -> Self {
        Self { text, table }
    }
}

impl EmbeddingProvider for MultiModalProvider {
    fn text_dim(&self) -> usize {
        self.text.dim()
    }

    fn table_dim(&self) -> usize {
        self.table.dim()
    }

    fn embed_text(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.text.encode(t)?);
        }
        Ok(out)
    }

    fn embed_table(&self, header: &[String], rows: &[Vec<String>]) -> Result<Vec<f32>> {
        self.table.encode(&linearize_table(header, rows))
    }

    fn embed_query_table(&self, query: &str) -> Result<Vec<f32>> {
        // A query enters the table space as a one-cell table.
        let header = vec!["QUERY".to_string()];
        let rows = vec![vec![query.to_string()]];
        self.table.encode(&linearize_table(&header, &rows))
    }
}

pub fn get_default_provider() -> Result<Box<dyn EmbeddingProvider>> {
    let use_fake = std::env::var("IRAG_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if use_fake {
        tracing::info!("using hashing encoders for both spaces");
        return Ok(Box::new(MultiModalProvider::new(
            Box::new(HashingEncoder::new(TEXT_DIM)),
            Box::new(HashingEncoder::new(TABLE_DIM)),
        )));
    }
    Ok(Box::new(MultiModalProvider::new(
        Box::new(EmbeddingModel::new()?),
        Box::new(HashingEncoder::new(TABLE_DIM)),
    )))
}

fn resolve_model_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("IRAG_MODEL_DIR") {
        let p = PathBuf::from(&dir);
        if p.exists() {
            return Ok(p);
        }
    }
    if let Ok(dir) = std::env::var("MODEL_DIR") {
        let p = PathBuf::from(&dir);
        if p.exists() {
            return Ok(p);
        }
    }
    let root = Path::new("../models/bge-m3");
    if root.exists() {
        return Ok(root.to_path_buf());
    }
    let legacy = Path::new("models/bge-m3");
    if legacy.exists() {
        return Ok(legacy.to_path_buf());
    }
    Err(anyhow!("Could not locate BGE-M3 model directory"))
}

//! Cross-encoder scorers for second-stage re-ranking.
//!
//! The real scorer is a BGE-reranker style XLM-RoBERTa sequence
//! classification model run through candle. [`LexicalScorer`] is the cheap
//! fallback: query-word overlap, order- and length-preserving like the
//! model, used when no reranker weights are available.

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

use candle_core::DType;
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{
    Config as XLMRobertaConfig, XLMRobertaForSequenceClassification,
};
use tokenizers::Tokenizer;

use irag_core::error::Error;
use irag_core::traits::CrossEncoder;
use irag_embed::device::select_device;
use irag_embed::tokenize::tokenize_pair_on_device;

pub struct CrossEncoderModel {
    model: XLMRobertaForSequenceClassification,
    tokenizer: Tokenizer,
    device: candle_core::Device,
}

impl CrossEncoderModel {
    pub fn new() -> Result<Self> {
        let device = select_device();
        let model_dir = resolve_reranker_dir()?;
        tracing::info!("loading reranker model from {}", model_dir.display());

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
        let model = XLMRobertaForSequenceClassification::new(1, &config, vb)?;
        tracing::info!("reranker model loaded");
        Ok(Self { model, tokenizer, device })
    }
}

impl CrossEncoder for CrossEncoderModel {
    fn rerank(&self, query: &str, candidates: &[String]) -> Result<Vec<f32>> {
        let max_len = 512usize;
        let mut scores = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let (input_ids, attention_mask) =
                tokenize_pair_on_device(&self.tokenizer, query, candidate, max_len, &self.device)?;
            let token_type_ids =
                candle_core::Tensor::zeros(input_ids.dims(), DType::I64, &self.device)?;
            let logits = self.model.forward(&input_ids, &attention_mask, &token_type_ids)?;
            let score: f32 = logits
                .to_device(&candle_core::Device::Cpu)?
                .flatten_all()?
                .to_vec1::<f32>()?
                .first()
                .copied()
                .ok_or_else(|| Error::Rerank("reranker produced no logit".to_string()))?;
            scores.push(score);
        }
        Ok(scores)
    }
}

/// Word-overlap scorer: the fraction of query words a candidate contains.
#[derive(Default)]
pub struct LexicalScorer;

impl LexicalScorer {
    pub fn new() -> Self {
        Self
    }
}

impl CrossEncoder for LexicalScorer {
    fn rerank(&self, query: &str, candidates: &[String]) -> Result<Vec<f32>> {
        let query_lower = query.to_lowercase();
        let query_words: Vec<&str> = query_lower.split_whitespace().collect();
        let mut scores = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let candidate_lower = candidate.to_lowercase();
            let mut overlap = 0.0f32;
            for word in &query_words {
                if candidate_lower.contains(word) {
                    overlap += 1.0;
                }
            }
            let denom = query_words.len().max(1) as f32;
            scores.push(overlap / denom);
        }
        Ok(scores)
    }
}

pub fn get_default_scorer() -> Box<dyn CrossEncoder> {
    let use_lexical = std::env::var("IRAG_USE_LEXICAL_RERANKER")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if use_lexical {
        tracing::info!("using lexical overlap scorer");
        return Box::new(LexicalScorer::new());
    }
    match CrossEncoderModel::new() {
        Ok(model) => Box::new(model),
        Err(e) => {
            tracing::warn!("reranker model unavailable ({}); falling back to lexical scorer", e);
            Box::new(LexicalScorer::new())
        }
    }
}

fn resolve_reranker_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("IRAG_RERANKER_DIR") {
        let p = PathBuf::from(&dir);
        if p.exists() {
            return Ok(p);
        }
    }
    let root = Path::new("../models/bge-reranker-base");
    if root.exists() {
        return Ok(root.to_path_buf());
    }
    let legacy = Path::new("models/bge-reranker-base");
    if legacy.exists() {
        return Ok(legacy.to_path_buf());
    }
    Err(anyhow!("Could not locate reranker model directory"))
}

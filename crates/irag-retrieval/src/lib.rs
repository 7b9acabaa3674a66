//! Fusion & ranking core of the multi-modal RAG pipeline.
//!
//! Per query: embed into both spaces, search the text and table channels
//! independently, merge with reciprocal-rank fusion keyed by document
//! identity, truncate, re-score the survivors with a cross-encoder, blend
//! the normalized signals and return the top results ordered by ascending
//! cost. Failures inside a single channel degrade that channel; only a
//! failed text embedding aborts the query.

pub mod fusion;

use anyhow::Result;

use irag_core::config::RetrievalConfig;
use irag_core::error::Error;
use irag_core::table_blob::decode_table;
use irag_core::traits::{CrossEncoder, EmbeddingProvider, ResponseCache, VectorStore};
use irag_core::types::{Meta, RetrievalHit, ScoredResult};
use irag_core::vector::fit_dim;

use fusion::FusionList;

const CONTEXT_SEPARATOR: &str = "\n---\n";

/// Min-max scaling to `[0, 1]`. When the whole set is tied (`hi <= lo`)
/// every value maps to 0.5: no division by zero, no arbitrary winner.
pub fn min_max_norm(x: f32, lo: f32, hi: f32) -> f32 {
    if hi <= lo {
        return 0.5;
    }
    (x - lo) / (hi - lo)
}

fn round4(x: f32) -> f32 {
    (x * 10_000.0).round() / 10_000.0
}

pub struct RagEngine {
    provider: Box<dyn EmbeddingProvider>,
    store: Box<dyn VectorStore>,
    scorer: Box<dyn CrossEncoder>,
    context_cache: Option<Box<dyn ResponseCache>>,
    cfg: RetrievalConfig,
}

impl RagEngine {
    pub fn new(
        provider: Box<dyn EmbeddingProvider>,
        store: Box<dyn VectorStore>,
        scorer: Box<dyn CrossEncoder>,
        cfg: RetrievalConfig,
    ) -> Result<Self> {
        cfg.validate()?;
        Ok(Self { provider, store, scorer, context_cache: None, cfg })
    }

    /// Inject an idempotent cache for `retrieve_context` outputs, keyed by
    /// the request content.
    pub fn with_context_cache(mut self, cache: Box<dyn ResponseCache>) -> Self {
        self.context_cache = Some(cache);
        self
    }

    /// Retrieve the `top_k` most relevant records for `query`.
    ///
    /// Results are ordered by ascending cost (`1 - blended relevance`,
    /// rounded to 4 decimals). An empty or whitespace query returns an
    /// empty list rather than an error.
    pub fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        filters: Option<&Meta>,
    ) -> Result<Vec<ScoredResult>> {
        if query.trim().is_empty() || top_k == 0 {
            tracing::debug!("empty query or top_k=0, returning no results");
            return Ok(Vec::new());
        }

        // Text embedding is required: it drives the text channel and seeds
        // the table-channel fallback.
        let q_text = self
            .provider
            .embed_text(&[query.to_string()])
            .map_err(|e| Error::Embedding(format!("text embedding failed: {}", e)))?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("text embedding returned no vector".to_string()))?;

        let q_table = match self.provider.embed_query_table(query) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("table embedding failed ({}), falling back to text vector", e);
                fit_dim(q_text.clone(), self.provider.table_dim())
            }
        };

        let k_each = (top_k * self.cfg.candidate_multiplier).max(top_k);

        let text_hits = self.search_channel("text", || {
            self.store.search_text(&q_text, k_each, filters)
        });
        let table_hits = self.search_channel("table", || {
            self.store.search_table(&q_table, k_each, filters)
        });

        if text_hits.is_empty() && table_hits.is_empty() {
            return Ok(Vec::new());
        }

        // Reciprocal-rank fusion: each channel contributes exactly once.
        let mut fusion = FusionList::new();
        fusion.add_channel(&text_hits, self.cfg.weight_text);
        fusion.add_channel(&table_hits, self.cfg.weight_table);
        if fusion.is_empty() {
            return Ok(Vec::new());
        }

        let mut entries = fusion.into_entries();
        entries.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        entries.truncate(k_each.min(entries.len()));

        let candidate_texts: Vec<String> =
            entries.iter().map(|e| e.text.clone().unwrap_or_default()).collect();

        // Degraded mode: rank purely by fusion when the scorer is out.
        let (rerank_scores, gamma) = match self.scorer.rerank(query, &candidate_texts) {
            Ok(scores) if scores.len() == candidate_texts.len() => (scores, self.cfg.gamma),
            Ok(scores) => {
                tracing::warn!(
                    "reranker returned {} scores for {} candidates, ranking by fusion only",
                    scores.len(),
                    candidate_texts.len()
                );
                (vec![0.0; candidate_texts.len()], 0.0)
            }
            Err(e) => {
                tracing::warn!("rerank failed ({}), ranking by fusion only", e);
                (vec![0.0; candidate_texts.len()], 0.0)
            }
        };

        let fusion_scores: Vec<f32> = entries.iter().map(|e| e.score).collect();
        let (f_lo, f_hi) = bounds(&fusion_scores);
        let (r_lo, r_hi) = bounds(&rerank_scores);

        let mut results = Vec::with_capacity(entries.len());
        for (entry, r_s) in entries.into_iter().zip(rerank_scores) {
            let f_norm = min_max_norm(entry.score, f_lo, f_hi);
            let r_norm = min_max_norm(r_s, r_lo, r_hi);
            let relevance = gamma * r_norm + (1.0 - gamma) * f_norm;
            let cost = 1.0 - relevance;

            let table = match entry.table_blob.as_deref() {
                Some(blob) => match decode_table(blob) {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::warn!("dropping undecodable table payload: {}", e);
                        None
                    }
                },
                None => None,
            };
            results.push(ScoredResult {
                text: entry.text,
                table,
                score: cost,
                metadata: entry.metadata,
                modality: entry.modality,
            });
        }

        results.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);
        for r in &mut results {
            r.score = round4(r.score);
        }
        Ok(results)
    }

    /// Join the result texts into one context string for a downstream
    /// generation step, skipping text-less entries.
    pub fn retrieve_context(&self, query: &str, top_k: usize) -> Result<String> {
        let cache_key = format!("context|k{}|{}", top_k, query);
        if let Some(cache) = &self.context_cache {
            if let Some(hit) = cache.get(&cache_key) {
                return Ok(hit);
            }
        }
        let results = self.retrieve(query, top_k, None)?;
        let context = results
            .iter()
            .filter_map(|r| r.text.as_deref())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);
        if let Some(cache) = &self.context_cache {
            cache.put(&cache_key, context.clone());
        }
        Ok(context)
    }

    fn search_channel<F>(&self, label: &str, search: F) -> Vec<RetrievalHit>
    where
        F: FnOnce() -> Result<Vec<RetrievalHit>>,
    {
        match search() {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!("{} channel search failed ({}), degrading to empty", label, e);
                Vec::new()
            }
        }
    }
}

fn bounds(scores: &[f32]) -> (f32, f32) {
    let mut lo = f32::INFINITY;
    let mut hi = f32::NEG_INFINITY;
    for &s in scores {
        lo = lo.min(s);
        hi = hi.max(s);
    }
    (lo, hi)
}

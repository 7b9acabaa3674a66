use crate::types::{Meta, RetrievalHit};

/// Produces fixed-dimension vectors for both embedding spaces.
///
/// Text and table encoders are independent models with different
/// dimensionalities; `embed_query_table` maps a natural-language query into
/// the table space for cross-modal search.
pub trait EmbeddingProvider: Send + Sync {
    fn text_dim(&self) -> usize;
    fn table_dim(&self) -> usize;
    fn embed_text(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
    fn embed_table(&self, header: &[String], rows: &[Vec<String>]) -> anyhow::Result<Vec<f32>>;
    fn embed_query_table(&self, query: &str) -> anyhow::Result<Vec<f32>>;
}

/// Top-k nearest-neighbor search against the two vector fields of the store.
///
/// Hits come back ordered best-first. `filters` are metadata equality
/// constraints; a hit must match every pair to be returned.
pub trait VectorStore: Send + Sync {
    fn search_text(
        &self,
        query_vec: &[f32],
        top_k: usize,
        filters: Option<&Meta>,
    ) -> anyhow::Result<Vec<RetrievalHit>>;

    fn search_table(
        &self,
        query_vec: &[f32],
        top_k: usize,
        filters: Option<&Meta>,
    ) -> anyhow::Result<Vec<RetrievalHit>>;
}

/// Second-stage relevance scorer (query, candidate) -> score, higher is
/// more relevant. Length- and order-preserving: the i-th output scores the
/// i-th candidate.
pub trait CrossEncoder: Send + Sync {
    fn rerank(&self, query: &str, candidates: &[String]) -> anyhow::Result<Vec<f32>>;
}

/// Idempotent response cache injected by the caller; keys are request
/// content, values are previously produced outputs.
pub trait ResponseCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, value: String);
}

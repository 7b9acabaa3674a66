use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use irag_core::cache::InMemoryCache;
use irag_core::config::RetrievalConfig;
use irag_core::table_blob::encode_table;
use irag_core::traits::{CrossEncoder, EmbeddingProvider, VectorStore};
use irag_core::types::{Meta, Modality, RetrievalHit, TableData};
use irag_retrieval::fusion::{doc_key, FusionList};
use irag_retrieval::{min_max_norm, RagEngine};

// ---- mock collaborators ------------------------------------------------

struct FakeProvider {
    fail_text: bool,
    fail_table: bool,
}

impl FakeProvider {
    fn ok() -> Self {
        Self { fail_text: false, fail_table: false }
    }
}

impl EmbeddingProvider for FakeProvider {
    fn text_dim(&self) -> usize {
        8
    }
    fn table_dim(&self) -> usize {
        4
    }
    fn embed_text(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if self.fail_text {
            anyhow::bail!("text encoder down");
        }
        Ok(texts.iter().map(|_| vec![0.1; 8]).collect())
    }
    fn embed_table(&self, _header: &[String], _rows: &[Vec<String>]) -> anyhow::Result<Vec<f32>> {
        Ok(vec![0.2; 4])
    }
    fn embed_query_table(&self, _query: &str) -> anyhow::Result<Vec<f32>> {
        if self.fail_table {
            anyhow::bail!("table encoder down");
        }
        Ok(vec![0.2; 4])
    }
}

#[derive(Default)]
struct StaticStore {
    text_hits: Vec<RetrievalHit>,
    table_hits: Vec<RetrievalHit>,
    fail_text: bool,
    fail_table: bool,
    table_queried: AtomicBool,
    last_table_query_dim: AtomicUsize,
}

impl VectorStore for StaticStore {
    fn search_text(
        &self,
        _query_vec: &[f32],
        top_k: usize,
        _filters: Option<&Meta>,
    ) -> anyhow::Result<Vec<RetrievalHit>> {
        if self.fail_text {
            anyhow::bail!("text index offline");
        }
        Ok(self.text_hits.iter().take(top_k).cloned().collect())
    }

    fn search_table(
        &self,
        query_vec: &[f32],
        top_k: usize,
        _filters: Option<&Meta>,
    ) -> anyhow::Result<Vec<RetrievalHit>> {
        self.table_queried.store(true, Ordering::SeqCst);
        self.last_table_query_dim.store(query_vec.len(), Ordering::SeqCst);
        if self.fail_table {
            anyhow::bail!("table index offline");
        }
        Ok(self.table_hits.iter().take(top_k).cloned().collect())
    }
}

/// Scores candidates by a fixed list, cycling if needed; counts calls.
struct FixedScorer {
    scores: Vec<f32>,
    fail: bool,
    calls: AtomicUsize,
}

impl FixedScorer {
    fn new(scores: Vec<f32>) -> Self {
        Self { scores, fail: false, calls: AtomicUsize::new(0) }
    }
    fn failing() -> Self {
        Self { scores: Vec::new(), fail: true, calls: AtomicUsize::new(0) }
    }
}

impl CrossEncoder for FixedScorer {
    fn rerank(&self, _query: &str, candidates: &[String]) -> anyhow::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("scorer unavailable");
        }
        Ok((0..candidates.len())
            .map(|i| self.scores.get(i % self.scores.len().max(1)).copied().unwrap_or(0.0))
            .collect())
    }
}

/// Scorer shim sharing call counts across engine ownership.
struct CountingScorer(std::sync::Arc<FixedScorer>);

impl CrossEncoder for CountingScorer {
    fn rerank(&self, query: &str, candidates: &[String]) -> anyhow::Result<Vec<f32>> {
        self.0.rerank(query, candidates)
    }
}

fn meta(source: &str, page: &str) -> Meta {
    let mut m = HashMap::new();
    m.insert("source".to_string(), source.to_string());
    m.insert("page_number".to_string(), page.to_string());
    m
}

fn text_hit(source: &str, page: &str, text: &str) -> RetrievalHit {
    RetrievalHit {
        text: Some(text.to_string()),
        table_blob: None,
        modality: Modality::Text,
        metadata: meta(source, page),
        score: 0.9,
    }
}

fn table_hit(source: &str, page: &str) -> RetrievalHit {
    let table = TableData {
        header: vec!["Benefit".to_string()],
        rows: vec![vec!["100%".to_string()]],
    };
    RetrievalHit {
        text: None,
        table_blob: Some(encode_table(&table).expect("encode")),
        modality: Modality::Table,
        metadata: meta(source, page),
        score: 0.8,
    }
}

fn engine(store: StaticStore, scorer: FixedScorer) -> RagEngine {
    RagEngine::new(
        Box::new(FakeProvider::ok()),
        Box::new(store),
        Box::new(scorer),
        RetrievalConfig::default(),
    )
    .expect("engine")
}

fn five_text_hits() -> Vec<RetrievalHit> {
    (1..=5).map(|p| text_hit("policy.pdf", &p.to_string(), &format!("clause {}", p))).collect()
}

// ---- fusion unit behavior ----------------------------------------------

#[test]
fn doc_key_uses_source_and_page_with_defaults() {
    assert_eq!(doc_key(&meta("a.pdf", "3")), "a.pdf|p3");
    assert_eq!(doc_key(&HashMap::new()), "unknown|pna");
}

#[test]
fn fusion_score_is_sum_of_weighted_reciprocal_ranks() {
    // text hit at rank 1 (weight 1.0) + table hit at rank 2 (weight 1.0)
    // for the same identity: 1/1 + 1/2 = 1.5
    let mut fusion = FusionList::new();
    fusion.add_channel(&[text_hit("a.pdf", "1", "t")], 1.0);
    fusion.add_channel(&[table_hit("b.pdf", "9"), table_hit("a.pdf", "1")], 1.0);
    let entries = fusion.into_entries();
    assert_eq!(entries.len(), 2);
    let merged = entries.iter().find(|e| doc_key(&e.metadata) == "a.pdf|p1").expect("merged");
    assert!((merged.score - 1.5).abs() < 1e-6);
}

#[test]
fn fusion_respects_channel_weights() {
    let mut fusion = FusionList::new();
    fusion.add_channel(&[text_hit("a.pdf", "1", "t")], 2.0);
    fusion.add_channel(&[table_hit("a.pdf", "1")], 0.5);
    let entries = fusion.into_entries();
    assert_eq!(entries.len(), 1);
    assert!((entries[0].score - 2.5).abs() < 1e-6);
}

#[test]
fn merged_entry_payload_is_last_writer() {
    let mut fusion = FusionList::new();
    fusion.add_channel(&[text_hit("a.pdf", "1", "prose")], 1.0);
    fusion.add_channel(&[table_hit("a.pdf", "1")], 1.0);
    let entries = fusion.into_entries();
    assert_eq!(entries[0].modality, Modality::Table);
    assert!(entries[0].table_blob.is_some());
}

#[test]
fn entries_keep_insertion_order() {
    let mut fusion = FusionList::new();
    fusion.add_channel(&five_text_hits(), 1.0);
    let keys: Vec<String> =
        fusion.into_entries().iter().map(|e| doc_key(&e.metadata)).collect();
    assert_eq!(keys[0], "policy.pdf|p1");
    assert_eq!(keys[4], "policy.pdf|p5");
}

// ---- normalization ------------------------------------------------------

#[test]
fn min_max_norm_maps_tied_sets_to_half() {
    assert!((min_max_norm(0.7, 0.7, 0.7) - 0.5).abs() < 1e-6);
    assert!((min_max_norm(1.0, 2.0, 1.0) - 0.5).abs() < 1e-6);
}

#[test]
fn min_max_norm_spans_unit_interval() {
    assert!((min_max_norm(1.0, 1.0, 3.0) - 0.0).abs() < 1e-6);
    assert!((min_max_norm(3.0, 1.0, 3.0) - 1.0).abs() < 1e-6);
    assert!((min_max_norm(2.0, 1.0, 3.0) - 0.5).abs() < 1e-6);
}

// ---- retrieve: boundary behavior ----------------------------------------

#[test]
fn empty_query_returns_empty_list() {
    let engine = engine(StaticStore::default(), FixedScorer::new(vec![1.0]));
    let results = engine.retrieve("", 5, None).expect("retrieve");
    assert!(results.is_empty());
    let results = engine.retrieve("   ", 5, None).expect("retrieve");
    assert!(results.is_empty());
}

#[test]
fn no_candidates_from_any_channel_is_not_an_error() {
    let engine = engine(StaticStore::default(), FixedScorer::new(vec![1.0]));
    let results = engine.retrieve("waiting period", 5, None).expect("retrieve");
    assert!(results.is_empty());
}

#[test]
fn text_embedding_failure_is_fatal() {
    let provider = FakeProvider { fail_text: true, fail_table: false };
    let store = StaticStore { text_hits: five_text_hits(), ..StaticStore::default() };
    let engine = RagEngine::new(
        Box::new(provider),
        Box::new(store),
        Box::new(FixedScorer::new(vec![1.0])),
        RetrievalConfig::default(),
    )
    .expect("engine");
    assert!(engine.retrieve("q", 3, None).is_err());
}

#[test]
fn table_embedding_failure_falls_back_to_fitted_text_vector() {
    let provider = FakeProvider { fail_text: false, fail_table: true };
    let store = StaticStore { text_hits: five_text_hits(), ..StaticStore::default() };
    let engine = RagEngine::new(
        Box::new(provider),
        Box::new(store),
        Box::new(FixedScorer::new(vec![1.0])),
        RetrievalConfig::default(),
    )
    .expect("engine");
    let results = engine.retrieve("q", 3, None).expect("retrieve");
    assert_eq!(results.len(), 3);
}

#[test]
fn table_fallback_queries_table_channel_at_table_dim() {
    let provider = FakeProvider { fail_text: false, fail_table: true };
    let store = std::sync::Arc::new(StaticStore {
        text_hits: five_text_hits(),
        ..StaticStore::default()
    });

    struct SharedStore(std::sync::Arc<StaticStore>);
    impl VectorStore for SharedStore {
        fn search_text(
            &self,
            v: &[f32],
            k: usize,
            f: Option<&Meta>,
        ) -> anyhow::Result<Vec<RetrievalHit>> {
            self.0.search_text(v, k, f)
        }
        fn search_table(
            &self,
            v: &[f32],
            k: usize,
            f: Option<&Meta>,
        ) -> anyhow::Result<Vec<RetrievalHit>> {
            self.0.search_table(v, k, f)
        }
    }

    let engine = RagEngine::new(
        Box::new(provider),
        Box::new(SharedStore(store.clone())),
        Box::new(FixedScorer::new(vec![1.0])),
        RetrievalConfig::default(),
    )
    .expect("engine");
    engine.retrieve("q", 3, None).expect("retrieve");
    assert!(store.table_queried.load(Ordering::SeqCst));
    // fallback vector was fitted from text dim 8 down to table dim 4
    assert_eq!(store.last_table_query_dim.load(Ordering::SeqCst), 4);
}

#[test]
fn channel_search_failure_degrades_to_empty_channel() {
    let store = StaticStore {
        text_hits: five_text_hits(),
        fail_table: true,
        ..StaticStore::default()
    };
    let engine = engine(store, FixedScorer::new(vec![0.9, 0.5, 0.1]));
    let results = engine.retrieve("q", 10, None).expect("retrieve");
    assert_eq!(results.len(), 5);
}

#[test]
fn total_channel_failure_returns_empty_not_error() {
    let store = StaticStore { fail_text: true, fail_table: true, ..StaticStore::default() };
    let engine = engine(store, FixedScorer::new(vec![1.0]));
    let results = engine.retrieve("q", 5, None).expect("retrieve");
    assert!(results.is_empty());
}

// ---- retrieve: ranking properties ---------------------------------------

#[test]
fn results_are_deterministic() {
    let store = StaticStore {
        text_hits: five_text_hits(),
        table_hits: vec![table_hit("policy.pdf", "2"), table_hit("benefits.pdf", "1")],
        ..StaticStore::default()
    };
    let engine = engine(store, FixedScorer::new(vec![0.3, 0.9, 0.2, 0.7]));
    let a = engine.retrieve("claims", 4, None).expect("retrieve");
    let b = engine.retrieve("claims", 4, None).expect("retrieve");
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b.iter()) {
        assert_eq!(x.score, y.score);
        assert_eq!(x.metadata, y.metadata);
    }
}

#[test]
fn scores_are_ascending_costs_in_unit_interval() {
    let store = StaticStore {
        text_hits: five_text_hits(),
        table_hits: vec![table_hit("benefits.pdf", "1")],
        ..StaticStore::default()
    };
    let engine = engine(store, FixedScorer::new(vec![0.1, 0.8, 0.4, 0.9, 0.2, 0.6]));
    let results = engine.retrieve("coverage", 6, None).expect("retrieve");
    assert!(!results.is_empty());
    for r in &results {
        assert!((0.0..=1.0).contains(&r.score), "cost {} out of range", r.score);
    }
    for pair in results.windows(2) {
        assert!(pair[0].score <= pair[1].score);
    }
}

#[test]
fn scores_are_rounded_to_four_decimals() {
    let store = StaticStore { text_hits: five_text_hits(), ..StaticStore::default() };
    let engine = engine(store, FixedScorer::new(vec![0.123456, 0.654321, 0.333333]));
    let results = engine.retrieve("q", 5, None).expect("retrieve");
    for r in &results {
        let scaled = r.score * 10_000.0;
        assert!((scaled - scaled.round()).abs() < 1e-3, "score {} not rounded", r.score);
    }
}

#[test]
fn cardinality_is_min_of_top_k_and_entries() {
    let store = StaticStore { text_hits: five_text_hits(), ..StaticStore::default() };
    let engine1 = engine(store, FixedScorer::new(vec![0.5, 0.1, 0.9]));
    assert_eq!(engine1.retrieve("q", 3, None).expect("retrieve").len(), 3);

    let store = StaticStore { text_hits: five_text_hits(), ..StaticStore::default() };
    let engine2 = engine(store, FixedScorer::new(vec![0.5, 0.1, 0.9]));
    assert_eq!(engine2.retrieve("q", 20, None).expect("retrieve").len(), 5);
}

#[test]
fn identity_merge_collapses_cross_modal_hits() {
    // Same (source, page) in both channels: one fused entry, not two.
    let store = StaticStore {
        text_hits: vec![text_hit("policy.pdf", "3", "see table below")],
        table_hits: vec![table_hit("policy.pdf", "3")],
        ..StaticStore::default()
    };
    let engine = engine(store, FixedScorer::new(vec![0.7]));
    let results = engine.retrieve("q", 5, None).expect("retrieve");
    assert_eq!(results.len(), 1);
    // last-writer payload: the table channel contributed second
    assert_eq!(results[0].modality, Modality::Table);
    assert!(results[0].table.is_some(), "table payload must be decompressed");
}

#[test]
fn all_tied_scores_normalize_to_half_and_still_rank() {
    // Identical rerank scores for every candidate: normalization must not
    // divide by zero and fusion order decides.
    let store = StaticStore { text_hits: five_text_hits(), ..StaticStore::default() };
    let engine = engine(store, FixedScorer::new(vec![0.42]));
    let results = engine.retrieve("q", 5, None).expect("retrieve");
    assert_eq!(results.len(), 5);
    // rank-1 text hit has the highest fusion score, so the lowest cost
    assert_eq!(results[0].metadata.get("page_number").map(String::as_str), Some("1"));
}

#[test]
fn rerank_failure_falls_back_to_fusion_order() {
    let store = StaticStore {
        text_hits: five_text_hits(),
        ..StaticStore::default()
    };
    let engine = engine(store, FixedScorer::failing());
    let results = engine.retrieve("q", 5, None).expect("retrieve");
    assert_eq!(results.len(), 5);
    // pure fusion ordering: channel rank order survives
    let pages: Vec<&str> =
        results.iter().filter_map(|r| r.metadata.get("page_number").map(String::as_str)).collect();
    assert_eq!(pages, vec!["1", "2", "3", "4", "5"]);
}

#[test]
fn reranker_can_override_fusion_order() {
    // gamma 1.0: the cross-encoder alone decides.
    let store = StaticStore { text_hits: five_text_hits(), ..StaticStore::default() };
    let cfg = RetrievalConfig { gamma: 1.0, ..RetrievalConfig::default() };
    let engine = RagEngine::new(
        Box::new(FakeProvider::ok()),
        Box::new(store),
        Box::new(FixedScorer::new(vec![0.0, 0.0, 0.0, 0.0, 1.0])),
        cfg,
    )
    .expect("engine");
    let results = engine.retrieve("q", 5, None).expect("retrieve");
    assert_eq!(results[0].metadata.get("page_number").map(String::as_str), Some("5"));
}

// ---- retrieve_context ----------------------------------------------------

#[test]
fn context_joins_texts_and_skips_text_less_entries() {
    let store = StaticStore {
        text_hits: vec![
            text_hit("a.pdf", "1", "first clause"),
            text_hit("a.pdf", "2", "second clause"),
        ],
        table_hits: vec![table_hit("b.pdf", "1")],
        ..StaticStore::default()
    };
    let engine = engine(store, FixedScorer::new(vec![0.9, 0.8, 0.7]));
    let context = engine.retrieve_context("clauses", 5).expect("context");
    assert!(context.contains("first clause"));
    assert!(context.contains("second clause"));
    assert!(context.contains("\n---\n"));
    // the pure-table entry has no text and must not leave a separator stub
    assert_eq!(context.matches("\n---\n").count(), 1);
}

#[test]
fn context_cache_short_circuits_repeat_queries() {
    let scorer = std::sync::Arc::new(FixedScorer::new(vec![0.5, 0.9]));
    let store = StaticStore { text_hits: five_text_hits(), ..StaticStore::default() };
    let engine = RagEngine::new(
        Box::new(FakeProvider::ok()),
        Box::new(store),
        Box::new(CountingScorer(scorer.clone())),
        RetrievalConfig::default(),
    )
    .expect("engine")
    .with_context_cache(Box::new(InMemoryCache::new()));

    let first = engine.retrieve_context("claims", 3).expect("context");
    let second = engine.retrieve_context("claims", 3).expect("context");
    assert_eq!(first, second);
    assert_eq!(scorer.calls.load(Ordering::SeqCst), 1);
}

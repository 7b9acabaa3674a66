use serde_json::json;

use irag_core::cache::InMemoryCache;
use irag_core::config::RetrievalConfig;
use irag_core::table_blob::{decode_table, encode_table};
use irag_core::traits::ResponseCache;
use irag_core::types::TableData;
use irag_core::vector::{fit_dim, normalize_vector};

#[test]
fn table_blob_round_trip() {
    let table = TableData {
        header: vec!["A".to_string(), "B".to_string()],
        rows: vec![vec!["1".to_string(), "2".to_string()]],
    };
    let blob = encode_table(&table).expect("encode");
    let back = decode_table(&blob).expect("decode").expect("present");
    assert_eq!(back, table);
}

#[test]
fn empty_blob_decodes_to_none() {
    assert!(decode_table("").expect("decode").is_none());
}

#[test]
fn table_blob_is_text_safe() {
    let table = TableData {
        header: vec!["Benefit".to_string(), "Coverage".to_string()],
        rows: vec![vec!["Major Illness".to_string(), "100%".to_string()]],
    };
    let blob = encode_table(&table).expect("encode");
    assert!(blob.is_ascii(), "blob must fit a varchar column");
}

#[test]
fn normalize_vector_flattens_nested_input() {
    let raw = json!([[1.0, 2.0], [3.0]]);
    assert_eq!(normalize_vector(&raw, 3), vec![1.0, 2.0, 3.0]);
}

#[test]
fn normalize_vector_coerces_and_pads() {
    let raw = json!(["2.5", null, 1]);
    // "2.5" parses, null coerces to 0.0, then right-pad to dim 5
    assert_eq!(normalize_vector(&raw, 5), vec![2.5, 0.0, 1.0, 0.0, 0.0]);
}

#[test]
fn normalize_vector_truncates_long_input() {
    let raw = json!([1, 2, 3, 4]);
    assert_eq!(normalize_vector(&raw, 2), vec![1.0, 2.0]);
}

#[test]
fn fit_dim_pads_short_vectors() {
    assert_eq!(fit_dim(vec![1.0], 3), vec![1.0, 0.0, 0.0]);
}

#[test]
fn retrieval_config_defaults_are_valid() {
    let cfg = RetrievalConfig::default();
    assert!((cfg.gamma - 0.7).abs() < f32::EPSILON);
    assert_eq!(cfg.candidate_multiplier, 3);
    cfg.validate().expect("defaults validate");
}

#[test]
fn retrieval_config_rejects_bad_gamma() {
    let cfg = RetrievalConfig { gamma: 1.5, ..RetrievalConfig::default() };
    assert!(cfg.validate().is_err());
}

#[test]
fn retrieval_config_rejects_zero_multiplier() {
    let cfg = RetrievalConfig { candidate_multiplier: 0, ..RetrievalConfig::default() };
    assert!(cfg.validate().is_err());
}

#[test]
fn in_memory_cache_round_trips() {
    let cache = InMemoryCache::new();
    assert!(cache.get("q").is_none());
    cache.put("q", "context".to_string());
    assert_eq!(cache.get("q").as_deref(), Some("context"));
}

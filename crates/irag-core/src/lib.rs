//! Shared domain layer of the insurance-document RAG pipeline.
//!
//! Defines the types and trait seams the embedding, store, rerank and
//! retrieval crates plug into, plus the table-payload codec and vector
//! sanitization used at the store boundary.
#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod cache;
pub mod config;
pub mod error;
pub mod table_blob;
pub mod traits;
pub mod types;
pub mod vector;

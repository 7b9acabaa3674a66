//! LanceDB-backed multi-modal vector store.
//!
//! One table holds both embedding spaces: `text_vector` (d=1024) and
//! `table_vector` (d=768), alongside the raw text, the compressed table
//! payload, a modality tag and JSON metadata. Search runs independently
//! against either vector column.

pub mod schema;
pub mod search;
pub mod table;
pub mod writer;

pub use search::LanceVectorStore;
pub use writer::{MultiModalIndexer, StoreRecord};

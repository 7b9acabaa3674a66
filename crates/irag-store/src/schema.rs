use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

pub const TEXT_DIM: i32 = 1024;
pub const TABLE_DIM: i32 = 768;

/// Multi-modal record layout: one row per ingested chunk or table, with a
/// vector column per embedding space. `metadata` is a JSON-encoded map.
pub fn build_arrow_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("text", DataType::Utf8, true),
        Field::new("table_blob", DataType::Utf8, true),
        Field::new("modality", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, false),
        Field::new(
            "ingested_at",
            DataType::Timestamp(TimeUnit::Millisecond, None),
            false,
        ),
        Field::new(
            "text_vector",
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), TEXT_DIM),
            true,
        ),
        Field::new(
            "table_vector",
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), TABLE_DIM),
            true,
        ),
    ]))
}

//! Lossless codec for table payloads stored in the vector index.
//!
//! A table is serialized to JSON, zlib-compressed and base64-encoded so it
//! fits an opaque string column. Decoding reverses the pipeline exactly; an
//! empty blob means "no table".

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::types::TableData;

pub fn encode_table(table: &TableData) -> Result<String> {
    let json = serde_json::to_vec(table).context("serialize table")?;
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(&json)?;
    let compressed = enc.finish()?;
    Ok(B64.encode(compressed))
}

pub fn decode_table(blob: &str) -> Result<Option<TableData>> {
    if blob.is_empty() {
        return Ok(None);
    }
    let compressed = B64.decode(blob).context("base64-decode table blob")?;
    let mut dec = ZlibDecoder::new(compressed.as_slice());
    let mut json = Vec::new();
    dec.read_to_end(&mut json).context("decompress table blob")?;
    let table: TableData = serde_json::from_slice(&json).context("parse table json")?;
    Ok(Some(table))
}

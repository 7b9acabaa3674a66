//! Vector sanitization at the embedding boundary.
//!
//! Upstream encoders occasionally hand back nested or ragged shapes
//! (`[[..]]` instead of `[..]`, mixed number/string cells from JSONL
//! records). Everything that touches a vector column goes through here
//! first so the store only ever sees flat, fixed-length `f32` rows.

use serde_json::Value;

/// Flatten `raw` recursively, coerce each element to `f32` (0.0 when a value
/// is not numeric and not a parseable numeric string), then right-pad with
/// zeros or truncate to exactly `target_dim`.
pub fn normalize_vector(raw: &Value, target_dim: usize) -> Vec<f32> {
    let mut flat = Vec::new();
    flatten_into(raw, &mut flat);
    fit_dim(flat, target_dim)
}

/// Right-pad with zeros or truncate a flat vector to `dim`.
pub fn fit_dim(mut v: Vec<f32>, dim: usize) -> Vec<f32> {
    if v.len() < dim {
        v.resize(dim, 0.0);
    } else {
        v.truncate(dim);
    }
    v
}

fn flatten_into(value: &Value, out: &mut Vec<f32>) {
    match value {
        Value::Array(items) => {
            for item in items {
                flatten_into(item, out);
            }
        }
        Value::Number(n) => out.push(n.as_f64().unwrap_or(0.0) as f32),
        Value::String(s) => out.push(s.parse::<f32>().unwrap_or(0.0)),
        _ => out.push(0.0),
    }
}

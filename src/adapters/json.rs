//! `serde_json`-backed [`JsonExtractor`].
//!
//! Field paths are dot separated; a numeric segment indexes into an array
//! (`afr_ota.files.0.fileid`).

use serde_json::Value;

use crate::app::ports::JsonExtractor;

#[derive(Debug, Clone, Copy, Default)]
pub struct SerdeJsonExtractor;

impl JsonExtractor for SerdeJsonExtractor {
    fn extract(&self, document: &str, field_path: &str) -> Option<String> {
        let root: Value = serde_json::from_str(document).ok()?;
        let mut node = &root;
        for segment in field_path.split('.') {
            node = match node {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        match node {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => serde_json::to_string(other).ok(),
        }
    }
}

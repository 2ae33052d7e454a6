//! Format Renderers: pure functions mapping one [`MetricsSnapshot`] to the
//! wire documents of each target schema. Renderers share no state; the same
//! logical measurement must agree across formats after unit conversion.

pub mod elastic;
pub mod fieldsense;
pub mod otel;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::RendererKind;
use crate::gen::MetricsSnapshot;

/// One rendered document: a routing index name plus the JSON body. The body
/// always carries `@timestamp` and enough fields to determine routing, so
/// the sink needs no out-of-band metadata.
#[derive(Debug, Clone)]
pub struct WireDocument {
    pub index: String,
    pub body: Value,
}

impl WireDocument {
    /// The document timestamp, when present.
    pub fn timestamp(&self) -> Option<&str> {
        self.body.get("@timestamp").and_then(Value::as_str)
    }
}

/// Closed set of output formats.
///
/// Enum dispatch rather than trait objects: the set is fixed by
/// configuration and never extended at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Renderer {
    Elastic,
    Otel,
    Fieldsense,
}

impl Renderer {
    /// Returns the renderer name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Renderer::Elastic => "elastic",
            Renderer::Otel => "otel",
            Renderer::Fieldsense => "fieldsense",
        }
    }

    /// Renders a snapshot into this format's documents.
    pub fn render(&self, snapshot: &MetricsSnapshot) -> Vec<WireDocument> {
        match self {
            Renderer::Elastic => elastic::render(snapshot),
            Renderer::Otel => otel::render(snapshot),
            Renderer::Fieldsense => fieldsense::render(snapshot),
        }
    }
}

impl From<RendererKind> for Renderer {
    fn from(kind: RendererKind) -> Self {
        match kind {
            RendererKind::Elastic => Renderer::Elastic,
            RendererKind::Otel => Renderer::Otel,
            RendererKind::Fieldsense => Renderer::Fieldsense,
        }
    }
}

/// Computes the cardinality fingerprint of a document body: a hash of the
/// sorted set of numeric metric field paths present. Documents with the
/// same field set share a fingerprint, which sinks use for index/template
/// routing.
pub fn metric_names_hash(body: &Value) -> String {
    let mut paths = Vec::new();
    collect_numeric_paths(body, String::new(), &mut paths);
    paths.sort_unstable();

    let digest = Sha256::digest(paths.join(",").as_bytes());
    let mut out = String::with_capacity(16);
    for byte in &digest[..8] {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Attaches the fingerprint to a body under `_metric_names_hash`.
pub fn attach_fingerprint(body: &mut Value) {
    let hash = metric_names_hash(body);
    if let Some(map) = body.as_object_mut() {
        map.insert("_metric_names_hash".to_string(), Value::String(hash));
    }
}

fn collect_numeric_paths(value: &Value, prefix: String, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                collect_numeric_paths(child, path, out);
            }
        }
        Value::Number(_) => out.push(prefix),
        // Strings, bools, arrays, and nulls are metadata, not metric fields.
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_fingerprint_ignores_values() {
        let a = json!({"system": {"cpu": {"user": {"pct": 0.25}}}});
        let b = json!({"system": {"cpu": {"user": {"pct": 0.99}}}});
        assert_eq!(metric_names_hash(&a), metric_names_hash(&b));
    }

    #[test]
    fn test_fingerprint_tracks_field_set() {
        let a = json!({"system": {"cpu": {"user": {"pct": 0.25}}}});
        let b = json!({"system": {"cpu": {"system": {"pct": 0.25}}}});
        assert_ne!(metric_names_hash(&a), metric_names_hash(&b));
    }

    #[test]
    fn test_fingerprint_ignores_string_metadata() {
        let a = json!({"host": {"name": "a"}, "system": {"load": {"1": 0.5}}});
        let b = json!({"host": {"name": "b"}, "system": {"load": {"1": 1.5}}});
        assert_eq!(metric_names_hash(&a), metric_names_hash(&b));
    }

    #[test]
    fn test_fingerprint_is_order_insensitive() {
        let a = json!({"x": 1, "y": 2});
        let b = json!({"y": 2, "x": 1});
        assert_eq!(metric_names_hash(&a), metric_names_hash(&b));
    }

    #[test]
    fn test_attach_fingerprint() {
        let mut body = json!({"system": {"load": {"1": 0.5}}});
        attach_fingerprint(&mut body);
        let hash = body["_metric_names_hash"].as_str().expect("hash present");
        assert_eq!(hash.len(), 16);
    }
}

//! Content-type keyed codec registry.
//!
//! A codec converts between raw body bytes and the structured wire
//! document. The registry is keyed by MIME type (parameters stripped) and
//! ships with a default `application/json` entry.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;

/// Bidirectional bytes ↔ wire document conversion for one content type.
pub trait Codec: Send + Sync {
    /// The canonical MIME type this codec handles.
    fn content_type(&self) -> &'static str;

    /// Parse body bytes into a wire document.
    fn decode(&self, bytes: &[u8]) -> Result<Value>;

    /// Render a wire document to body bytes.
    fn encode(&self, doc: &Value) -> Result<Vec<u8>>;
}

/// The default JSON codec.
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn encode(&self, doc: &Value) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(doc)?)
    }
}

/// Registry mapping content types to codecs.
pub struct CodecRegistry {
    codecs: HashMap<String, Arc<dyn Codec>>,
    default: Arc<dyn Codec>,
}

impl CodecRegistry {
    /// Create a registry with the default `application/json` entry.
    pub fn new() -> Self {
        let json: Arc<dyn Codec> = Arc::new(JsonCodec);
        let mut codecs = HashMap::new();
        codecs.insert(json.content_type().to_string(), json.clone());
        Self {
            codecs,
            default: json,
        }
    }

    /// Register a codec under its canonical content type.
    pub fn register(&mut self, codec: Arc<dyn Codec>) {
        self.codecs.insert(codec.content_type().to_string(), codec);
    }

    /// Register a codec under an additional content type alias.
    pub fn register_as(&mut self, content_type: impl Into<String>, codec: Arc<dyn Codec>) {
        self.codecs.insert(normalize(&content_type.into()), codec);
    }

    /// Look up a codec by content type. MIME parameters are stripped and
    /// the type is matched case-insensitively.
    pub fn get(&self, content_type: &str) -> Option<Arc<dyn Codec>> {
        self.codecs.get(&normalize(content_type)).cloned()
    }

    /// The codec for a response's content type, falling back to the
    /// default JSON codec when the type is absent or unregistered.
    pub fn for_content_type(&self, content_type: Option<&str>) -> Arc<dyn Codec> {
        content_type
            .and_then(|ct| self.get(ct))
            .unwrap_or_else(|| self.default.clone())
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("content_types", &self.codecs.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Strip MIME parameters and lowercase the essence.
fn normalize(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_registry_handles_json() {
        let registry = CodecRegistry::new();
        let codec = registry
            .get("application/json; charset=utf-8")
            .expect("json codec registered");
        let doc = codec.decode(br#"{"name":"Aidan"}"#).unwrap();
        assert_eq!(doc, json!({"name": "Aidan"}));
        assert_eq!(codec.encode(&doc).unwrap(), br#"{"name":"Aidan"}"#);
    }

    #[test]
    fn unknown_content_type_falls_back_to_json() {
        let registry = CodecRegistry::new();
        let codec = registry.for_content_type(Some("text/plain"));
        assert_eq!(codec.content_type(), "application/json");
        assert_eq!(registry.get("text/plain").map(|c| c.content_type()), None);
    }
}

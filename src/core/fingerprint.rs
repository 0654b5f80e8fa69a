//! Deterministic cache-key derivation.
//!
//! Keys are derived from a canonical serialization of the request's
//! cacheable inputs: map keys are sorted, every scalar carries an explicit
//! type tag (so `"1"` and `1` never collide), and parts are length-prefixed
//! before joining (so no separator can occur inside a part). The joined
//! form is hashed with SHA-256 and hex-encoded under a namespace tag.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::domain::{ContentPayload, Context};

/// Cache namespace. Fetch and result keys never collide because the
/// namespace tag prefixes both the hashed input and the final key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// Fetched remote content
    Fetch,

    /// Transformation results
    Result,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Result => "result",
        }
    }
}

/// An opaque, namespaced cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive a cache key from canonicalized parts.
///
/// Equal logical inputs produce equal keys across processes and replicas.
pub fn fingerprint(namespace: Namespace, parts: &[Value]) -> CacheKey {
    let mut joined = String::new();
    joined.push_str(namespace.as_str());

    for part in parts {
        let canonical = canonicalize(part);
        // Length prefix makes the framing unambiguous regardless of content
        joined.push_str(&format!("|{}:{}", canonical.len(), canonical));
    }

    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    let digest = hasher.finalize();

    CacheKey(format!("{}:{}", namespace.as_str(), hex::encode(digest)))
}

/// Key for the transformation-result tier: canonical content + transformer
/// identity + transformer config + caller context.
pub fn result_key(
    content: &ContentPayload,
    transformer: &str,
    config: &Value,
    context: &Context,
) -> CacheKey {
    fingerprint(
        Namespace::Result,
        &[
            content_part(content),
            Value::String(transformer.to_string()),
            config.clone(),
            Value::Object(context.clone()),
        ],
    )
}

/// Key for the content-fetch tier: url + method + normalized headers +
/// the caller's auth identity.
///
/// The auth identity MUST cover whatever credentials the request carries;
/// omitting it would hand one caller's private response body to every
/// other caller of the same URL.
pub fn fetch_key(
    url: &str,
    method: &str,
    headers: &[(String, String)],
    auth_identity: Option<&str>,
) -> CacheKey {
    let mut sorted: Vec<(String, String)> = headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
        .collect();
    sorted.sort();

    let header_values: Vec<Value> = sorted
        .into_iter()
        .map(|(k, v)| Value::String(format!("{}={}", k, v)))
        .collect();

    fingerprint(
        Namespace::Fetch,
        &[
            Value::String(url.to_string()),
            Value::String(method.to_ascii_uppercase()),
            Value::Array(header_values),
            auth_identity.map(|a| Value::String(a.to_string())).unwrap_or(Value::Null),
        ],
    )
}

/// Canonical form of a content payload. Binary media hashes its raw bytes
/// so equal bytes fingerprint equally regardless of how they arrived.
fn content_part(content: &ContentPayload) -> Value {
    match content {
        ContentPayload::Text(text) => Value::String(text.clone()),
        ContentPayload::Media(media) => {
            let mut hasher = Sha256::new();
            hasher.update(&media.bytes);
            Value::String(format!("media:{}:{}", media.mime, hex::encode(hasher.finalize())))
        }
    }
}

/// Canonicalize a JSON value: sorted map keys, explicit type tags.
fn canonicalize(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("b:{}", b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                format!("i:{}", i)
            } else if let Some(u) = n.as_u64() {
                format!("i:{}", u)
            } else {
                format!("f:{}", n)
            }
        }
        Value::String(s) => format!("s:{}:{}", s.len(), s),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(canonicalize).collect();
            format!("a:[{}]", inner.join(","))
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let inner: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}={}", canonicalize(&Value::String(k.clone())), canonicalize(&map[k])))
                .collect();
            format!("m:{{{}}}", inner.join(","))
        }
    }
}

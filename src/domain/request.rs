//! Transformation requests and their payloads.
//!
//! A `TransformRequest` is built once by the caller and handed to the
//! dispatcher or orchestrator unchanged. The builder is the only mutation
//! point; the request itself is immutable.

use serde::{Deserialize, Serialize};

use super::media::BinaryMedia;

/// Caller-supplied key/value context carried through the whole pipeline.
///
/// Context participates in the result cache key and propagates unmodified
/// into every emitted event, in both sync and async mode.
pub type Context = serde_json::Map<String, serde_json::Value>;

/// Identity of a registered transformer (e.g. "summarize")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransformerId(pub String);

impl TransformerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TransformerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransformerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Content handed to a transformer: text or binary media
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPayload {
    Text(String),
    Media(BinaryMedia),
}

impl ContentPayload {
    /// Payload size in bytes, regardless of kind
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Media(media) => media.len(),
        }
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The text content, if this is a text payload
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Media(_) => None,
        }
    }
}

impl From<&str> for ContentPayload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for ContentPayload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<BinaryMedia> for ContentPayload {
    fn from(media: BinaryMedia) -> Self {
        Self::Media(media)
    }
}

/// A request to transform one piece of content.
///
/// Immutable once built. Equal requests (content, transformer, config,
/// context) fingerprint to equal cache keys.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    /// The content to transform
    pub content: ContentPayload,

    /// Which transformer should run
    pub transformer: TransformerId,

    /// Transformer-specific configuration (opaque to the pipeline)
    pub config: serde_json::Value,

    /// Caller context, propagated into events and the cache key
    pub context: Context,

    /// Whether to enqueue for a worker instead of running inline
    pub async_dispatch: bool,
}

impl TransformRequest {
    /// Start building a request for the given transformer
    pub fn builder(transformer: impl Into<TransformerId>) -> TransformRequestBuilder {
        TransformRequestBuilder {
            content: None,
            transformer: transformer.into(),
            config: serde_json::Value::Null,
            context: Context::new(),
            async_dispatch: false,
        }
    }
}

/// Builder for `TransformRequest`
#[derive(Debug, Clone)]
pub struct TransformRequestBuilder {
    content: Option<ContentPayload>,
    transformer: TransformerId,
    config: serde_json::Value,
    context: Context,
    async_dispatch: bool,
}

impl TransformRequestBuilder {
    /// Set the content payload
    pub fn content(mut self, content: impl Into<ContentPayload>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Set transformer-specific configuration
    pub fn config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    /// Add a single context entry
    pub fn context_entry(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Replace the whole context map
    pub fn context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Request background execution via the queue
    pub fn dispatch_async(mut self) -> Self {
        self.async_dispatch = true;
        self
    }

    /// Finish building. Fails if no content was provided.
    pub fn build(self) -> anyhow::Result<TransformRequest> {
        let content = self
            .content
            .ok_or_else(|| anyhow::anyhow!("TransformRequest requires content"))?;

        Ok(TransformRequest {
            content,
            transformer: self.transformer,
            config: self.config,
            context: self.context,
            async_dispatch: self.async_dispatch,
        })
    }
}

//! Handler registration and descriptor resolution.
//!
//! Closures never cross a process boundary as code. At dispatch time a
//! closure becomes a `ClosureDescriptor`: a registered function identifier
//! plus a snapshot of its captured state. The worker resolves the
//! descriptor back into an `Invocable` through the same registry.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ContentPayload, Context, TransformResult, TransformerId};

use super::Invocable;

/// Errors resolving a handler descriptor
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Unknown transformer: {0}")]
    UnknownTransformer(String),

    #[error("Unknown closure function: {0}")]
    UnknownFunction(String),
}

/// Serializable stand-in for a closure: which registered function to call
/// and the state it captured when dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosureDescriptor {
    /// Registered function identifier
    pub function_id: String,

    /// Captured-variable snapshot
    pub captured: serde_json::Value,
}

/// How a handler is referenced across the queue boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum HandlerDescriptor {
    /// A registered closure with captured state
    Closure(ClosureDescriptor),

    /// A named transformer, re-resolved by identity on the worker
    Identity(TransformerId),
}

impl HandlerDescriptor {
    /// Identity string for logs and failure reports
    pub fn identity(&self) -> &str {
        match self {
            Self::Closure(descriptor) => &descriptor.function_id,
            Self::Identity(id) => id.as_str(),
        }
    }
}

/// Async function signature for registered closure handlers:
/// (captured state, content, context) -> result
pub type ClosureFn = Arc<
    dyn Fn(
            serde_json::Value,
            ContentPayload,
            Context,
        ) -> Pin<Box<dyn Future<Output = Result<TransformResult>> + Send>>
        + Send
        + Sync,
>;

/// Registry mapping identities to transformers and function ids to
/// closure handlers. Shared by dispatcher and workers so both sides
/// resolve descriptors identically.
#[derive(Default, Clone)]
pub struct TransformerRegistry {
    transformers: HashMap<String, Arc<dyn Invocable>>,
    functions: HashMap<String, ClosureFn>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named transformer
    pub fn register(&mut self, transformer: Arc<dyn Invocable>) {
        self.transformers
            .insert(transformer.id().to_string(), transformer);
    }

    /// Register a closure handler under a stable function identifier
    pub fn register_function<F, Fut>(&mut self, function_id: impl Into<String>, handler: F)
    where
        F: Fn(serde_json::Value, ContentPayload, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TransformResult>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.functions.insert(
            function_id.into(),
            Arc::new(move |captured, content, context| {
                Box::pin(handler(captured, content, context))
            }),
        );
    }

    /// Look up a named transformer
    pub fn transformer(&self, id: &TransformerId) -> Result<Arc<dyn Invocable>, ResolveError> {
        self.transformers
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| ResolveError::UnknownTransformer(id.as_str().to_string()))
    }

    /// Resolve any descriptor into a callable
    pub fn resolve(&self, descriptor: &HandlerDescriptor) -> Result<Arc<dyn Invocable>, ResolveError> {
        match descriptor {
            HandlerDescriptor::Identity(id) => self.transformer(id),
            HandlerDescriptor::Closure(descriptor) => {
                let handler = self
                    .functions
                    .get(&descriptor.function_id)
                    .cloned()
                    .ok_or_else(|| {
                        ResolveError::UnknownFunction(descriptor.function_id.clone())
                    })?;

                Ok(Arc::new(ClosureInvocable {
                    function_id: descriptor.function_id.clone(),
                    captured: descriptor.captured.clone(),
                    handler,
                }))
            }
        }
    }
}

/// A closure descriptor bound to its registered handler
struct ClosureInvocable {
    function_id: String,
    captured: serde_json::Value,
    handler: ClosureFn,
}

#[async_trait]
impl Invocable for ClosureInvocable {
    fn id(&self) -> &str {
        &self.function_id
    }

    async fn invoke(
        &self,
        content: &ContentPayload,
        context: &Context,
    ) -> Result<TransformResult> {
        (self.handler)(self.captured.clone(), content.clone(), context.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TransformMetadata;

    struct Upcase;

    #[async_trait]
    impl Invocable for Upcase {
        fn id(&self) -> &str {
            "upcase"
        }

        async fn invoke(
            &self,
            content: &ContentPayload,
            _context: &Context,
        ) -> Result<TransformResult> {
            let text = content.as_text().unwrap_or_default().to_uppercase();
            Ok(TransformResult::completed(
                text,
                TransformMetadata::new("test-model", "test", "upcase"),
            ))
        }
    }

    #[tokio::test]
    async fn test_identity_resolution() {
        let mut registry = TransformerRegistry::new();
        registry.register(Arc::new(Upcase));

        let descriptor = HandlerDescriptor::Identity(TransformerId::new("upcase"));
        let invocable = registry.resolve(&descriptor).unwrap();

        let result = invocable
            .invoke(&ContentPayload::from("hello"), &Context::new())
            .await
            .unwrap();
        assert_eq!(result.data.as_deref(), Some("HELLO"));
    }

    #[tokio::test]
    async fn test_closure_resolution_with_captured_state() {
        let mut registry = TransformerRegistry::new();
        registry.register_function("prefix", |captured, content, _context| async move {
            let prefix = captured["prefix"].as_str().unwrap_or_default().to_string();
            let text = content.as_text().unwrap_or_default();
            Ok(TransformResult::completed(
                format!("{}{}", prefix, text),
                TransformMetadata::new("test-model", "test", "prefix"),
            ))
        });

        let descriptor = HandlerDescriptor::Closure(ClosureDescriptor {
            function_id: "prefix".to_string(),
            captured: serde_json::json!({"prefix": ">> "}),
        });

        let invocable = registry.resolve(&descriptor).unwrap();
        let result = invocable
            .invoke(&ContentPayload::from("hello"), &Context::new())
            .await
            .unwrap();
        assert_eq!(result.data.as_deref(), Some(">> hello"));
    }

    #[test]
    fn test_unknown_handlers_are_rejected() {
        let registry = TransformerRegistry::new();

        let identity = HandlerDescriptor::Identity(TransformerId::new("missing"));
        assert!(matches!(
            registry.resolve(&identity),
            Err(ResolveError::UnknownTransformer(_))
        ));

        let closure = HandlerDescriptor::Closure(ClosureDescriptor {
            function_id: "missing".to_string(),
            captured: serde_json::Value::Null,
        });
        assert!(matches!(
            registry.resolve(&closure),
            Err(ResolveError::UnknownFunction(_))
        ));
    }

    #[test]
    fn test_descriptor_wire_format() {
        let descriptor = HandlerDescriptor::Closure(ClosureDescriptor {
            function_id: "prefix".to_string(),
            captured: serde_json::json!({"n": 1}),
        });

        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["kind"], "closure");
        assert_eq!(json["payload"]["function_id"], "prefix");

        let identity = HandlerDescriptor::Identity(TransformerId::new("summarize"));
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json["kind"], "identity");
        assert_eq!(json["payload"], "summarize");
    }
}

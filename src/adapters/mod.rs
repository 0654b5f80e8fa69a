//! Adapter interfaces for external transformation capabilities.
//!
//! Every handler kind (named transformer, registered closure) resolves
//! once at dispatch time into a single `Invocable`, so the pipeline never
//! type-checks handlers at run time.

pub mod registry;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{ContentPayload, Context, TransformResult};

pub use registry::{ClosureDescriptor, HandlerDescriptor, TransformerRegistry};

/// A resolved, callable transformation handler.
///
/// Implementations may fail with any error; the orchestrator catches the
/// whole `anyhow::Error` category and converts it to a failed result.
#[async_trait]
pub trait Invocable: Send + Sync {
    /// Identity used in cache keys, metadata, and failure logs
    fn id(&self) -> &str;

    /// Run the transformation
    async fn invoke(&self, content: &ContentPayload, context: &Context)
        -> Result<TransformResult>;
}

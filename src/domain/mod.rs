//! Domain types for the alembic pipeline.
//!
//! This module contains the core data structures:
//! - Requests: immutable transformation requests and payloads
//! - Results: transformation outcomes and metadata
//! - Media: binary payloads and their queue-safe encoding
//! - Events: pipeline lifecycle notifications

pub mod events;
pub mod media;
pub mod request;
pub mod result;

// Re-export commonly used types
pub use events::{EventSink, RecordingSink, TracingEventSink, TransformEvent};
pub use media::{BinaryMedia, MediaError, QueueableMedia};
pub use request::{
    ContentPayload, Context, TransformRequest, TransformRequestBuilder, TransformerId,
};
pub use result::{TransformMetadata, TransformResult, TransformStatus};

//! alembic - content transformation orchestration core
//!
//! Orchestrates "transform this content" requests so that identical
//! inputs never repeat an expensive external call, the same pipeline runs
//! inline or on a background worker with identical observable semantics,
//! and a shared rate budget protects against request floods.
//!
//! # Architecture
//!
//! One request flows through a linear pipeline:
//! - Rate-limit admission (fixed window, shared counter backend)
//! - Result-cache lookup (fingerprinted key; hit short-circuits)
//! - Invocation of the external capability (`Invocable`)
//! - Store on success (failures are never cached)
//!
//! Remote content goes through the `ContentFetcher` first: URL
//! validation, deny-list checks, bounded retries, and its own cache tier.
//! Async dispatch wraps the same pipeline in a `JobEnvelope` consumed by
//! a `Worker`; binary payloads cross the queue boundary as base64.
//!
//! # Modules
//!
//! - `adapters`: the `Invocable` seam and handler registry
//! - `config`: typed, injected settings (no ambient state)
//! - `core`: fingerprinting, two-tier cache, rate limiter, orchestrator
//! - `domain`: requests, results, media, events
//! - `fetch`: validated, retrying, caching content fetcher
//! - `queue`: envelopes, dispatcher, worker, queue backends
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use alembic::config::Settings;
//! use alembic::core::{Orchestrator, RateLimiter, TieredCache};
//! use alembic::domain::{TracingEventSink, TransformRequest};
//! use alembic::adapters::TransformerRegistry;
//! use alembic::queue::{Dispatcher, MemoryQueue};
//!
//! # async fn run(registry: TransformerRegistry) -> anyhow::Result<()> {
//! let settings = Settings::default();
//! let cache = Arc::new(TieredCache::in_memory(
//!     settings.cache.content_config(),
//!     settings.cache.result_config(),
//! ));
//! let limiter = Arc::new(RateLimiter::in_memory(settings.rate_limit.to_limiter_config()));
//! let orchestrator = Arc::new(Orchestrator::new(
//!     cache,
//!     limiter.clone(),
//!     Arc::new(TracingEventSink),
//! ));
//! let dispatcher = Dispatcher::new(
//!     orchestrator,
//!     Arc::new(registry),
//!     Arc::new(MemoryQueue::new()),
//!     limiter,
//!     settings.queue.to_queue_config(),
//! );
//!
//! let request = TransformRequest::builder("summarize")
//!     .content("long article text")
//!     .build()?;
//! let outcome = dispatcher.dispatch(request).await?;
//! # let _ = outcome;
//! # Ok(())
//! # }
//! ```

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod fetch;
pub mod queue;

/// Initialize tracing for embedding binaries. Respects `RUST_LOG`,
/// defaulting to `info`. Call once at startup.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

// Re-export main types at crate root for convenience
pub use adapters::{ClosureDescriptor, HandlerDescriptor, Invocable, TransformerRegistry};
pub use config::Settings;
pub use core::{CacheKey, Orchestrator, PipelineError, RateLimitExceeded, RateLimiter, TieredCache};
pub use domain::{
    BinaryMedia, ContentPayload, Context, QueueableMedia, TransformEvent, TransformMetadata,
    TransformRequest, TransformResult, TransformStatus, TransformerId,
};
pub use fetch::{ContentFetcher, FetchError, FetchOptions, ValidationError};
pub use queue::{DispatchOutcome, Dispatcher, JobEnvelope, JobHandle, Worker};

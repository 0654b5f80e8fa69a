//! Sync/async dispatch decision.
//!
//! Sync requests run the pipeline inline and return the result. Async
//! requests become a `JobEnvelope` and return a pending handle. Handler
//! resolution and rate-limit admission both happen before the queue is
//! touched, so those errors propagate synchronously in both modes.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::adapters::{registry::ResolveError, HandlerDescriptor, TransformerRegistry};
use crate::core::limiter::{RateLimitExceeded, RateLimiter};
use crate::core::orchestrator::{Orchestrator, PipelineError};
use crate::domain::{TransformRequest, TransformResult, TransformStatus};

use super::backend::{JobQueue, QueueError};
use super::envelope::{JobEnvelope, JobRetryPolicy, QueuePayload};

/// Errors raised at the dispatch seam
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl From<PipelineError> for DispatchError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::RateLimited(e) => Self::RateLimited(e),
        }
    }
}

/// Handle for a job accepted onto the queue
#[derive(Debug, Clone)]
pub struct JobHandle {
    /// Queue-assigned job id
    pub job_id: Uuid,

    /// Queue the job landed on
    pub queue: String,

    /// Always pending at dispatch time
    pub status: TransformStatus,
}

/// What a dispatch produced
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// Sync path: the pipeline ran inline
    Completed(TransformResult),

    /// Async path: the job was enqueued
    Queued(JobHandle),
}

impl DispatchOutcome {
    /// The inline result, if the sync path ran
    pub fn result(&self) -> Option<&TransformResult> {
        match self {
            Self::Completed(result) => Some(result),
            Self::Queued(_) => None,
        }
    }
}

/// Queue-facing configuration consumed at dispatch time
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub name: String,
    pub connection: Option<String>,
    pub timeout_seconds: u64,
    pub tries: u32,
    pub delay_seconds: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "transforms".to_string(),
            connection: None,
            timeout_seconds: 120,
            tries: 3,
            delay_seconds: 0,
        }
    }
}

/// Chooses inline execution vs enqueue-and-return-a-handle
pub struct Dispatcher {
    orchestrator: Arc<Orchestrator>,
    registry: Arc<TransformerRegistry>,
    queue: Arc<dyn JobQueue>,
    limiter: Arc<RateLimiter>,
    config: QueueConfig,
}

impl Dispatcher {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        registry: Arc<TransformerRegistry>,
        queue: Arc<dyn JobQueue>,
        limiter: Arc<RateLimiter>,
        config: QueueConfig,
    ) -> Self {
        Self {
            orchestrator,
            registry,
            queue,
            limiter,
            config,
        }
    }

    /// Dispatch a request against its named transformer
    pub async fn dispatch(
        &self,
        request: TransformRequest,
    ) -> Result<DispatchOutcome, DispatchError> {
        let handler = HandlerDescriptor::Identity(request.transformer.clone());
        self.dispatch_with(handler, request).await
    }

    /// Dispatch a request with an explicit handler (closure descriptors
    /// take this path)
    #[instrument(skip(self, request), fields(handler = %handler.identity(), async_dispatch = request.async_dispatch))]
    pub async fn dispatch_with(
        &self,
        handler: HandlerDescriptor,
        request: TransformRequest,
    ) -> Result<DispatchOutcome, DispatchError> {
        // Resolution failures surface synchronously in both modes
        let invocable = self.registry.resolve(&handler)?;

        if !request.async_dispatch {
            let result = self.orchestrator.run(invocable.as_ref(), &request).await?;
            return Ok(DispatchOutcome::Completed(result));
        }

        // Async: admit before touching the queue so denial never leaves
        // an orphaned job behind
        self.limiter.admit_global().await?;

        let envelope = JobEnvelope {
            handler,
            content: QueuePayload::encode(&request.content),
            context: request.context.clone(),
            retry: JobRetryPolicy {
                max_attempts: self.config.tries,
                timeout_seconds: self.config.timeout_seconds,
                queue: self.config.name.clone(),
                connection: self.config.connection.clone(),
                delay_seconds: self.config.delay_seconds,
            },
            config: request.config.clone(),
        };

        let job_id = self.queue.enqueue(envelope).await?;
        info!(%job_id, queue = %self.config.name, "Job enqueued");

        Ok(DispatchOutcome::Queued(JobHandle {
            job_id,
            queue: self.config.name.clone(),
            status: TransformStatus::Pending,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::Invocable;
    use crate::core::cache::{TierConfig, TieredCache};
    use crate::core::limiter::LimiterConfig;
    use crate::domain::{ContentPayload, Context, RecordingSink, TransformMetadata};
    use crate::queue::backend::MemoryQueue;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Invocable for Echo {
        fn id(&self) -> &str {
            "echo"
        }

        async fn invoke(
            &self,
            content: &ContentPayload,
            _context: &Context,
        ) -> Result<TransformResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(TransformResult::completed(
                content.as_text().unwrap_or_default().to_string(),
                TransformMetadata::new("m", "p", "echo"),
            ))
        }
    }

    fn dispatcher(
        limiter_config: LimiterConfig,
    ) -> (Dispatcher, Arc<MemoryQueue>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = TransformerRegistry::new();
        registry.register(Arc::new(Echo {
            calls: calls.clone(),
        }));

        let limiter = Arc::new(RateLimiter::in_memory(limiter_config));
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(TieredCache::in_memory(
                TierConfig::default(),
                TierConfig::default(),
            )),
            limiter.clone(),
            Arc::new(RecordingSink::new()),
        ));
        let queue = Arc::new(MemoryQueue::new());

        (
            Dispatcher::new(
                orchestrator,
                Arc::new(registry),
                queue.clone(),
                limiter,
                QueueConfig::default(),
            ),
            queue,
            calls,
        )
    }

    #[tokio::test]
    async fn test_sync_dispatch_runs_inline() {
        let (dispatcher, _, calls) = dispatcher(LimiterConfig::default());

        let request = TransformRequest::builder("echo")
            .content("hello")
            .build()
            .unwrap();

        let outcome = dispatcher.dispatch(request).await.unwrap();
        assert_eq!(outcome.result().unwrap().data.as_deref(), Some("hello"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_async_dispatch_enqueues_without_invoking() {
        let (dispatcher, queue, calls) = dispatcher(LimiterConfig::default());

        let request = TransformRequest::builder("echo")
            .content("hello")
            .dispatch_async()
            .build()
            .unwrap();

        let outcome = dispatcher.dispatch(request).await.unwrap();
        let DispatchOutcome::Queued(handle) = outcome else {
            panic!("expected queued outcome");
        };
        assert_eq!(handle.status, TransformStatus::Pending);
        assert_eq!(handle.queue, "transforms");
        assert_eq!(queue.counts().pending, 1);
        // The capability was never invoked synchronously
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_transformer_fails_before_enqueue() {
        let (dispatcher, queue, _) = dispatcher(LimiterConfig::default());

        let request = TransformRequest::builder("missing")
            .content("hello")
            .dispatch_async()
            .build()
            .unwrap();

        let err = dispatcher.dispatch(request).await.unwrap_err();
        assert!(matches!(err, DispatchError::Resolve(_)));
        assert_eq!(queue.counts().pending, 0);
    }

    #[tokio::test]
    async fn test_rate_limit_checked_before_enqueue() {
        let (dispatcher, queue, _) = dispatcher(LimiterConfig {
            enabled: true,
            limit: 1,
            window: std::time::Duration::from_secs(60),
            key_prefix: "t".to_string(),
        });

        let build = || {
            TransformRequest::builder("echo")
                .content("hello")
                .dispatch_async()
                .build()
                .unwrap()
        };

        assert!(dispatcher.dispatch(build()).await.is_ok());

        let err = dispatcher.dispatch(build()).await.unwrap_err();
        assert!(matches!(err, DispatchError::RateLimited(_)));
        // The denied request never reached the queue
        assert_eq!(queue.counts().pending, 1);
    }
}

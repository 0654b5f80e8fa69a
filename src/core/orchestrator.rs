//! The transformation pipeline.
//!
//! One request flows through a linear state machine: admission →
//! cache check → invocation → store → done, branching only on a cache
//! hit. The orchestrator itself is stateless and reentrant; all mutable
//! state lives in the injected cache and limiter backends.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::adapters::Invocable;
use crate::domain::{EventSink, TransformEvent, TransformRequest, TransformResult};

use super::cache::TieredCache;
use super::fingerprint::result_key;
use super::limiter::{RateLimitExceeded, RateLimiter};

/// Failures that terminate the pipeline before a result exists.
///
/// An invocation failure is NOT one of these: it becomes a failed
/// `TransformResult`, which is a normal return value.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),
}

/// Sequences rate-check → cache-lookup → invoke → cache-store for one
/// request.
pub struct Orchestrator {
    cache: Arc<TieredCache>,
    limiter: Arc<RateLimiter>,
    events: Arc<dyn EventSink>,
    invoke_timeout: Option<Duration>,
}

impl Orchestrator {
    pub fn new(
        cache: Arc<TieredCache>,
        limiter: Arc<RateLimiter>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            cache,
            limiter,
            events,
            invoke_timeout: None,
        }
    }

    /// Bound every invocation; elapse becomes an ordinary failed result
    pub fn with_invoke_timeout(mut self, timeout: Duration) -> Self {
        self.invoke_timeout = Some(timeout);
        self
    }

    /// Run the full pipeline, including rate-limit admission.
    #[instrument(skip(self, invocable, request), fields(transformer = %invocable.id()))]
    pub async fn run(
        &self,
        invocable: &dyn Invocable,
        request: &TransformRequest,
    ) -> Result<TransformResult, PipelineError> {
        self.limiter.admit_global().await?;
        Ok(self.run_preadmitted(invocable, request).await)
    }

    /// Run the pipeline for a request that was already admitted.
    ///
    /// Used by workers: the dispatcher admits before enqueueing, so the
    /// worker must not consume a second admission for the same request.
    pub async fn run_preadmitted(
        &self,
        invocable: &dyn Invocable,
        request: &TransformRequest,
    ) -> TransformResult {
        let key = result_key(
            &request.content,
            invocable.id(),
            &request.config,
            &request.context,
        );

        if let Some(cached) = self.cache.results.get(&key).await {
            debug!(key = %key, "Result cache hit");
            self.events.emit(TransformEvent::Completed {
                result: cached.clone(),
                context: request.context.clone(),
            });
            return cached;
        }

        self.events.emit(TransformEvent::Started {
            content: request.content.clone(),
            context: request.context.clone(),
        });

        // The broadest error category: anything the capability throws
        // becomes a failed result instead of crossing this boundary
        let invoked = match self.invoke_timeout {
            Some(limit) => {
                tokio::time::timeout(limit, invocable.invoke(&request.content, &request.context))
                    .await
                    .unwrap_or_else(|_| {
                        Err(anyhow::anyhow!("Invocation timed out after {:?}", limit))
                    })
            }
            None => invocable.invoke(&request.content, &request.context).await,
        };

        let result = match invoked {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Invocation failed");
                TransformResult::failed_with(e.to_string())
            }
        };

        if result.is_successful() {
            // Only successful results are cached; failures self-heal by
            // re-invoking on the next identical request
            self.cache.results.put(&key, &result).await;
            info!(key = %key, "Result stored");
            self.events.emit(TransformEvent::Completed {
                result: result.clone(),
                context: request.context.clone(),
            });
        } else {
            self.events.emit(TransformEvent::Failed {
                error: result
                    .first_error()
                    .unwrap_or("transformation failed")
                    .to_string(),
                content: request.content.clone(),
                context: request.context.clone(),
            });
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::TierConfig;
    use crate::core::limiter::LimiterConfig;
    use crate::domain::{ContentPayload, Context, RecordingSink, TransformMetadata};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingTransformer {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingTransformer {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Invocable for CountingTransformer {
        fn id(&self) -> &str {
            "counting"
        }

        async fn invoke(
            &self,
            content: &ContentPayload,
            _context: &Context,
        ) -> Result<TransformResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("provider exploded");
            }
            Ok(TransformResult::completed(
                content.as_text().unwrap_or_default().to_uppercase(),
                TransformMetadata::new("m", "p", "counting"),
            ))
        }
    }

    fn orchestrator(sink: Arc<RecordingSink>) -> Orchestrator {
        Orchestrator::new(
            Arc::new(TieredCache::in_memory(
                TierConfig::default(),
                TierConfig::default(),
            )),
            Arc::new(RateLimiter::in_memory(LimiterConfig::default())),
            sink,
        )
    }

    fn request(content: &str) -> TransformRequest {
        TransformRequest::builder("counting")
            .content(content)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_second_identical_request_hits_cache() {
        let sink = Arc::new(RecordingSink::new());
        let orchestrator = orchestrator(sink.clone());
        let transformer = CountingTransformer::new(false);

        let first = orchestrator.run(&transformer, &request("hello")).await.unwrap();
        let second = orchestrator.run(&transformer, &request("hello")).await.unwrap();

        assert_eq!(transformer.calls(), 1);
        assert_eq!(first.data, second.data);
        // Cached result returned unchanged, original metadata preserved
        assert_eq!(first.metadata, second.metadata);
        assert_eq!(sink.count("transformation_started"), 1);
        assert_eq!(sink.count("transformation_completed"), 2);
    }

    #[tokio::test]
    async fn test_context_change_forces_reinvocation() {
        let sink = Arc::new(RecordingSink::new());
        let orchestrator = orchestrator(sink);
        let transformer = CountingTransformer::new(false);

        let plain = request("hello");
        let spanish = TransformRequest::builder("counting")
            .content("hello")
            .context_entry("lang", serde_json::json!("es"))
            .build()
            .unwrap();

        orchestrator.run(&transformer, &plain).await.unwrap();
        orchestrator.run(&transformer, &spanish).await.unwrap();

        assert_eq!(transformer.calls(), 2);
    }

    #[tokio::test]
    async fn test_failures_are_never_cached() {
        let sink = Arc::new(RecordingSink::new());
        let orchestrator = orchestrator(sink.clone());
        let transformer = CountingTransformer::new(true);

        let first = orchestrator.run(&transformer, &request("hello")).await.unwrap();
        let second = orchestrator.run(&transformer, &request("hello")).await.unwrap();

        assert!(first.is_failed());
        assert!(second.is_failed());
        assert_eq!(first.data, None);
        // Both calls reached the capability: the failure did not poison
        assert_eq!(transformer.calls(), 2);
        assert_eq!(sink.count("transformation_failed"), 2);
        assert_eq!(sink.count("transformation_completed"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_invocation_times_out_into_failed_result() {
        struct Sleeper;

        #[async_trait]
        impl Invocable for Sleeper {
            fn id(&self) -> &str {
                "sleeper"
            }

            async fn invoke(
                &self,
                _content: &ContentPayload,
                _context: &Context,
            ) -> Result<TransformResult> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(TransformResult::completed(
                    "too late",
                    TransformMetadata::new("m", "p", "sleeper"),
                ))
            }
        }

        let sink = Arc::new(RecordingSink::new());
        let orchestrator =
            orchestrator(sink.clone()).with_invoke_timeout(Duration::from_secs(5));

        let result = orchestrator.run(&Sleeper, &request("hello")).await.unwrap();

        assert!(result.is_failed());
        assert!(result.first_error().unwrap().contains("timed out"));
        // Elapse follows the ordinary failure path: event emitted, not cached
        assert_eq!(sink.count("transformation_failed"), 1);
        assert_eq!(sink.count("transformation_completed"), 0);
    }

    #[tokio::test]
    async fn test_rate_limit_blocks_before_cache_and_invoke() {
        let sink = Arc::new(RecordingSink::new());
        let orchestrator = Orchestrator::new(
            Arc::new(TieredCache::in_memory(
                TierConfig::default(),
                TierConfig::default(),
            )),
            Arc::new(RateLimiter::in_memory(LimiterConfig {
                enabled: true,
                limit: 1,
                window: Duration::from_secs(60),
                key_prefix: "t".to_string(),
            })),
            sink.clone(),
        );
        let transformer = CountingTransformer::new(false);

        assert!(orchestrator.run(&transformer, &request("a")).await.is_ok());

        let denied = orchestrator.run(&transformer, &request("b")).await;
        assert!(matches!(denied, Err(PipelineError::RateLimited(_))));
        // The denied request never reached the capability or emitted events
        assert_eq!(transformer.calls(), 1);
        assert_eq!(sink.count("transformation_started"), 1);
    }

    #[tokio::test]
    async fn test_context_propagates_into_events() {
        let sink = Arc::new(RecordingSink::new());
        let orchestrator = orchestrator(sink.clone());
        let transformer = CountingTransformer::new(false);

        let request = TransformRequest::builder("counting")
            .content("hello")
            .context_entry("tenant", serde_json::json!("acme"))
            .build()
            .unwrap();

        orchestrator.run(&transformer, &request).await.unwrap();

        for event in sink.events() {
            assert_eq!(event.context()["tenant"], serde_json::json!("acme"));
        }
    }
}

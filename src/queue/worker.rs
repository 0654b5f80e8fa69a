//! Worker-side execution of queued jobs.
//!
//! The worker decodes an envelope, resolves its handler through the same
//! registry the dispatcher used, and runs the pipeline. A failure inside a
//! job rethrows into the queue's retry loop: the whole job is redelivered
//! up to its `max_attempts`, then a terminal handler logs the failure and
//! emits one final failed event.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use chrono::Utc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::TransformerRegistry;
use crate::core::orchestrator::Orchestrator;
use crate::domain::{EventSink, TransformEvent, TransformRequest, TransformResult, TransformerId};

use super::backend::{DeliveredJob, JobQueue, QueueError};

/// What processing one delivery produced
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// The pipeline produced a successful result; the job is done
    Completed(TransformResult),

    /// The attempt failed and the job was released for redelivery
    Retrying { job_id: Uuid, attempt: u32 },

    /// Attempts exhausted; the terminal handler ran
    Exhausted { job_id: Uuid, error: String },
}

/// Pulls envelopes off the queue and runs them through the pipeline
pub struct Worker {
    orchestrator: Arc<Orchestrator>,
    registry: Arc<TransformerRegistry>,
    queue: Arc<dyn JobQueue>,
    events: Arc<dyn EventSink>,
}

impl Worker {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        registry: Arc<TransformerRegistry>,
        queue: Arc<dyn JobQueue>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            orchestrator,
            registry,
            queue,
            events,
        }
    }

    /// Process the next available job, if any
    pub async fn run_next(&self) -> Result<Option<JobOutcome>, QueueError> {
        let Some(job) = self.queue.dequeue().await? else {
            return Ok(None);
        };

        Ok(Some(self.process(job).await?))
    }

    /// Process jobs until the queue is empty (tests and batch workers)
    pub async fn drain(&self) -> Result<Vec<JobOutcome>, QueueError> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.run_next().await? {
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, attempt = job.attempt))]
    async fn process(&self, job: DeliveredJob) -> Result<JobOutcome, QueueError> {
        match self.attempt(&job).await {
            Ok(result) => {
                self.queue.mark_done(job.id).await?;
                info!("Job completed");
                Ok(JobOutcome::Completed(result))
            }
            Err(e) => {
                if job.attempt < job.envelope.retry.max_attempts {
                    let not_before = Utc::now()
                        + chrono::Duration::seconds(job.envelope.retry.delay_seconds as i64);
                    self.queue.release(job.id, not_before).await?;

                    warn!(
                        attempt = job.attempt,
                        max_attempts = job.envelope.retry.max_attempts,
                        error = %e,
                        "Job failed, releasing for retry"
                    );
                    Ok(JobOutcome::Retrying {
                        job_id: job.id,
                        attempt: job.attempt,
                    })
                } else {
                    self.terminal_failure(&job, &e).await?;
                    Ok(JobOutcome::Exhausted {
                        job_id: job.id,
                        error: e.to_string(),
                    })
                }
            }
        }
    }

    /// One execution attempt. Any error here is a whole-job failure.
    async fn attempt(&self, job: &DeliveredJob) -> Result<TransformResult> {
        let invocable = self
            .registry
            .resolve(&job.envelope.handler)
            .context("Failed to resolve job handler")?;

        let content = job
            .envelope
            .content
            .decode()
            .context("Failed to decode job payload")?;

        let request = TransformRequest {
            content,
            transformer: TransformerId::new(job.envelope.handler.identity()),
            config: job.envelope.config.clone(),
            context: job.envelope.context.clone(),
            async_dispatch: true,
        };

        // Admission happened at dispatch time; do not consume a second slot.
        // The envelope's per-delivery timeout bounds the whole attempt so a
        // hung capability cannot wedge the worker.
        let budget = Duration::from_secs(job.envelope.retry.timeout_seconds);
        let result = tokio::time::timeout(
            budget,
            self.orchestrator.run_preadmitted(invocable.as_ref(), &request),
        )
        .await
        .map_err(|_| {
            anyhow::anyhow!(
                "Job timed out after {}s",
                job.envelope.retry.timeout_seconds
            )
        })?;

        if result.is_successful() {
            Ok(result)
        } else {
            // Rethrow so the queue's native retry applies to the whole job
            anyhow::bail!(
                "{}",
                result.first_error().unwrap_or("transformation failed")
            )
        }
    }

    /// Runs exactly once per job, after its last attempt
    async fn terminal_failure(
        &self,
        job: &DeliveredJob,
        cause: &anyhow::Error,
    ) -> Result<(), QueueError> {
        let content = job
            .envelope
            .content
            .decode()
            .unwrap_or_else(|_| crate::domain::ContentPayload::Text(String::new()));

        error!(
            job_id = %job.id,
            handler = %job.envelope.handler.identity(),
            content_bytes = content.len(),
            context = %serde_json::Value::Object(job.envelope.context.clone()),
            error = %cause,
            "Job failed terminally after exhausting attempts"
        );

        self.events.emit(TransformEvent::Failed {
            error: cause.to_string(),
            content,
            context: job.envelope.context.clone(),
        });

        self.queue.mark_failed(job.id, &cause.to_string()).await
    }
}

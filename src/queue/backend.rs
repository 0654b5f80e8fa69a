//! Queue backend contract and the bundled in-memory backend.
//!
//! The pipeline assumes a durable queue exists underneath; this trait is
//! the seam. `MemoryQueue` is for tests and single-process deployments:
//! it tracks job state (pending/processing/done/failed) and attempt
//! counts the same way a real backend would.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::envelope::JobEnvelope;

/// Errors from the queue backend
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue backend unavailable: {0}")]
    Unavailable(String),

    #[error("Job not found: {0}")]
    NotFound(Uuid),
}

/// Lifecycle state of a queued job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Waiting for a worker
    Pending,

    /// Delivered to a worker
    Processing,

    /// Finished successfully (terminal)
    Done,

    /// Exhausted its attempts (terminal)
    Failed,
}

/// A job as delivered to a worker
#[derive(Debug, Clone)]
pub struct DeliveredJob {
    /// Queue-assigned job id
    pub id: Uuid,

    /// The envelope as enqueued
    pub envelope: JobEnvelope,

    /// Which delivery this is (1 on the first attempt)
    pub attempt: u32,
}

/// Queue contract consumed by the dispatcher and worker
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue an envelope; returns the job id
    async fn enqueue(&self, envelope: JobEnvelope) -> Result<Uuid, QueueError>;

    /// Deliver the next available job, marking it processing
    async fn dequeue(&self) -> Result<Option<DeliveredJob>, QueueError>;

    /// Mark a delivered job done (terminal)
    async fn mark_done(&self, id: Uuid) -> Result<(), QueueError>;

    /// Return a delivered job to the queue for another attempt
    async fn release(&self, id: Uuid, not_before: DateTime<Utc>) -> Result<(), QueueError>;

    /// Mark a delivered job failed (terminal)
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), QueueError>;

    /// Current status of a job, if known
    async fn status(&self, id: Uuid) -> Result<Option<JobStatus>, QueueError>;
}

#[derive(Debug, Clone)]
struct StoredJob {
    envelope: JobEnvelope,
    status: JobStatus,
    attempts: u32,
    available_at: DateTime<Utc>,
    enqueued_at: DateTime<Utc>,
    error: Option<String>,
}

/// In-process queue backend
#[derive(Debug, Default)]
pub struct MemoryQueue {
    jobs: Mutex<HashMap<Uuid, StoredJob>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts by status (test/diagnostic helper)
    pub fn counts(&self) -> QueueCounts {
        let jobs = self.jobs.lock().expect("queue lock poisoned");
        let mut counts = QueueCounts::default();
        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Done => counts.done += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Last recorded error for a job (test helper)
    pub fn error_of(&self, id: Uuid) -> Option<String> {
        self.jobs
            .lock()
            .expect("queue lock poisoned")
            .get(&id)
            .and_then(|job| job.error.clone())
    }
}

/// Summary of queue occupancy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub pending: usize,
    pub processing: usize,
    pub done: usize,
    pub failed: usize,
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, envelope: JobEnvelope) -> Result<Uuid, QueueError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let delay = chrono::Duration::seconds(envelope.retry.delay_seconds as i64);

        self.jobs.lock().expect("queue lock poisoned").insert(
            id,
            StoredJob {
                envelope,
                status: JobStatus::Pending,
                attempts: 0,
                available_at: now + delay,
                enqueued_at: now,
                error: None,
            },
        );
        Ok(id)
    }

    async fn dequeue(&self) -> Result<Option<DeliveredJob>, QueueError> {
        let mut jobs = self.jobs.lock().expect("queue lock poisoned");
        let now = Utc::now();

        // Oldest available pending job first
        let next = jobs
            .iter()
            .filter(|(_, job)| job.status == JobStatus::Pending && job.available_at <= now)
            .min_by_key(|(_, job)| job.enqueued_at)
            .map(|(id, _)| *id);

        let Some(id) = next else {
            return Ok(None);
        };

        let job = jobs.get_mut(&id).expect("job disappeared under lock");
        job.status = JobStatus::Processing;
        job.attempts += 1;

        Ok(Some(DeliveredJob {
            id,
            envelope: job.envelope.clone(),
            attempt: job.attempts,
        }))
    }

    async fn mark_done(&self, id: Uuid) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().expect("queue lock poisoned");
        let job = jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        job.status = JobStatus::Done;
        Ok(())
    }

    async fn release(&self, id: Uuid, not_before: DateTime<Utc>) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().expect("queue lock poisoned");
        let job = jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        job.status = JobStatus::Pending;
        job.available_at = not_before;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().expect("queue lock poisoned");
        let job = jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        job.status = JobStatus::Failed;
        job.error = Some(error.to_string());
        Ok(())
    }

    async fn status(&self, id: Uuid) -> Result<Option<JobStatus>, QueueError> {
        Ok(self
            .jobs
            .lock()
            .expect("queue lock poisoned")
            .get(&id)
            .map(|job| job.status))
    }
}

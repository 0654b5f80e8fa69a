//! Queued dispatch: envelopes, backends, the dispatcher, and the worker.
//!
//! - Envelope: the serializable unit that crosses the queue boundary
//! - Backend: the queue contract plus the bundled in-memory queue
//! - Dispatcher: the sync/async decision at the pipeline entry
//! - Worker: envelope decoding, execution, retries, terminal failure

pub mod backend;
pub mod dispatcher;
pub mod envelope;
pub mod worker;

// Re-export commonly used types
pub use backend::{DeliveredJob, JobQueue, JobStatus, MemoryQueue, QueueCounts, QueueError};
pub use dispatcher::{DispatchError, DispatchOutcome, Dispatcher, JobHandle, QueueConfig};
pub use envelope::{JobEnvelope, JobRetryPolicy, QueuePayload};
pub use worker::{JobOutcome, Worker};

//! Pipeline lifecycle events.
//!
//! Events are emitted at fixed points of the pipeline regardless of
//! whether it runs inline or on a worker. The caller's context rides along
//! unmodified on every event.

use std::sync::Mutex;

use tracing::{error, info};

use super::request::{ContentPayload, Context};
use super::result::TransformResult;

/// A lifecycle event emitted by the pipeline
#[derive(Debug, Clone)]
pub enum TransformEvent {
    /// Invocation is about to start (cache miss path)
    Started {
        content: ContentPayload,
        context: Context,
    },

    /// A terminal result is available (cache hit or fresh invocation)
    Completed {
        result: TransformResult,
        context: Context,
    },

    /// The invocation failed
    Failed {
        error: String,
        content: ContentPayload,
        context: Context,
    },
}

impl TransformEvent {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "transformation_started",
            Self::Completed { .. } => "transformation_completed",
            Self::Failed { .. } => "transformation_failed",
        }
    }

    /// The context the event carries
    pub fn context(&self) -> &Context {
        match self {
            Self::Started { context, .. }
            | Self::Completed { context, .. }
            | Self::Failed { context, .. } => context,
        }
    }
}

/// Receiver for pipeline events.
///
/// Implementations must be cheap and non-blocking; the pipeline emits
/// inline on its own task.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: TransformEvent);
}

/// Default sink: structured log lines via tracing
#[derive(Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: TransformEvent) {
        match &event {
            TransformEvent::Started { content, .. } => {
                info!(event = event.name(), content_bytes = content.len(), "Transformation started");
            }
            TransformEvent::Completed { result, .. } => {
                info!(
                    event = event.name(),
                    successful = result.is_successful(),
                    "Transformation completed"
                );
            }
            TransformEvent::Failed { error, content, .. } => {
                error!(
                    event = event.name(),
                    content_bytes = content.len(),
                    %error,
                    "Transformation failed"
                );
            }
        }
    }
}

/// Test sink that records every event in order
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TransformEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far
    pub fn events(&self) -> Vec<TransformEvent> {
        self.events.lock().expect("event sink poisoned").clone()
    }

    /// Count of events matching a name
    pub fn count(&self, name: &str) -> usize {
        self.events().iter().filter(|e| e.name() == name).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: TransformEvent) {
        self.events.lock().expect("event sink poisoned").push(event);
    }
}

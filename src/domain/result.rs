//! Transformation results and their lifecycle states.
//!
//! Results are immutable once constructed. The constructors enforce the
//! two state invariants: a failed result never carries data, and a
//! completed result never carries errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformStatus {
    /// Dispatched but not yet picked up
    Pending,

    /// Currently executing
    InProgress,

    /// Finished successfully (terminal)
    Completed,

    /// Finished unsuccessfully (terminal)
    Failed,
}

impl TransformStatus {
    /// Whether this status is terminal (no further transitions)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Descriptive metadata attached to a completed result.
///
/// Never consulted for control flow; callers may use it for display
/// or audit purposes only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformMetadata {
    /// Model that produced the output (e.g. "claude-sonnet")
    pub model: String,

    /// Provider the model ran on (e.g. "anthropic")
    pub provider_id: String,

    /// Identity of the transformer that ran
    pub transformer_id: String,

    /// When the result was produced
    pub created_at: DateTime<Utc>,
}

impl TransformMetadata {
    /// Create metadata stamped with the current time
    pub fn new(
        model: impl Into<String>,
        provider_id: impl Into<String>,
        transformer_id: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            provider_id: provider_id.into(),
            transformer_id: transformer_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// The outcome of a transformation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformResult {
    /// Current lifecycle status
    pub status: TransformStatus,

    /// Transformed output (present only on success)
    pub data: Option<String>,

    /// Descriptive metadata (present only on success)
    pub metadata: Option<TransformMetadata>,

    /// Error messages accumulated on failure
    pub errors: Vec<String>,
}

impl TransformResult {
    /// A completed result carrying output data.
    pub fn completed(data: impl Into<String>, metadata: TransformMetadata) -> Self {
        Self {
            status: TransformStatus::Completed,
            data: Some(data.into()),
            metadata: Some(metadata),
            errors: Vec::new(),
        }
    }

    /// A failed result. Data is never attached to failures.
    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            status: TransformStatus::Failed,
            data: None,
            metadata: None,
            errors,
        }
    }

    /// A failed result from a single error.
    pub fn failed_with(error: impl Into<String>) -> Self {
        Self::failed(vec![error.into()])
    }

    /// A pending result, returned by async dispatch before the worker runs.
    pub fn pending() -> Self {
        Self {
            status: TransformStatus::Pending,
            data: None,
            metadata: None,
            errors: Vec::new(),
        }
    }

    /// True iff the transformation completed with no errors.
    pub fn is_successful(&self) -> bool {
        self.status == TransformStatus::Completed && self.errors.is_empty()
    }

    /// True iff the result is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// True iff the transformation failed.
    pub fn is_failed(&self) -> bool {
        self.status == TransformStatus::Failed
    }

    /// First error message, if any.
    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_result_is_successful() {
        let result = TransformResult::completed(
            "output",
            TransformMetadata::new("model-a", "provider-x", "summarize"),
        );

        assert!(result.is_successful());
        assert!(result.is_terminal());
        assert_eq!(result.data.as_deref(), Some("output"));
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_failed_result_never_carries_data() {
        let result = TransformResult::failed_with("provider timeout");

        assert!(result.is_failed());
        assert!(result.is_terminal());
        assert!(!result.is_successful());
        assert_eq!(result.data, None);
        assert_eq!(result.first_error(), Some("provider timeout"));
    }

    #[test]
    fn test_pending_is_not_terminal() {
        let result = TransformResult::pending();
        assert!(!result.is_terminal());
        assert!(!result.is_successful());
    }

    #[test]
    fn test_result_serde_round_trip() {
        let result = TransformResult::completed(
            "output",
            TransformMetadata::new("model-a", "provider-x", "summarize"),
        );

        let json = serde_json::to_string(&result).unwrap();
        let back: TransformResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }
}

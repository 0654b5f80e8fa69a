//! The serializable unit that crosses the queue boundary.
//!
//! An envelope carries a handler descriptor (never raw code), a
//! transport-safe payload, the caller's context, and the retry policy the
//! queue should apply. Wire format (JSON):
//!
//! ```json
//! {"handler":{"kind":"closure"|"identity","payload":...},
//!  "content":{"kind":"text"|"media","value":...},
//!  "context":{...},
//!  "retry":{"max_attempts":3,"timeout_seconds":120,"queue":"transforms",
//!           "connection":null,"delay_seconds":0}}
//! ```

use serde::{Deserialize, Serialize};

use crate::adapters::HandlerDescriptor;
use crate::domain::{ContentPayload, Context, MediaError, QueueableMedia};

/// Queue-side retry policy, applied per whole-job delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRetryPolicy {
    /// Maximum deliveries before the job fails terminally
    pub max_attempts: u32,

    /// Per-delivery timeout
    pub timeout_seconds: u64,

    /// Queue name to enqueue on
    pub queue: String,

    /// Queue connection, if the backend distinguishes them
    pub connection: Option<String>,

    /// Delay between deliveries
    pub delay_seconds: u64,
}

impl Default for JobRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout_seconds: 120,
            queue: "transforms".to_string(),
            connection: None,
            delay_seconds: 0,
        }
    }
}

/// Transport-safe content: text passes through, binary media is encoded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum QueuePayload {
    Text(String),
    Media(QueueableMedia),
}

impl QueuePayload {
    /// Encode in-process content for the queue
    pub fn encode(content: &ContentPayload) -> Self {
        match content {
            ContentPayload::Text(text) => Self::Text(text.clone()),
            ContentPayload::Media(media) => Self::Media(QueueableMedia::encode(media)),
        }
    }

    /// Decode back into in-process content on the worker
    pub fn decode(&self) -> Result<ContentPayload, MediaError> {
        match self {
            Self::Text(text) => Ok(ContentPayload::Text(text.clone())),
            Self::Media(media) => Ok(ContentPayload::Media(media.decode()?)),
        }
    }
}

/// One queued unit of work, consumed exactly once per delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    /// How the worker resolves the handler
    pub handler: HandlerDescriptor,

    /// The content to transform
    pub content: QueuePayload,

    /// Caller context, propagated unmodified
    pub context: Context,

    /// Retry policy for the queue
    pub retry: JobRetryPolicy,

    /// Transformer configuration; omitted on the wire when null
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub config: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ClosureDescriptor;
    use crate::domain::{BinaryMedia, TransformerId};

    fn envelope(content: QueuePayload) -> JobEnvelope {
        JobEnvelope {
            handler: HandlerDescriptor::Identity(TransformerId::new("summarize")),
            content,
            context: Context::new(),
            retry: JobRetryPolicy::default(),
            config: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_wire_format_shape() {
        let envelope = envelope(QueuePayload::Text("hello".to_string()));
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["handler"]["kind"], "identity");
        assert_eq!(json["handler"]["payload"], "summarize");
        assert_eq!(json["content"]["kind"], "text");
        assert_eq!(json["content"]["value"], "hello");
        assert_eq!(json["retry"]["max_attempts"], 3);
        assert_eq!(json["retry"]["connection"], serde_json::Value::Null);
        // Null config stays off the wire
        assert!(json.get("config").is_none());
    }

    #[test]
    fn test_envelope_round_trip_with_closure() {
        let envelope = JobEnvelope {
            handler: HandlerDescriptor::Closure(ClosureDescriptor {
                function_id: "annotate".to_string(),
                captured: serde_json::json!({"style": "brief"}),
            }),
            content: QueuePayload::Text("body".to_string()),
            context: Context::new(),
            retry: JobRetryPolicy {
                max_attempts: 5,
                delay_seconds: 2,
                ..Default::default()
            },
            config: serde_json::json!({"temperature": 0.1}),
        };

        let json = serde_json::to_string(&envelope).unwrap();
        let back: JobEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn test_media_payload_survives_serialization() {
        let media = BinaryMedia::new(vec![9, 8, 7, 255, 0], "image/png").with_name("pic.png");
        let envelope = envelope(QueuePayload::encode(&ContentPayload::Media(media.clone())));

        let json = serde_json::to_string(&envelope).unwrap();
        let back: JobEnvelope = serde_json::from_str(&json).unwrap();

        let decoded = back.content.decode().unwrap();
        assert_eq!(decoded, ContentPayload::Media(media));
    }
}

//! Binary payloads and their queue-safe encoding.
//!
//! `BinaryMedia` is the in-process representation; `QueueableMedia` is the
//! base64 form it takes when an envelope crosses the queue's serialization
//! boundary. The round trip must be byte-identical.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors decoding media on the worker side
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Invalid base64 payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
}

/// Binary content as held in process (never serialized onto a queue)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMedia {
    /// Raw bytes
    pub bytes: Vec<u8>,

    /// MIME type (e.g. "image/png")
    pub mime: String,

    /// Original file name, if known
    pub name: Option<String>,
}

impl BinaryMedia {
    /// Create binary media from raw bytes
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
            name: None,
        }
    }

    /// Attach the original file name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Transport-safe encoding of `BinaryMedia` for queue serialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueableMedia {
    /// Base64-encoded payload
    pub data: String,

    /// MIME type carried through unchanged
    pub mime: String,

    /// Original file name, if known
    pub name: Option<String>,
}

impl QueueableMedia {
    /// Encode binary media for the queue
    pub fn encode(media: &BinaryMedia) -> Self {
        Self {
            data: STANDARD.encode(&media.bytes),
            mime: media.mime.clone(),
            name: media.name.clone(),
        }
    }

    /// Decode back into binary media on the worker side
    pub fn decode(&self) -> Result<BinaryMedia, MediaError> {
        Ok(BinaryMedia {
            bytes: STANDARD.decode(&self.data)?,
            mime: self.mime.clone(),
            name: self.name.clone(),
        })
    }
}

//! Immutable message payloads.

use bytes::Bytes;

/// One decoded (or to-be-encoded) message payload.
///
/// A `Message` is produced by decoding a single text frame, or consumed to
/// produce one outgoing frame. The payload is immutable and cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    payload: Bytes,
}

impl Message {
    /// Create a message from a text payload.
    pub fn text(text: impl Into<String>) -> Self {
        Message {
            payload: Bytes::from(text.into().into_bytes()),
        }
    }

    /// Create a message from raw payload bytes.
    pub fn from_payload(payload: Vec<u8>) -> Self {
        Message {
            payload: Bytes::from(payload),
        }
    }

    /// The payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The payload as UTF-8 text, if it is valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

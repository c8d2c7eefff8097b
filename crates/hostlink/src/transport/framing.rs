//! Reassembly of JSON documents from a byte stream.
//!
//! The wire format has no length prefix or delimiter: a message ends when the
//! bytes received so far parse as one JSON document. Until then the bytes are
//! kept, up to a fixed bound.

use serde_json::Value;

/// Largest partial message kept before the connection is dropped.
pub const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Result of feeding bytes to a [`MessageBuffer`].
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// The buffer held one complete document; the buffer is now empty.
    Complete(Value),
    /// More bytes are needed.
    Incomplete,
    /// The buffer outgrew its bound without completing a document.
    Overflow {
        /// Buffered size when the bound was exceeded.
        size: usize,
    },
}

/// Per-connection accumulation buffer.
#[derive(Debug)]
pub struct MessageBuffer {
    bytes: Vec<u8>,
    limit: usize,
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::with_limit(MAX_MESSAGE_BYTES)
    }
}

impl MessageBuffer {
    /// A buffer bounded by [`MAX_MESSAGE_BYTES`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A buffer with a custom bound.
    #[must_use]
    pub const fn with_limit(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
        }
    }

    /// Appends `chunk` and tries to decode the accumulated bytes.
    pub fn push(&mut self, chunk: &[u8]) -> Frame {
        self.bytes.extend_from_slice(chunk);
        match serde_json::from_slice::<Value>(&self.bytes) {
            Ok(document) => {
                self.bytes.clear();
                Frame::Complete(document)
            }
            Err(_) if self.bytes.len() > self.limit => Frame::Overflow {
                size: self.bytes.len(),
            },
            Err(_) => Frame::Incomplete,
        }
    }

    /// Bytes currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true when nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

//! Receiver-side message reassembly
//!
//! TCP delivers a byte stream, not messages. A single read may return part of
//! a message, exactly one message, or the tail of one message followed by the
//! start of the next. [`StreamReassembler`] accumulates chunks and cuts them
//! at fixed message boundaries.
//!
//! # Examples
//!
//! ```
//! use mlc_tracking_rust::protocol::StreamReassembler;
//! use mlc_tracking_rust::protocol::message::message_size;
//!
//! let mut reassembler = StreamReassembler::new(2)?;
//! let bytes = vec![0u8; message_size(2)?];
//!
//! assert!(reassembler.push(&bytes[..10])?.is_empty());
//! let messages = reassembler.push(&bytes[10..])?;
//! assert_eq!(messages.len(), 1);
//! assert_eq!(reassembler.buffered(), 0);
//! # Ok::<(), mlc_tracking_rust::TrackingError>(())
//! ```

use crate::error::Result;
use crate::protocol::message::{message_size, TrackingMessage};
use bytes::BytesMut;
use tracing::{debug, trace};

/// Accumulates stream chunks into fixed-size tracking messages
#[derive(Debug)]
pub struct StreamReassembler {
    side: usize,
    message_size: usize,
    buffer: BytesMut,
    decoded: u64,
}

impl StreamReassembler {
    /// Create a reassembler for messages carrying a `side` x `side` image
    ///
    /// # Errors
    ///
    /// - [`TrackingError::InvalidSize`](crate::error::TrackingError::InvalidSize) -
    ///   `side` is too large for the payload size field
    pub fn new(side: usize) -> Result<Self> {
        let message_size = message_size(side)?;
        Ok(StreamReassembler {
            side,
            message_size,
            buffer: BytesMut::with_capacity(message_size),
            decoded: 0,
        })
    }

    /// Grid side this reassembler decodes
    pub fn side(&self) -> usize {
        self.side
    }

    /// Size in bytes of one complete message
    pub fn message_size(&self) -> usize {
        self.message_size
    }

    /// Bytes held that do not yet form a complete message
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Number of messages decoded so far
    pub fn decoded_count(&self) -> u64 {
        self.decoded
    }

    /// Feed one received chunk and return every message it completes
    ///
    /// Empty chunks are accepted and complete nothing. Bytes past the last
    /// complete message stay buffered as the start of the next one.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<TrackingMessage>> {
        if chunk.is_empty() {
            trace!("Empty chunk, nothing to reassemble");
            return Ok(Vec::new());
        }

        self.buffer.extend_from_slice(chunk);
        trace!(
            chunk = chunk.len(),
            buffered = self.buffer.len(),
            "Chunk appended"
        );

        let mut messages = Vec::new();
        while let Some(msg) = self.next_message()? {
            messages.push(msg);
        }
        Ok(messages)
    }

    /// Cut and decode one message if the buffer holds a complete one
    pub fn next_message(&mut self) -> Result<Option<TrackingMessage>> {
        if self.buffer.len() < self.message_size {
            return Ok(None);
        }

        let frame = self.buffer.split_to(self.message_size);
        let msg = TrackingMessage::decode(&frame, self.side)?;
        self.decoded += 1;

        debug!(
            index = self.decoded,
            remaining = self.buffer.len(),
            "Message reassembled"
        );
        Ok(Some(msg))
    }

    /// Drop any partial message
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

//! Blocking tracking receiver
//!
//! Listens for the sender's connection and turns the byte stream back into
//! tracking messages with a [`StreamReassembler`]. The grid side must be
//! known up front because the wire format carries no message length.

use std::collections::VecDeque;
use std::io::{self, Read};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use crate::config::{ReceiverConfig, DEFAULT_READ_CHUNK_SIZE};
use crate::error::Result;
use crate::protocol::{message_size, StreamReassembler, TrackingMessage};
use tracing::{debug, info, trace, warn};

/// Blocking listener for tracking connections
///
/// # Examples
///
/// ```no_run
/// use mlc_tracking_rust::io::TrackingReceiver;
///
/// let receiver = TrackingReceiver::bind("localhost:31000", 256)?;
/// let mut conn = receiver.accept()?;
/// while let Some(msg) = conn.receive()? {
///     println!("{:?}", msg.header);
/// }
/// # Ok::<(), mlc_tracking_rust::error::TrackingError>(())
/// ```
pub struct TrackingReceiver {
    listener: TcpListener,
    side: usize,
    chunk_size: usize,
}

impl TrackingReceiver {
    /// Bind to a local address for a `side` x `side` grid
    ///
    /// # Errors
    ///
    /// - [`TrackingError::Io`](crate::error::TrackingError::Io) - Failed to
    ///   bind (address in use, insufficient permissions, etc.)
    /// - [`TrackingError::InvalidSize`](crate::error::TrackingError::InvalidSize) -
    ///   `side` is too large for the payload size field
    pub fn bind(addr: &str, side: usize) -> Result<Self> {
        message_size(side)?;
        let listener = TcpListener::bind(addr)?;
        info!(
            local_addr = %listener.local_addr()?,
            side = side,
            "Tracking receiver listening"
        );
        Ok(TrackingReceiver {
            listener,
            side,
            chunk_size: DEFAULT_READ_CHUNK_SIZE,
        })
    }

    /// Bind using a [`ReceiverConfig`]
    pub fn from_config(config: &ReceiverConfig) -> Result<Self> {
        config.validate()?;
        let mut receiver = Self::bind(&config.bind_addr, config.side)?;
        receiver.chunk_size = config.read_chunk_size;
        Ok(receiver)
    }

    /// Get the local address this receiver is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Grid side every message is decoded with
    pub fn side(&self) -> usize {
        self.side
    }

    /// Accept the next sender connection
    ///
    /// Blocks until a sender connects.
    pub fn accept(&self) -> Result<ReceiverConnection<TcpStream>> {
        let (stream, addr) = self.listener.accept()?;
        info!(peer_addr = %addr, "Sender connected");
        ReceiverConnection::with_chunk_size(stream, self.side, self.chunk_size)
    }
}

/// One sender connection being reassembled into messages
///
/// Generic over the reader so any byte stream can be decoded.
pub struct ReceiverConnection<R> {
    reader: R,
    reassembler: StreamReassembler,
    pending: VecDeque<TrackingMessage>,
    chunk: Vec<u8>,
}

impl<R: Read> ReceiverConnection<R> {
    /// Wrap a reader with the default read chunk size
    pub fn new(reader: R, side: usize) -> Result<Self> {
        Self::with_chunk_size(reader, side, DEFAULT_READ_CHUNK_SIZE)
    }

    /// Wrap a reader requesting at most `chunk_size` bytes per read
    ///
    /// Fails like [`StreamReassembler::new`] when `side` is too large.
    pub fn with_chunk_size(reader: R, side: usize, chunk_size: usize) -> Result<Self> {
        Ok(ReceiverConnection {
            reader,
            reassembler: StreamReassembler::new(side)?,
            pending: VecDeque::new(),
            chunk: vec![0u8; chunk_size.max(1)],
        })
    }

    /// Bytes received but not yet part of a complete message
    pub fn buffered(&self) -> usize {
        self.reassembler.buffered()
    }

    /// Messages decoded so far
    pub fn decoded_count(&self) -> u64 {
        self.reassembler.decoded_count()
    }

    /// Block until the next complete message arrives
    ///
    /// Returns `None` once the sender closes the connection. Reads that time
    /// out, would block, or are interrupted are retried. Trailing bytes that
    /// never formed a whole message are logged and dropped.
    ///
    /// # Errors
    ///
    /// - [`TrackingError::Io`](crate::error::TrackingError::Io) - Any other
    ///   read failure
    pub fn receive(&mut self) -> Result<Option<TrackingMessage>> {
        loop {
            if let Some(msg) = self.pending.pop_front() {
                return Ok(Some(msg));
            }

            match self.reader.read(&mut self.chunk) {
                Ok(0) => {
                    if self.reassembler.buffered() > 0 {
                        warn!(
                            bytes = self.reassembler.buffered(),
                            "Connection closed mid-message"
                        );
                    }
                    info!(
                        messages = self.reassembler.decoded_count(),
                        "Sender disconnected"
                    );
                    return Ok(None);
                }
                Ok(n) => {
                    trace!(bytes = n, "Chunk received");
                    let messages = self.reassembler.push(&self.chunk[..n])?;
                    self.pending.extend(messages);
                }
                Err(e) if is_retryable(&e) => {
                    trace!(kind = ?e.kind(), "Empty read, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Iterate over messages until the sender disconnects
    pub fn messages(&mut self) -> impl Iterator<Item = Result<TrackingMessage>> + '_ {
        std::iter::from_fn(move || self.receive().transpose())
    }

    /// Unwrap the underlying reader
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl ReceiverConnection<TcpStream> {
    /// Set read timeout for the underlying TCP stream
    ///
    /// Timed-out reads are retried by [`receive`](Self::receive).
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.reader.set_read_timeout(timeout)?;
        debug!(timeout = ?timeout, "Read timeout configured");
        Ok(())
    }

    /// Address of the connected sender
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.reader.peer_addr()?)
    }
}

pub(crate) fn is_retryable(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TrackingHeader;

    fn message(side: usize, marker: u16) -> Vec<u8> {
        let header = TrackingHeader {
            payload_byte_count: (side * side * 2) as u32,
            width: side as i32,
            height: side as i32,
            ..TrackingHeader::default()
        };
        TrackingMessage {
            header,
            pixels: vec![marker; side * side],
        }
        .encode()
    }

    /// Yields the scripted results in order, then EOF
    struct ScriptedReader {
        steps: VecDeque<io::Result<Vec<u8>>>,
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.steps.pop_front() {
                None => Ok(0),
                Some(Err(e)) => Err(e),
                Some(Ok(mut data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    if n < data.len() {
                        self.steps.push_front(Ok(data.split_off(n)));
                    }
                    Ok(n)
                }
            }
        }
    }

    #[test]
    fn test_receive_retries_transient_errors() {
        let msg = message(2, 7);
        let (a, b) = msg.split_at(10);
        let reader = ScriptedReader {
            steps: VecDeque::from(vec![
                Err(io::Error::from(io::ErrorKind::WouldBlock)),
                Ok(a.to_vec()),
                Err(io::Error::from(io::ErrorKind::Interrupted)),
                Err(io::Error::from(io::ErrorKind::TimedOut)),
                Ok(b.to_vec()),
            ]),
        };

        let mut conn = ReceiverConnection::new(reader, 2).unwrap();
        let received = conn.receive().unwrap().unwrap();
        assert_eq!(received.pixels, vec![7; 4]);
        assert!(conn.receive().unwrap().is_none());
    }

    #[test]
    fn test_receive_fatal_error() {
        let reader = ScriptedReader {
            steps: VecDeque::from(vec![Err(io::Error::from(
                io::ErrorKind::ConnectionReset,
            ))]),
        };
        let mut conn = ReceiverConnection::new(reader, 2).unwrap();
        assert!(conn.receive().is_err());
    }

    #[test]
    fn test_small_chunks_and_coalesced_messages() {
        let mut stream = message(3, 1);
        stream.extend(message(3, 2));
        stream.extend(message(3, 3));

        let mut conn = ReceiverConnection::with_chunk_size(&stream[..], 3, 5).unwrap();
        let markers: Vec<u16> = conn
            .messages()
            .map(|m| m.unwrap().pixels[0])
            .collect();
        assert_eq!(markers, vec![1, 2, 3]);
        assert_eq!(conn.decoded_count(), 3);
        assert_eq!(conn.buffered(), 0);
    }

    #[test]
    fn test_truncated_stream_ends() {
        let stream = message(2, 9);
        let mut conn = ReceiverConnection::new(&stream[..stream.len() - 1], 2).unwrap();
        assert!(conn.receive().unwrap().is_none());
        assert_eq!(conn.buffered(), stream.len() - 1);
    }

    #[test]
    fn test_oversized_side_is_rejected_before_binding() {
        assert!(matches!(
            TrackingReceiver::bind("127.0.0.1:0", u32::MAX as usize),
            Err(crate::error::TrackingError::InvalidSize { .. })
        ));
        assert!(ReceiverConnection::new(&[0u8; 0][..], u32::MAX as usize).is_err());
    }
}

//! Asynchronous tracking receiver
//!
//! Tokio counterpart of [`TrackingReceiver`](super::TrackingReceiver). Uses
//! the same [`StreamReassembler`], so chunking behaves identically.

use std::collections::VecDeque;

use crate::config::{ReceiverConfig, DEFAULT_READ_CHUNK_SIZE};
use crate::error::Result;
use crate::io::receiver::is_retryable;
use crate::protocol::{message_size, StreamReassembler, TrackingMessage};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, trace, warn};

/// Asynchronous listener for tracking connections
///
/// # Examples
///
/// ```no_run
/// use mlc_tracking_rust::io::AsyncTrackingReceiver;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let receiver = AsyncTrackingReceiver::bind("127.0.0.1:31000", 256).await?;
///     let mut conn = receiver.accept().await?;
///     while let Some(msg) = conn.receive().await? {
///         println!("{:?}", msg.header);
///     }
///     Ok(())
/// }
/// ```
pub struct AsyncTrackingReceiver {
    listener: TcpListener,
    side: usize,
    chunk_size: usize,
}

impl AsyncTrackingReceiver {
    /// Bind to a local address for a `side` x `side` grid
    pub async fn bind(addr: &str, side: usize) -> Result<Self> {
        message_size(side)?;
        info!(addr = %addr, "Binding tracking receiver (async)");
        let listener = TcpListener::bind(addr).await?;
        info!(
            local_addr = %listener.local_addr()?,
            side = side,
            "Tracking receiver listening (async)"
        );
        Ok(AsyncTrackingReceiver {
            listener,
            side,
            chunk_size: DEFAULT_READ_CHUNK_SIZE,
        })
    }

    /// Bind using a [`ReceiverConfig`]
    pub async fn from_config(config: &ReceiverConfig) -> Result<Self> {
        config.validate()?;
        let mut receiver = Self::bind(&config.bind_addr, config.side).await?;
        receiver.chunk_size = config.read_chunk_size;
        Ok(receiver)
    }

    /// Get the local address this receiver is bound to
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept the next sender connection
    pub async fn accept(&self) -> Result<AsyncReceiverConnection<TcpStream>> {
        trace!("Waiting for sender connection (async)");
        let (stream, addr) = self.listener.accept().await?;
        info!(peer_addr = %addr, "Sender connected (async)");
        AsyncReceiverConnection::with_chunk_size(stream, self.side, self.chunk_size)
    }
}

/// One sender connection being reassembled into messages (async)
pub struct AsyncReceiverConnection<R> {
    reader: R,
    reassembler: StreamReassembler,
    pending: VecDeque<TrackingMessage>,
    chunk: Vec<u8>,
}

impl<R: AsyncRead + Unpin> AsyncReceiverConnection<R> {
    /// Wrap a reader with the default read chunk size
    pub fn new(reader: R, side: usize) -> Result<Self> {
        Self::with_chunk_size(reader, side, DEFAULT_READ_CHUNK_SIZE)
    }

    /// Wrap a reader requesting at most `chunk_size` bytes per read
    pub fn with_chunk_size(reader: R, side: usize, chunk_size: usize) -> Result<Self> {
        Ok(AsyncReceiverConnection {
            reader,
            reassembler: StreamReassembler::new(side)?,
            pending: VecDeque::new(),
            chunk: vec![0u8; chunk_size.max(1)],
        })
    }

    /// Messages decoded so far
    pub fn decoded_count(&self) -> u64 {
        self.reassembler.decoded_count()
    }

    /// Bytes received but not yet part of a complete message
    pub fn buffered(&self) -> usize {
        self.reassembler.buffered()
    }

    /// Wait for the next complete message; `None` once the sender closes
    pub async fn receive(&mut self) -> Result<Option<TrackingMessage>> {
        loop {
            if let Some(msg) = self.pending.pop_front() {
                return Ok(Some(msg));
            }

            match self.reader.read(&mut self.chunk).await {
                Ok(0) => {
                    if self.reassembler.buffered() > 0 {
                        warn!(
                            bytes = self.reassembler.buffered(),
                            "Connection closed mid-message (async)"
                        );
                    }
                    info!(
                        messages = self.reassembler.decoded_count(),
                        "Sender disconnected (async)"
                    );
                    return Ok(None);
                }
                Ok(n) => {
                    trace!(bytes = n, "Chunk received (async)");
                    let messages = self.reassembler.push(&self.chunk[..n])?;
                    self.pending.extend(messages);
                }
                Err(e) if is_retryable(&e) => {
                    trace!(kind = ?e.kind(), "Empty read, retrying (async)");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

//! Outbound tracking connection
//!
//! Blocking TCP client that owns the single connection of a tracking
//! session. Every send writes the whole message or fails, and the socket is
//! shut down exactly once whichever way the session ends.

use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use crate::config::TrackingConfig;
use crate::error::{Result, TrackingError};
use crate::pipeline::session::MessageSink;
use crate::protocol::TrackingMessage;
use tracing::{debug, error, info, trace, warn};

/// Blocking connection to the tracking consumer
///
/// # Examples
///
/// ```no_run
/// use mlc_tracking_rust::io::TrackingClient;
///
/// let mut client = TrackingClient::connect("localhost:31000")?;
/// client.send(&[0u8; 72])?;
/// client.close()?;
/// # Ok::<(), mlc_tracking_rust::error::TrackingError>(())
/// ```
pub struct TrackingClient {
    stream: Arc<TcpStream>,
    addr: String,
    closed: bool,
    messages_sent: u64,
    bytes_sent: u64,
}

impl TrackingClient {
    /// Connect to a tracking consumer with no timeouts
    ///
    /// # Arguments
    ///
    /// * `addr` - Consumer address (e.g., "localhost:31000")
    ///
    /// # Errors
    ///
    /// - [`TrackingError::Connect`] - Nothing is listening, or the address
    ///   does not resolve
    pub fn connect(addr: &str) -> Result<Self> {
        info!(addr = addr, "Connecting to tracking consumer");
        let stream = TcpStream::connect(addr).map_err(|source| TrackingError::Connect {
            addr: addr.to_string(),
            source,
        })?;
        Ok(Self::from_stream(stream, addr))
    }

    /// Connect using the address and timeouts of a [`TrackingConfig`]
    ///
    /// With a connect timeout, every resolved address is tried in turn and
    /// the last failure is reported.
    ///
    /// # Errors
    ///
    /// - [`TrackingError::Connect`] - No resolved address accepted the
    ///   connection in time
    /// - [`TrackingError::Io`] - The write timeout could not be applied
    pub fn connect_with(config: &TrackingConfig) -> Result<Self> {
        let addr = config.consumer_addr.as_str();
        let client = match config.connect_timeout() {
            None => Self::connect(addr)?,
            Some(timeout) => {
                info!(
                    addr = addr,
                    timeout_ms = timeout.as_millis() as u64,
                    "Connecting to tracking consumer"
                );
                let stream = connect_timeout(addr, timeout).map_err(|source| {
                    TrackingError::Connect {
                        addr: addr.to_string(),
                        source,
                    }
                })?;
                Self::from_stream(stream, addr)
            }
        };

        client.set_write_timeout(config.send_timeout())?;
        Ok(client)
    }

    fn from_stream(stream: TcpStream, addr: &str) -> Self {
        debug!(addr = addr, peer = ?stream.peer_addr().ok(), "Connected");
        TrackingClient {
            stream: Arc::new(stream),
            addr: addr.to_string(),
            closed: false,
            messages_sent: 0,
            bytes_sent: 0,
        }
    }

    /// Set write timeout for send operations
    ///
    /// # Arguments
    ///
    /// * `timeout` - Timeout duration (None for blocking forever)
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.stream.set_write_timeout(timeout)?;
        Ok(())
    }

    /// Enable or disable TCP_NODELAY
    pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        self.stream.set_nodelay(nodelay)?;
        debug!(nodelay = nodelay, "TCP_NODELAY configured");
        Ok(())
    }

    /// Address this client was asked to connect to
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Address of the connected peer
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Messages sent so far
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent
    }

    /// Bytes sent so far
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Write the whole buffer and flush
    ///
    /// Returns only after every byte has been handed to the OS.
    ///
    /// # Errors
    ///
    /// - [`TrackingError::Io`] - The connection broke, the write timed out,
    ///   or the socket was shut down through a [`CloseHandle`]
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        trace!(bytes = data.len(), "Sending");
        let mut stream = &*self.stream;
        stream.write_all(data)?;
        stream.flush()?;

        self.messages_sent += 1;
        self.bytes_sent += data.len() as u64;
        debug!(bytes = data.len(), total = self.bytes_sent, "Sent");
        Ok(())
    }

    /// Encode and send one tracking message
    pub fn send_message(&mut self, msg: &TrackingMessage) -> Result<()> {
        self.send(&msg.encode())
    }

    /// Handle that can shut the connection down from another thread
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            stream: Arc::clone(&self.stream),
        }
    }

    /// Shut the connection down
    ///
    /// A socket the peer already tore down is not an error.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        info!(
            addr = %self.addr,
            messages = self.messages_sent,
            bytes = self.bytes_sent,
            "Closing tracking connection"
        );
        match self.stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Connect, run `f`, and close the connection on every exit path
    ///
    /// When `f` fails, the error category, its message, and its source
    /// chain are logged before the socket is closed. The error from `f`
    /// takes precedence over any error from closing.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use mlc_tracking_rust::config::TrackingConfig;
    /// use mlc_tracking_rust::io::TrackingClient;
    ///
    /// let config = TrackingConfig::default();
    /// TrackingClient::scoped(&config, |client| client.send(b"frame"))?;
    /// # Ok::<(), mlc_tracking_rust::error::TrackingError>(())
    /// ```
    pub fn scoped<T, F>(config: &TrackingConfig, f: F) -> Result<T>
    where
        F: FnOnce(&mut TrackingClient) -> Result<T>,
    {
        let mut client = match Self::connect_with(config) {
            Ok(client) => client,
            Err(e) => {
                log_failure(&e);
                return Err(e);
            }
        };

        let result = f(&mut client);
        if let Err(e) = &result {
            log_failure(e);
        }

        let closed = client.close();
        match result {
            Ok(value) => closed.map(|_| value),
            Err(e) => {
                if let Err(close_err) = closed {
                    warn!(error = %close_err, "Close after failure also failed");
                }
                Err(e)
            }
        }
    }
}

impl MessageSink for TrackingClient {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        TrackingClient::send(self, bytes)
    }
}

impl Drop for TrackingClient {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "Failed to close tracking connection on drop");
        }
    }
}

/// Cloneable handle that shuts a [`TrackingClient`] connection down
///
/// Closing while a send is in flight makes that send fail with an I/O error.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    stream: Arc<TcpStream>,
}

impl CloseHandle {
    /// Shut down both directions of the connection
    pub fn close(&self) -> Result<()> {
        debug!("Tracking connection closed through handle");
        match self.stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e.into()),
            _ => Ok(()),
        }
    }
}

fn connect_timeout(addr: &str, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for socket_addr in addr.to_socket_addrs()? {
        match TcpStream::connect_timeout(&socket_addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(addr = %socket_addr, error = %e, "Connect attempt failed");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing")
    }))
}

fn log_failure(e: &TrackingError) {
    error!(
        category = e.category(),
        error = %e,
        chain = ?e.source_chain(),
        "Tracking session failed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    fn refused_addr() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr.to_string()
    }

    #[test]
    fn test_connect_refused() {
        let addr = refused_addr();
        let err = TrackingClient::connect(&addr).err().unwrap();
        assert_eq!(err.category(), "connection");
        assert!(matches!(err, TrackingError::Connect { addr: a, .. } if a == addr));
    }

    #[test]
    fn test_connect_with_timeout_refused() {
        let mut config = TrackingConfig::new(refused_addr());
        config.connect_timeout_ms = Some(500);
        assert!(matches!(
            TrackingClient::connect_with(&config),
            Err(TrackingError::Connect { .. })
        ));
    }

    #[test]
    fn test_scoped_refused_never_runs_body() {
        let config = TrackingConfig::new(refused_addr());
        let mut ran = false;
        let result = TrackingClient::scoped(&config, |_client| {
            ran = true;
            Ok(())
        });
        assert!(result.is_err());
        assert!(!ran);
    }

    #[test]
    fn test_send_and_counters() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let reader = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).unwrap();
            buf
        });

        let mut client = TrackingClient::connect(&addr).unwrap();
        client.send(b"abc").unwrap();
        client.send(b"defg").unwrap();
        assert_eq!(client.messages_sent(), 2);
        assert_eq!(client.bytes_sent(), 7);
        client.close().unwrap();

        assert_eq!(reader.join().unwrap(), b"abcdefg");
    }

    #[test]
    fn test_scoped_closes_on_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let config = TrackingConfig::new(listener.local_addr().unwrap().to_string());

        let reader = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).unwrap();
            buf
        });

        let result: Result<()> = TrackingClient::scoped(&config, |client| {
            client.send(b"one")?;
            Err(TrackingError::MissingField("position"))
        });
        assert!(matches!(result, Err(TrackingError::MissingField("position"))));
        assert_eq!(reader.join().unwrap(), b"one");
    }
}

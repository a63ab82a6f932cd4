use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{lookup_host, TcpStream};

use crate::protocol::error::{DisqueError, Result};

/// Default timeout for establishing a TCP connection (5 seconds)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Async TCP transport used to open sockets to Disque nodes.
///
/// The transport only establishes connections; framing is done by
/// [`RespCodec`](super::RespCodec) on top of the returned stream.
///
/// # Example
///
/// ```no_run
/// use disque_common::transport::TcpTransport;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = TcpTransport::new(Duration::from_secs(2));
/// let stream = transport.connect("127.0.0.1:7711").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TcpTransport {
    connect_timeout: Duration,
}

impl TcpTransport {
    /// Creates a new transport with the given connect timeout.
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Connects to a remote endpoint.
    ///
    /// The address is resolved and each resolved socket address is tried in
    /// turn until one accepts. The whole attempt, resolution included, is
    /// bounded by the connect timeout.
    ///
    /// # Arguments
    ///
    /// * `addr` - The address to connect to (e.g., "127.0.0.1:7711")
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The address cannot be resolved (`Connection`)
    /// - Every resolved address refuses the connection (`Connection`)
    /// - The timeout expires first (`Timeout`)
    pub async fn connect(&self, addr: &str) -> Result<TcpStream> {
        match tokio::time::timeout(self.connect_timeout, Self::connect_any(addr)).await {
            Ok(result) => result,
            Err(_) => Err(DisqueError::Timeout(self.connect_timeout.as_millis() as u64)),
        }
    }

    async fn connect_any(addr: &str) -> Result<TcpStream> {
        let socket_addrs = lookup_host(addr)
            .await
            .map_err(|e| DisqueError::Connection(format!("Invalid address '{}': {}", addr, e)))?;

        let mut last_err = None;
        for socket_addr in socket_addrs {
            match TcpStream::connect(socket_addr).await {
                Ok(stream) => {
                    stream.set_nodelay(true).map_err(|e| Self::map_io_error(e, "setting TCP_NODELAY"))?;
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(DisqueError::Connection(format!(
            "Failed to connect to {}: {}",
            addr,
            last_err.map(|e| e.to_string()).unwrap_or_else(|| "no address resolved".to_string())
        )))
    }

    /// Writes the whole buffer to the stream.
    pub async fn send_all<W>(stream: &mut W, data: &[u8]) -> Result<()>
    where
        W: AsyncWriteExt + Unpin,
    {
        stream
            .write_all(data)
            .await
            .map_err(|e| Self::map_io_error(e, "writing command"))?;
        stream
            .flush()
            .await
            .map_err(|e| Self::map_io_error(e, "flushing stream"))
    }

    /// Map IO errors to appropriate DisqueError variants
    ///
    /// - Timeouts/would block -> `Timeout`
    /// - Connection errors -> `Connection`
    /// - Other IO errors -> `Io`
    pub fn map_io_error(err: std::io::Error, context: &str) -> DisqueError {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => DisqueError::Timeout(0),
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::NotConnected => {
                DisqueError::Connection(format!("{}: {}", context, err))
            }
            _ => DisqueError::Io(err),
        }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

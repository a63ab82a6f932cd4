use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::protocol::error::{DisqueError, Result};
use crate::protocol::{Command, Reply};
use crate::transport::codec::RespCodec;
use crate::transport::tcp::TcpTransport;

static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// What the server does with the connection after writing a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

/// Per-connection state handed to the command handler.
#[derive(Debug)]
pub struct Session {
    id: u64,
    peer: SocketAddr,
    authenticated: AtomicBool,
}

impl Session {
    /// Creates a session with a fresh id, not yet authenticated.
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            id: SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            peer,
            authenticated: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    pub fn set_authenticated(&self, value: bool) {
        self.authenticated.store(value, Ordering::Release);
    }
}

/// Async RESP server.
///
/// Accepts connections and decodes pipelined commands from each one, handing
/// them in order to a handler and writing the replies back in the same order.
/// Used to stand up in-process Disque nodes for tests and the `mock` CLI
/// subcommand.
pub struct TcpServer {
    listener: TcpListener,
    shutdown: CancellationToken,
}

impl TcpServer {
    /// Creates a new TCP server bound to the specified address.
    ///
    /// # Arguments
    /// * `bind_addr` - The address to bind to (e.g., "127.0.0.1:0")
    pub async fn new(bind_addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| DisqueError::Connection(format!("Failed to bind to {}: {}", bind_addr, e)))?;

        Ok(Self {
            listener,
            shutdown: CancellationToken::new(),
        })
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| DisqueError::Connection(format!("Failed to get local addr: {}", e)))
    }

    /// Token that stops the accept loop and every open connection when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs the server with the given command handler until the shutdown
    /// token is cancelled.
    ///
    /// Each connection runs in its own task. Commands on one connection are
    /// handled one at a time, so replies keep the order of the commands.
    ///
    /// # Arguments
    /// * `handler` - Function producing the reply for each command
    pub async fn run_with_handler<F, Fut>(self, handler: F) -> Result<()>
    where
        F: Fn(Command, Arc<Session>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = (Reply, Flow)> + Send + 'static,
    {
        let handler = Arc::new(handler);

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                accepted = self.listener.accept() => accepted
                    .map_err(|e| DisqueError::Connection(format!("Failed to accept connection: {}", e)))?,
            };

            debug!(peer = %peer_addr, "Connection established");

            let handler = handler.clone();
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                let session = Arc::new(Session::new(peer_addr));
                if let Err(e) = handle_connection(stream, session, handler, shutdown).await {
                    warn!(peer = %peer_addr, error = %e, "Connection error");
                }
            });
        }
    }
}

/// Handle a single TCP connection
///
/// Processes pipelined commands until the peer disconnects, the handler asks
/// to close, or the server shuts down.
async fn handle_connection<F, Fut>(
    mut stream: TcpStream,
    session: Arc<Session>,
    handler: Arc<F>,
    shutdown: CancellationToken,
) -> Result<()>
where
    F: Fn(Command, Arc<Session>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (Reply, Flow)> + Send + 'static,
{
    let mut input = BytesMut::with_capacity(4096);
    let mut output = BytesMut::with_capacity(4096);
    let mut codec = RespCodec::default();

    loop {
        // Drain every complete command already buffered
        while let Some(frame) = codec.next_reply(&mut input)? {
            let (reply, flow) = match Command::try_from(frame) {
                Ok(command) => handler(command, session.clone()).await,
                Err(e) => (Reply::error(format!("ERR Protocol error: {}", e)), Flow::Close),
            };

            output.clear();
            RespCodec::encode_reply(&reply, &mut output);
            TcpTransport::send_all(&mut stream, &output).await?;

            if flow == Flow::Close {
                debug!(peer = %session.peer(), "Closing connection on request");
                return Ok(());
            }
        }

        let read = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            read = stream.read_buf(&mut input) => read
                .map_err(|e| TcpTransport::map_io_error(e, "reading command"))?,
        };

        if read == 0 {
            debug!(peer = %session.peer(), "Connection closed by peer");
            return Ok(());
        }
    }
}

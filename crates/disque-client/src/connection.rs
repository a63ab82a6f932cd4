//! Connection to a single Disque node
//!
//! Each [`Connection`] owns one TCP socket, driven by a background task. Callers
//! hand commands to the task through a channel and wait on a oneshot for the
//! reply, so many commands can be in flight at once on the same socket.
//!
//! # Lifecycle
//!
//! ```text
//! open() -> Connecting --(connect + AUTH)--> Ready --(close / error)--> Closed
//! ```
//!
//! Commands issued while connecting are queued and written, in order, as soon
//! as the socket is ready. Replies are matched to callers strictly in the order
//! the commands were written.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use disque_common::protocol::error::{DisqueError, Result};
use disque_common::protocol::{Command, Reply};
use disque_common::transport::{RespCodec, TcpTransport};

use crate::config::ConnectionConfig;

type Responder = oneshot::Sender<Result<Reply>>;

/// Observable state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket being opened or `AUTH` in progress
    Connecting,
    /// Commands are written as soon as they arrive
    Ready,
    /// No further commands will be accepted
    Closed,
}

enum Message {
    Command(Command, Responder),
    Close(oneshot::Sender<()>),
}

/// Pipelined connection to one Disque node.
///
/// # Example
///
/// ```no_run
/// use disque_client::{Connection, ConnectionConfig};
/// use disque_common::Command;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let conn = Connection::open("127.0.0.1:7711", &ConnectionConfig::default());
/// let reply = conn.send(Command::new("PING")).await?;
/// assert_eq!(reply.as_str(), Some("PONG"));
/// conn.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Connection {
    addr: String,
    tx: mpsc::UnboundedSender<Message>,
    state: watch::Receiver<ConnectionState>,
    request_timeout: Duration,
}

impl Connection {
    /// Starts connecting to `addr` in the background and returns immediately.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(addr: impl Into<String>, config: &ConnectionConfig) -> Self {
        let addr = addr.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        tokio::spawn(run(addr.clone(), config.clone(), rx, state_tx));

        Self {
            addr,
            tx,
            state: state_rx,
            request_timeout: config.request_timeout,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed || self.tx.is_closed()
    }

    /// Sends a command and waits for its reply.
    ///
    /// # Errors
    ///
    /// - `Command` if the node answered with an error reply
    /// - `Auth` if the connection's `AUTH` was rejected
    /// - `Protocol` or `Connection` if the connection failed while waiting
    /// - `Cancelled` if the connection was closed while waiting
    /// - `Timeout` if no reply arrived within the request timeout
    pub async fn send(&self, command: Command) -> Result<Reply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Message::Command(command, reply_tx))
            .map_err(|_| DisqueError::Connection(format!("connection to {} is closed", self.addr)))?;

        match tokio::time::timeout(self.request_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(DisqueError::Connection(format!(
                "connection to {} dropped the request",
                self.addr
            ))),
            Err(_) => Err(DisqueError::Timeout(self.request_timeout.as_millis() as u64)),
        }
    }

    /// Closes the connection.
    ///
    /// Sends `QUIT` if the socket is ready, then releases it. Every caller
    /// still waiting for a reply fails with `Cancelled`. Calling `close` on a
    /// closed connection does nothing.
    pub async fn close(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Message::Close(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }
}

/// Why the connection task stopped.
enum Exit {
    /// Closed on request, with the caller to acknowledge
    Closed(Option<oneshot::Sender<()>>),
    /// Unrecoverable failure shared by every outstanding caller
    Failed(DisqueError),
}

async fn run(
    addr: String,
    config: ConnectionConfig,
    mut rx: mpsc::UnboundedReceiver<Message>,
    state: watch::Sender<ConnectionState>,
) {
    let mut queued: VecDeque<(Command, Responder)> = VecDeque::new();

    let establish = establish(&addr, &config);
    tokio::pin!(establish);

    let established = loop {
        tokio::select! {
            result = &mut establish => break Some(result),
            message = rx.recv() => match message {
                Some(Message::Command(command, responder)) => queued.push_back((command, responder)),
                Some(Message::Close(ack)) => {
                    fail_queued(&mut queued, || DisqueError::Cancelled);
                    finish(&mut rx, &state, &Exit::Closed(None));
                    let _ = ack.send(());
                    return;
                }
                None => break None,
            },
        }
    };

    let exit = match established {
        Some(Ok((stream, input))) => {
            state.send_replace(ConnectionState::Ready);
            debug!(addr = %addr, "Connection established");
            serve(&addr, stream, input, &mut rx, queued).await
        }
        Some(Err(e)) => {
            match &e {
                DisqueError::Auth(reason) => warn!(addr = %addr, reason = %reason, "Authentication failed"),
                other => debug!(addr = %addr, error = %other, "Connection failed"),
            }
            fail_queued(&mut queued, || fan_out(&e));
            Exit::Failed(e)
        }
        None => {
            fail_queued(&mut queued, || DisqueError::Cancelled);
            Exit::Closed(None)
        }
    };

    finish(&mut rx, &state, &exit);
    if let Exit::Closed(Some(ack)) = exit {
        let _ = ack.send(());
    }
}

/// Opens the socket and performs `AUTH` if a secret is configured.
///
/// Returns the stream together with any bytes read past the `AUTH` reply.
async fn establish(addr: &str, config: &ConnectionConfig) -> Result<(TcpStream, BytesMut)> {
    let mut stream = TcpTransport::new(config.connect_timeout).connect(addr).await?;
    let mut input = BytesMut::with_capacity(4096);

    if let Some(auth) = config.auth.auth_command() {
        let mut output = BytesMut::new();
        RespCodec::encode_command(&auth, &mut output);
        TcpTransport::send_all(&mut stream, &output).await?;

        let reply = tokio::time::timeout(config.request_timeout, read_reply(&mut stream, &mut input))
            .await
            .map_err(|_| DisqueError::Timeout(config.request_timeout.as_millis() as u64))??;

        if let Reply::Error(text) = reply {
            return Err(DisqueError::Auth(text));
        }
    }

    Ok((stream, input))
}

async fn read_reply(stream: &mut TcpStream, input: &mut BytesMut) -> Result<Reply> {
    loop {
        if let Some(reply) = RespCodec::decode_reply(input)? {
            return Ok(reply);
        }
        let read = stream
            .read_buf(input)
            .await
            .map_err(|e| TcpTransport::map_io_error(e, "reading reply"))?;
        if read == 0 {
            return Err(DisqueError::Connection("connection closed by peer".to_string()));
        }
    }
}

/// Main loop of a ready connection.
async fn serve(
    addr: &str,
    stream: TcpStream,
    mut input: BytesMut,
    rx: &mut mpsc::UnboundedReceiver<Message>,
    queued: VecDeque<(Command, Responder)>,
) -> Exit {
    let (mut reader, mut writer) = stream.into_split();
    let mut pending: VecDeque<Responder> = VecDeque::new();
    let mut output = BytesMut::with_capacity(4096);
    let mut codec = RespCodec::default();

    // Flush everything queued while connecting as one pipelined write
    for (command, responder) in queued {
        RespCodec::encode_command(&command, &mut output);
        pending.push_back(responder);
    }
    if !output.is_empty() {
        if let Err(e) = TcpTransport::send_all(&mut writer, &output).await {
            return fail_pending(&mut pending, e);
        }
    }

    loop {
        if let Err(e) = dispatch_replies(&mut codec, &mut input, &mut pending) {
            warn!(addr = %addr, error = %e, "Protocol violation, closing connection");
            return fail_pending(&mut pending, e);
        }

        tokio::select! {
            message = rx.recv() => match message {
                Some(Message::Command(command, responder)) => {
                    output.clear();
                    RespCodec::encode_command(&command, &mut output);
                    pending.push_back(responder);
                    if let Err(e) = TcpTransport::send_all(&mut writer, &output).await {
                        return fail_pending(&mut pending, e);
                    }
                }
                Some(Message::Close(ack)) => {
                    quit(&mut writer).await;
                    fail_responders(&mut pending, || DisqueError::Cancelled);
                    debug!(addr = %addr, "Connection closed");
                    return Exit::Closed(Some(ack));
                }
                None => {
                    quit(&mut writer).await;
                    fail_responders(&mut pending, || DisqueError::Cancelled);
                    return Exit::Closed(None);
                }
            },
            read = read_more(&mut reader, &mut input) => {
                if let Err(e) = read {
                    debug!(addr = %addr, error = %e, "Connection lost");
                    return fail_pending(&mut pending, e);
                }
            }
        }
    }
}

async fn read_more(reader: &mut OwnedReadHalf, input: &mut BytesMut) -> Result<()> {
    let read = reader
        .read_buf(input)
        .await
        .map_err(|e| TcpTransport::map_io_error(e, "reading reply"))?;
    if read == 0 {
        return Err(DisqueError::Connection("connection closed by peer".to_string()));
    }
    Ok(())
}

/// Resolves the head of the pending queue with every complete reply buffered.
fn dispatch_replies(codec: &mut RespCodec, input: &mut BytesMut, pending: &mut VecDeque<Responder>) -> Result<()> {
    while let Some(reply) = codec.next_reply(input)? {
        match pending.pop_front() {
            // The caller may have timed out and gone away
            Some(responder) => {
                let _ = responder.send(reply.into_result());
            }
            None => {
                return Err(DisqueError::Protocol(format!(
                    "unsolicited {} reply with no pending command",
                    reply.kind()
                )));
            }
        }
    }
    Ok(())
}

async fn quit(writer: &mut OwnedWriteHalf) {
    let mut output = BytesMut::new();
    RespCodec::encode_command(&Command::new("QUIT"), &mut output);
    let _ = TcpTransport::send_all(writer, &output).await;
}

fn fail_pending(pending: &mut VecDeque<Responder>, error: DisqueError) -> Exit {
    fail_responders(pending, || fan_out(&error));
    Exit::Failed(error)
}

fn fail_responders(pending: &mut VecDeque<Responder>, error: impl Fn() -> DisqueError) {
    for responder in pending.drain(..) {
        let _ = responder.send(Err(error()));
    }
}

fn fail_queued(queued: &mut VecDeque<(Command, Responder)>, error: impl Fn() -> DisqueError) {
    for (_, responder) in queued.drain(..) {
        let _ = responder.send(Err(error()));
    }
}

/// Marks the connection closed and fails whatever is still in the channel.
fn finish(rx: &mut mpsc::UnboundedReceiver<Message>, state: &watch::Sender<ConnectionState>, exit: &Exit) {
    state.send_replace(ConnectionState::Closed);
    rx.close();
    while let Ok(message) = rx.try_recv() {
        match message {
            Message::Command(_, responder) => {
                let error = match exit {
                    Exit::Closed(_) => DisqueError::Cancelled,
                    Exit::Failed(e) => fan_out(e),
                };
                let _ = responder.send(Err(error));
            }
            Message::Close(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

/// Copies a connection-wide failure for each caller it affects.
fn fan_out(error: &DisqueError) -> DisqueError {
    match error {
        DisqueError::Protocol(s) => DisqueError::Protocol(s.clone()),
        DisqueError::Auth(s) => DisqueError::Auth(s.clone()),
        DisqueError::Timeout(ms) => DisqueError::Timeout(*ms),
        DisqueError::Cancelled => DisqueError::Cancelled,
        other => DisqueError::Connection(other.to_string()),
    }
}

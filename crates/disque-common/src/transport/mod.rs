//! Disque Transport Layer
//!
//! This module provides the RESP codec and the TCP plumbing used to talk to
//! Disque nodes.
//!
//! # Architecture
//!
//! - **Transport**: plain TCP, one socket per node connection
//! - **Codec**: RESP, commands as arrays of bulk strings
//! - **Ordering**: replies arrive in request order, so pipelined requests are
//!   matched to replies by position alone
//!
//! # Components
//!
//! - **[`RespCodec`]**: Encode commands/replies, decode replies incrementally
//! - **[`TcpTransport`]**: Async connect with a bounded timeout
//! - **[`TcpServer`]**: Async RESP server (used by test fixtures and the mock node)
//!
//! # Example
//!
//! ```no_run
//! use bytes::BytesMut;
//! use disque_common::protocol::Command;
//! use disque_common::transport::{RespCodec, TcpTransport};
//! use tokio::io::AsyncReadExt;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut stream = TcpTransport::default().connect("127.0.0.1:7711").await?;
//!
//! let mut out = BytesMut::new();
//! RespCodec::encode_command(&Command::new("PING"), &mut out);
//! TcpTransport::send_all(&mut stream, &out).await?;
//!
//! let mut input = BytesMut::new();
//! loop {
//!     stream.read_buf(&mut input).await?;
//!     if let Some(reply) = RespCodec::decode_reply(&mut input)? {
//!         println!("{:?}", reply);
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod tcp;
pub mod tcp_server;

pub use codec::RespCodec;
pub use tcp::{TcpTransport, DEFAULT_CONNECT_TIMEOUT};
pub use tcp_server::{Flow, Session, TcpServer};

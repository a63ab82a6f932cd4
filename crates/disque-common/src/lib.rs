//! Disque Common Types and Transport
//!
//! This crate provides the protocol definitions and the TCP transport layer
//! shared by the Disque client crates.
//!
//! # Overview
//!
//! Disque is a distributed, in-memory job queue. Nodes speak RESP, the
//! Redis serialization protocol, over plain TCP. This crate contains:
//!
//! - **Protocol Layer**: [`Command`], the tagged [`Reply`] enum and the
//!   [`DisqueError`] taxonomy
//! - **Transport Layer**: the RESP codec, async TCP connect and a RESP server
//! - **Auth**: the shared-secret configuration sent with `AUTH`
//!
//! # Components
//!
//! - [`protocol`] - Command and reply types, errors
//! - [`transport`] - RESP codec, TCP transport and server
//! - [`auth`] - Shared-secret configuration
//!
//! # Example
//!
//! ```
//! use disque_common::{Command, Reply, DisqueError};
//!
//! let cmd = Command::new("GETJOB").arg("COUNT").arg(1u32).arg("FROM").arg("q1");
//! assert_eq!(cmd.args().len(), 4);
//!
//! let err = Reply::error("ERR unknown command 'FOOBAR'").into_result().unwrap_err();
//! assert!(matches!(err, DisqueError::Command(_)));
//! ```

pub mod auth;
pub mod protocol;
pub mod transport;

pub use protocol::*;

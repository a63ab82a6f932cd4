//! Cluster-aware Disque client
//!
//! Disque is a distributed job queue where every node can accept and deliver
//! jobs. Jobs are fastest to consume on the node that produced them, and each
//! job id carries the first eight characters of that node's id. This crate
//! uses that prefix to route consumption to the producing node.
//!
//! # Overview
//!
//! - [`Connection`] - one pipelined socket per node, with `AUTH` and strict
//!   FIFO reply matching
//! - [`TopologyTable`] - nodes discovered by `HELLO`
//! - [`Router`] - picks the node for every command and tracks producers
//! - [`Client`] - the public API: `call`, `addjob`, `getjob`, `ackjob`, ...
//!
//! # Example
//!
//! ```no_run
//! use disque_client::{Client, ClientConfig, AddJobOptions, GetJobOptions};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::connect(ClientConfig::parse("127.0.0.1:7711").with_cycle(100)).await?;
//!
//! client.addjob("q1", "payload", 0, &AddJobOptions::new().maxlen(1000)).await?;
//! for job in client.getjob(&["q1"], &GetJobOptions::new().count(10)).await? {
//!     println!("{} {}", job.id, job.body_str().unwrap_or("<binary>"));
//!     client.ackjob(&[job.id.as_str()]).await?;
//! }
//!
//! client.quit().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod info;
pub mod job;
pub mod router;
pub mod topology;

pub use client::Client;
pub use config::{ClientConfig, ConnectionConfig, DiscoveryPolicy, DEFAULT_CYCLE, DEFAULT_REQUEST_TIMEOUT};
pub use connection::{Connection, ConnectionState};
pub use info::parse_info;
pub use job::{job_prefix, AddJobOptions, GetJobOptions, Job};
pub use router::{Router, RoutingState};
pub use topology::{node_prefix, Hello, NodeDescriptor, TopologyTable, PREFIX_LEN};

pub use disque_common::{DisqueError, Reply, Result};

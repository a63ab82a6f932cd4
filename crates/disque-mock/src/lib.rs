//! Mock Disque Cluster
//!
//! In-process Disque nodes for tests and local experiments. A
//! [`MockCluster`] binds a set of RESP servers that behave like a small
//! Disque cluster: every node has an id, answers `HELLO` with the full node
//! list, and stamps the jobs it produces with its id prefix. Consumption on a
//! node with an empty queue pulls jobs produced elsewhere.
//!
//! Queue semantics are limited to what a client can observe over a short
//! test: there is no replication, persistence, retry or TTL handling.

pub mod cluster;
pub mod node;
pub mod store;

pub use cluster::{MockCluster, MockOptions};
pub use node::MockNode;
pub use store::JobStore;

//! Cluster topology discovered through `HELLO`
//!
//! A Disque node answers `HELLO` with its own id and the nodes it knows about:
//!
//! ```text
//! [version, my-id, [id, host, port, priority], [id, host, port, priority], ...]
//! ```
//!
//! The [`TopologyTable`] stores the last such answer. It is only a hint source
//! for routing; nothing fails when it is empty or stale.

use serde::Serialize;

use disque_common::protocol::error::{DisqueError, Result};
use disque_common::protocol::{Command, Reply};

use crate::connection::Connection;

/// Length of the node id prefix embedded in job ids.
pub const PREFIX_LEN: usize = 8;

/// Returns the first [`PREFIX_LEN`] characters of a node id, or the whole id
/// if it is shorter.
pub fn node_prefix(id: &str) -> &str {
    id.char_indices()
        .nth(PREFIX_LEN)
        .map(|(end, _)| &id[..end])
        .unwrap_or(id)
}

/// A node advertised by `HELLO`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeDescriptor {
    /// Full node id
    pub id: String,
    /// `host:port`
    pub address: String,
    /// Lower is preferred
    pub priority: i64,
}

impl NodeDescriptor {
    pub fn prefix(&self) -> &str {
        node_prefix(&self.id)
    }

    fn from_entry(entry: Reply) -> Result<Self> {
        let fields = entry
            .into_array()
            .ok_or_else(|| DisqueError::InvalidResponse("HELLO node entry is not an array".to_string()))?;
        if fields.len() < 4 {
            return Err(DisqueError::InvalidResponse(format!(
                "HELLO node entry has {} fields, expected at least 4",
                fields.len()
            )));
        }

        let mut fields = fields.into_iter();
        let id = next_string(&mut fields)?;
        let host = next_string(&mut fields)?;
        let port = next_integer(&mut fields)?;
        let priority = next_integer(&mut fields)?;

        Ok(Self {
            id,
            address: format!("{}:{}", host, port),
            priority,
        })
    }
}

/// Parsed `HELLO` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hello {
    pub version: i64,
    /// Id of the node that answered
    pub node_id: String,
    /// Every node the answering node knows, itself included
    pub nodes: Vec<NodeDescriptor>,
}

impl Hello {
    /// Issues one `HELLO` on `conn` and parses the reply.
    pub async fn fetch(conn: &Connection) -> Result<Self> {
        Self::try_from(conn.send(Command::new("HELLO")).await?)
    }

    /// Prefix of the answering node's id.
    pub fn prefix(&self) -> &str {
        node_prefix(&self.node_id)
    }
}

impl TryFrom<Reply> for Hello {
    type Error = DisqueError;

    fn try_from(reply: Reply) -> Result<Self> {
        let items = reply
            .into_array()
            .ok_or_else(|| DisqueError::InvalidResponse("HELLO reply is not an array".to_string()))?;
        if items.len() < 2 {
            return Err(DisqueError::InvalidResponse("HELLO reply is too short".to_string()));
        }

        let mut items = items.into_iter();
        let version = next_integer(&mut items)?;
        let node_id = next_string(&mut items)?;
        let nodes = items.map(NodeDescriptor::from_entry).collect::<Result<Vec<_>>>()?;

        Ok(Self {
            version,
            node_id,
            nodes,
        })
    }
}

fn next_string(fields: &mut impl Iterator<Item = Reply>) -> Result<String> {
    fields
        .next()
        .ok_or_else(|| DisqueError::InvalidResponse("missing HELLO field".to_string()))?
        .into_string()
}

fn next_integer(fields: &mut impl Iterator<Item = Reply>) -> Result<i64> {
    fields
        .next()
        .ok_or_else(|| DisqueError::InvalidResponse("missing HELLO field".to_string()))?
        .into_integer()
}

/// Table of known nodes, replaced wholesale on every refresh.
///
/// Nodes keep the order in which `HELLO` listed them, so among nodes of equal
/// priority the first discovered one wins.
#[derive(Debug, Clone, Default)]
pub struct TopologyTable {
    nodes: Vec<NodeDescriptor>,
}

impl TopologyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the table with the nodes from a `HELLO` reply.
    pub fn refresh(&mut self, hello: &Hello) -> &[NodeDescriptor] {
        self.nodes = hello.nodes.clone();
        &self.nodes
    }

    /// Finds the node whose id starts with `prefix`.
    ///
    /// Only the first [`PREFIX_LEN`] characters of `prefix` are compared.
    pub fn lookup(&self, prefix: &str) -> Option<&NodeDescriptor> {
        let prefix = node_prefix(prefix);
        if prefix.is_empty() {
            return None;
        }
        self.nodes.iter().find(|n| n.prefix() == prefix)
    }

    /// Nodes ordered by priority, ties kept in discovery order.
    pub fn by_priority(&self) -> Vec<&NodeDescriptor> {
        let mut nodes: Vec<_> = self.nodes.iter().collect();
        nodes.sort_by_key(|n| n.priority);
        nodes
    }

    /// Nodes whose prefix is one of `prefixes`, ordered as [`by_priority`](Self::by_priority).
    pub fn ranked<S: AsRef<str>>(&self, prefixes: &[S]) -> Vec<&NodeDescriptor> {
        self.by_priority()
            .into_iter()
            .filter(|n| prefixes.iter().any(|p| p.as_ref() == n.prefix()))
            .collect()
    }

    pub fn nodes(&self) -> &[NodeDescriptor] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

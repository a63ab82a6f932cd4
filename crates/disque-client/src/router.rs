//! Routing of commands across Disque nodes
//!
//! The [`Router`] owns every [`Connection`] a client has opened, the
//! [`TopologyTable`] and the [`RoutingState`]. It decides which node each
//! command goes to:
//!
//! - Commands without locality (`PING`, `INFO`, passthrough calls) go to the
//!   active node: the first seed that answered, or the node routing switched
//!   to.
//! - `ADDJOB` goes to the active node. The id prefix of the new job is
//!   remembered as the producer hint for its queue.
//! - `GETJOB` is first tried with `NOHANG` on the hinted producer node, when
//!   one is known and may be contacted, then on the active node.
//!
//! Every `cycle` consumption round-trips the router re-reads the topology and
//! switches the active node to the one that produced most of the jobs
//! consumed since the last switch, if it may be contacted. Producers tied on
//! count are ranked by node priority, then discovery order.
//!
//! Once [`Router::close_all`] ran, no connection is opened again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use disque_common::protocol::error::{DisqueError, Result};
use disque_common::protocol::{Command, Reply};

use crate::config::{ClientConfig, ConnectionConfig, DiscoveryPolicy};
use crate::connection::Connection;
use crate::job::{job_prefix, GetJobOptions, Job};
use crate::topology::{node_prefix, Hello, NodeDescriptor, TopologyTable};

/// Node that commands without locality are sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ActiveNode {
    address: String,
    node_id: Option<String>,
}

/// Routing decisions of one client.
///
/// Plain data with no I/O; the [`Router`] mutates it under a lock and never
/// holds that lock across a network round-trip.
#[derive(Debug, Clone)]
pub struct RoutingState {
    cycle: u32,
    origin: ActiveNode,
    active: ActiveNode,
    preferred: Option<String>,
    hints: HashMap<String, String>,
    /// Prefix of consumed job ids and how often each was seen, in first-seen order
    stats: Vec<(String, u64)>,
    rounds: u32,
}

impl RoutingState {
    /// Creates an empty state whose active node is `address`.
    pub fn new(address: &str, cycle: u32) -> Self {
        let node = ActiveNode {
            address: address.to_string(),
            node_id: None,
        };
        Self {
            cycle,
            origin: node.clone(),
            active: node,
            preferred: None,
            hints: HashMap::new(),
            stats: Vec::new(),
            rounds: 0,
        }
    }

    /// Marks `address` as the confirmed reachable node to fall back to.
    pub fn confirm(&mut self, address: &str, node_id: Option<String>) {
        let node = ActiveNode {
            address: address.to_string(),
            node_id,
        };
        self.origin = node.clone();
        self.active = node;
    }

    /// Makes the node `node_id` at `address` the active node.
    pub fn switch_to(&mut self, address: &str, node_id: &str) {
        self.preferred = Some(node_prefix(node_id).to_string());
        self.active = ActiveNode {
            address: address.to_string(),
            node_id: Some(node_id.to_string()),
        };
    }

    pub fn active_address(&self) -> &str {
        &self.active.address
    }

    /// Prefix of the active node's id, once known.
    pub fn active_prefix(&self) -> Option<&str> {
        self.active.node_id.as_deref().map(node_prefix)
    }

    /// Prefix of the node routing switched to, if it switched.
    pub fn preferred(&self) -> Option<&str> {
        self.preferred.as_deref()
    }

    /// Remembers which node produced the latest job on `queue`.
    pub fn record_submission(&mut self, queue: &str, job_id: &str) {
        if let Some(prefix) = job_prefix(job_id) {
            self.hints.insert(queue.to_string(), prefix.to_string());
        }
    }

    /// Producer hint of the first queue that has one.
    pub fn hint_for<S: AsRef<str>>(&self, queues: &[S]) -> Option<&str> {
        queues
            .iter()
            .find_map(|q| self.hints.get(q.as_ref()))
            .map(String::as_str)
    }

    /// Counts the producers of consumed jobs.
    ///
    /// Returns `true` once every `cycle` calls, when the topology should be
    /// re-read and the active node reconsidered. Never returns `true` when
    /// `cycle` is 0.
    pub fn record_consumption(&mut self, jobs: &[Job]) -> bool {
        for prefix in jobs.iter().filter_map(Job::prefix) {
            match self.stats.iter_mut().find(|(p, _)| p == prefix) {
                Some((_, count)) => *count += 1,
                None => self.stats.push((prefix.to_string(), 1)),
            }
        }

        if self.cycle == 0 {
            return false;
        }
        self.rounds += 1;
        if self.rounds >= self.cycle {
            self.rounds = 0;
            return true;
        }
        false
    }

    /// Producers seen most often since the last reset, in first-seen order.
    pub fn leading_prefixes(&self) -> Vec<&str> {
        let max = self.stats.iter().map(|(_, count)| *count).max().unwrap_or(0);
        self.stats
            .iter()
            .filter(|(_, count)| max > 0 && *count == max)
            .map(|(prefix, _)| prefix.as_str())
            .collect()
    }

    pub fn clear_stats(&mut self) {
        self.stats.clear();
    }

    /// Forgets hints, statistics and the preferred node, and returns to the
    /// confirmed seed.
    pub fn reset(&mut self) {
        self.active = self.origin.clone();
        self.preferred = None;
        self.hints.clear();
        self.stats.clear();
        self.rounds = 0;
    }
}

/// Picks a node for every command and owns the connections to them.
pub struct Router {
    seeds: Vec<String>,
    discovery: DiscoveryPolicy,
    connection_config: ConnectionConfig,
    connections: RwLock<HashMap<String, Arc<Connection>>>,
    topology: RwLock<TopologyTable>,
    state: Mutex<RoutingState>,
    closed: AtomicBool,
}

impl Router {
    pub fn new(config: &ClientConfig) -> Self {
        let first = config.nodes.first().map(String::as_str).unwrap_or_default();
        Self {
            seeds: config.nodes.clone(),
            discovery: config.discovery,
            connection_config: config.connection.clone(),
            connections: RwLock::new(HashMap::new()),
            topology: RwLock::new(TopologyTable::new()),
            state: Mutex::new(RoutingState::new(first, config.cycle)),
            closed: AtomicBool::new(false),
        }
    }

    /// Opens a connection to every seed and makes the first one that answers
    /// `HELLO` the active node.
    ///
    /// A seed that answers `HELLO` with an error or an unexpected reply is
    /// still reachable and is used without topology.
    ///
    /// # Errors
    ///
    /// Returns the last seed's error if no seed could be reached.
    pub async fn bootstrap(&self) -> Result<()> {
        for seed in &self.seeds {
            self.connection(seed).await?;
        }

        let mut last_error = None;
        for seed in &self.seeds {
            let conn = self.connection(seed).await?;
            match Hello::fetch(&conn).await {
                Ok(hello) => {
                    self.store_topology(seed, &hello).await;
                    self.state.lock().await.confirm(seed, Some(hello.node_id));
                    return Ok(());
                }
                Err(e) if e.is_command_error() || matches!(e, DisqueError::InvalidResponse(_)) => {
                    warn!(addr = %seed, error = %e, "Node did not describe the cluster");
                    self.state.lock().await.confirm(seed, None);
                    return Ok(());
                }
                Err(e) => {
                    warn!(addr = %seed, error = %e, "Seed unreachable");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| DisqueError::InvalidConfig("no nodes configured".to_string())))
    }

    /// Whether connections to `address` may be opened.
    pub fn is_permitted(&self, address: &str) -> bool {
        match self.discovery {
            DiscoveryPolicy::Any => true,
            DiscoveryPolicy::ProvidedOnly => self.seeds.iter().any(|s| s == address),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns the connection to `address`, opening a fresh one if there is
    /// none or the previous one closed.
    ///
    /// # Errors
    ///
    /// `ClientClosed` once [`close_all`](Self::close_all) was called.
    async fn connection(&self, address: &str) -> Result<Arc<Connection>> {
        if self.is_closed() {
            return Err(DisqueError::ClientClosed);
        }
        if let Some(conn) = self.connections.read().await.get(address) {
            if !conn.is_closed() {
                return Ok(conn.clone());
            }
        }

        let mut connections = self.connections.write().await;
        // close_all sets the flag before it drains the map under this lock
        if self.is_closed() {
            return Err(DisqueError::ClientClosed);
        }
        match connections.get(address) {
            Some(conn) if !conn.is_closed() => Ok(conn.clone()),
            _ => {
                debug!(addr = %address, "Opening connection");
                let conn = Arc::new(Connection::open(address, &self.connection_config));
                connections.insert(address.to_string(), conn.clone());
                Ok(conn)
            }
        }
    }

    async fn active(&self) -> Result<Arc<Connection>> {
        let address = self.state.lock().await.active_address().to_string();
        self.connection(&address).await
    }

    /// Sends a command to the active node.
    pub async fn execute(&self, command: Command) -> Result<Reply> {
        self.active().await?.send(command).await
    }

    /// Sends an `ADDJOB` to the active node and records the producer hint.
    pub async fn submit(&self, queue: &str, command: Command) -> Result<String> {
        let id = self.execute(command).await?.into_string()?;
        self.state.lock().await.record_submission(queue, &id);
        Ok(id)
    }

    /// Fetches jobs, preferring the node that produced them.
    ///
    /// Failure of the hinted node is not an error; the active node is asked
    /// instead. Closing the router while the hinted node is being asked fails
    /// the call with `Cancelled`.
    pub async fn consume<S: AsRef<str>>(&self, queues: &[S], options: &GetJobOptions) -> Result<Vec<Job>> {
        if let Some(conn) = self.hinted(queues).await {
            let command = options.clone().nohang(true).command(queues);
            match conn.send(command).await.and_then(Job::parse_list) {
                Ok(jobs) if !jobs.is_empty() => {
                    self.observe(&jobs).await;
                    return Ok(jobs);
                }
                Ok(_) => debug!(addr = %conn.addr(), "Hinted node had no jobs, falling back"),
                Err(e @ (DisqueError::Cancelled | DisqueError::ClientClosed)) => return Err(e),
                Err(e) => debug!(addr = %conn.addr(), error = %e, "Hinted node failed, falling back"),
            }
        }

        let reply = self.execute(options.command(queues)).await?;
        let jobs = Job::parse_list(reply)?;
        self.observe(&jobs).await;
        Ok(jobs)
    }

    /// Connection to the producer hinted for `queues`, if it is known, is not
    /// the active node and may be contacted.
    async fn hinted<S: AsRef<str>>(&self, queues: &[S]) -> Option<Arc<Connection>> {
        let prefix = {
            let state = self.state.lock().await;
            let hint = state.hint_for(queues)?;
            if state.active_prefix() == Some(hint) {
                return None;
            }
            hint.to_string()
        };

        let address = self.topology.read().await.lookup(&prefix)?.address.clone();
        if !self.is_permitted(&address) {
            return None;
        }
        self.connection(&address).await.ok()
    }

    async fn observe(&self, jobs: &[Job]) {
        let due = self.state.lock().await.record_consumption(jobs);
        if due {
            self.rebalance().await;
        }
    }

    /// Re-reads the topology and switches to the busiest permitted producer.
    async fn rebalance(&self) {
        if let Err(e) = self.refresh().await {
            debug!(error = %e, "Topology refresh failed");
        }

        let mut state = self.state.lock().await;
        let leaders: Vec<String> = state.leading_prefixes().into_iter().map(str::to_string).collect();
        state.clear_stats();
        if leaders.is_empty() || state.active_prefix().is_some_and(|p| leaders.iter().any(|l| l == p)) {
            return;
        }

        let topology = self.topology.read().await;
        let ranked = topology.ranked(&leaders);
        match ranked.iter().find(|n| self.is_permitted(&n.address)) {
            Some(node) => {
                info!(addr = %node.address, prefix = %node.prefix(), "Switching to producer node");
                state.switch_to(&node.address, &node.id);
            }
            None if ranked.is_empty() => debug!(prefixes = ?leaders, "Producer node unknown, staying"),
            None => debug!(prefixes = ?leaders, "Producer node not permitted, staying"),
        }
    }

    /// Issues `HELLO` on the active node and replaces the topology with the
    /// answer.
    pub async fn refresh(&self) -> Result<Hello> {
        let conn = self.active().await?;
        let hello = Hello::fetch(&conn).await?;
        self.store_topology(conn.addr(), &hello).await;
        Ok(hello)
    }

    async fn store_topology(&self, via: &str, hello: &Hello) {
        let mut topology = self.topology.write().await;
        let nodes = topology.refresh(hello).len();
        debug!(addr = %via, nodes = nodes, "Topology refreshed");
    }

    /// Prefix of the active node's id, once known.
    pub async fn prefix(&self) -> Option<String> {
        self.state.lock().await.active_prefix().map(str::to_string)
    }

    /// Prefix of the node routing switched to, until the next reset.
    pub async fn preferred(&self) -> Option<String> {
        self.state.lock().await.preferred().map(str::to_string)
    }

    pub async fn reset(&self) {
        self.state.lock().await.reset();
    }

    /// Nodes from the last topology refresh.
    pub async fn known_nodes(&self) -> Vec<NodeDescriptor> {
        self.topology.read().await.nodes().to_vec()
    }

    /// Addresses with an open connection.
    pub async fn addresses(&self) -> Vec<String> {
        let connections = self.connections.read().await;
        let mut addresses: Vec<_> = connections
            .iter()
            .filter(|(_, conn)| !conn.is_closed())
            .map(|(addr, _)| addr.clone())
            .collect();
        addresses.sort();
        addresses
    }

    /// Closes every connection, failing pending callers with `Cancelled`.
    /// No connection is opened afterwards.
    pub async fn close_all(&self) {
        self.closed.store(true, Ordering::Release);
        let connections: Vec<_> = self.connections.write().await.drain().map(|(_, c)| c).collect();
        futures::future::join_all(connections.iter().map(|c| c.close())).await;
    }
}

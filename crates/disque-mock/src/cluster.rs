use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use disque_common::auth::AuthConfig;
use disque_common::protocol::error::Result;
use disque_common::transport::TcpServer;

use crate::node::MockNode;
use crate::store::{random_node_id, JobStore, NodeInfo};

/// How to start a [`MockCluster`].
///
/// # Default Configuration
///
/// - `nodes`: 3
/// - `host`: `127.0.0.1`
/// - `base_port`: none, every node binds an ephemeral port
/// - `auth`: disabled
/// - `describe_cluster`: true
#[derive(Debug, Clone)]
pub struct MockOptions {
    /// Number of nodes
    pub nodes: usize,
    /// Interface every node binds to
    pub host: String,
    /// Node `i` listens on `base_port + i`; ephemeral ports when `None`
    pub base_port: Option<u16>,
    /// Secret every node requires before other commands
    pub auth: AuthConfig,
    /// Answer `HELLO` with the node list; plain `OK` otherwise
    pub describe_cluster: bool,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            nodes: 3,
            host: "127.0.0.1".to_string(),
            base_port: None,
            auth: AuthConfig::disabled(),
            describe_cluster: true,
        }
    }
}

impl MockOptions {
    pub fn with_nodes(mut self, nodes: usize) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn with_base_port(mut self, port: u16) -> Self {
        self.base_port = Some(port);
        self
    }

    pub fn with_auth(mut self, secret: impl Into<String>) -> Self {
        self.auth = AuthConfig::with_secret(secret);
        self
    }

    pub fn with_describe_cluster(mut self, describe: bool) -> Self {
        self.describe_cluster = describe;
        self
    }
}

/// In-process Disque cluster for tests.
///
/// Every node is a [`TcpServer`] running on the current Tokio runtime. The
/// nodes share one [`JobStore`], so consuming from a node whose queue is empty
/// returns jobs produced on another node, carrying that node's id prefix.
///
/// The servers stop when the cluster is dropped or [`shutdown`](Self::shutdown)
/// is called.
///
/// # Example
///
/// ```no_run
/// use disque_mock::{MockCluster, MockOptions};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let cluster = MockCluster::start(MockOptions::default()).await?;
/// println!("nodes: {}", cluster.addresses().join(","));
/// # Ok(())
/// # }
/// ```
pub struct MockCluster {
    store: Arc<Mutex<JobStore>>,
    addresses: Vec<String>,
    ids: Vec<String>,
    shutdown: CancellationToken,
}

impl MockCluster {
    /// Binds every node and starts serving.
    ///
    /// # Errors
    ///
    /// `Connection` if a node cannot bind its port.
    pub async fn start(options: MockOptions) -> Result<Self> {
        let mut servers = Vec::with_capacity(options.nodes);
        for i in 0..options.nodes {
            let port = options.base_port.map_or(0, |base| base + i as u16);
            servers.push(TcpServer::new(&format!("{}:{}", options.host, port)).await?);
        }

        let mut infos = Vec::with_capacity(servers.len());
        for server in &servers {
            infos.push(NodeInfo::new(random_node_id(), server.local_addr()?.to_string()));
        }
        let addresses: Vec<_> = infos.iter().map(|n| n.address.clone()).collect();
        let ids: Vec<_> = infos.iter().map(|n| n.id.clone()).collect();
        let store = Arc::new(Mutex::new(JobStore::new(infos)));
        let shutdown = CancellationToken::new();

        for (index, server) in servers.into_iter().enumerate() {
            let node = Arc::new(MockNode::new(
                index,
                store.clone(),
                options.auth.clone(),
                options.describe_cluster,
            ));
            let token = server.shutdown_token();
            let cluster_shutdown = shutdown.clone();
            tokio::spawn(async move {
                cluster_shutdown.cancelled().await;
                token.cancel();
            });

            let address = addresses[index].clone();
            tokio::spawn(async move {
                let result = server
                    .run_with_handler(move |command, session| {
                        let node = node.clone();
                        async move { node.handle(command, session).await }
                    })
                    .await;
                if let Err(e) = result {
                    warn!(addr = %address, error = %e, "Mock node stopped");
                }
            });
        }

        info!(nodes = addresses.len(), "Mock cluster started");
        Ok(Self {
            store,
            addresses,
            ids,
            shutdown,
        })
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn address(&self, index: usize) -> &str {
        &self.addresses[index]
    }

    pub fn node_id(&self, index: usize) -> &str {
        &self.ids[index]
    }

    /// First eight characters of a node's id, as carried by its job ids.
    pub fn prefix(&self, index: usize) -> &str {
        &self.ids[index][..8]
    }

    /// Secrets node `index` received with `AUTH`, in order.
    pub async fn auth_attempts(&self, index: usize) -> Vec<String> {
        self.store.lock().await.node(index).auth_attempts.clone()
    }

    /// Number of jobs node `index` holds.
    pub async fn registered_jobs(&self, index: usize) -> usize {
        self.store.lock().await.registered(index)
    }

    /// Stops every node and closes their connections.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Waits until [`shutdown`](Self::shutdown) is called.
    pub async fn stopped(&self) {
        self.shutdown.cancelled().await;
    }
}

impl Drop for MockCluster {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

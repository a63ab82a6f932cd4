use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use disque_common::protocol::error::{DisqueError, Result};
use disque_common::protocol::{Command, Reply, ToArg};
use tracing::debug;

use crate::config::ClientConfig;
use crate::info::parse_info;
use crate::job::{AddJobOptions, GetJobOptions, Job};
use crate::router::Router;
use crate::topology::{Hello, NodeDescriptor};

/// Cluster-aware Disque client.
///
/// Holds one connection per node it talks to and routes each command through
/// a [`Router`]: job consumption follows the nodes that produced the jobs,
/// everything else goes to the active node.
///
/// All methods take `&self`; a client can be shared between tasks behind an
/// `Arc`.
///
/// # Example
///
/// ```no_run
/// use disque_client::{Client, ClientConfig, GetJobOptions, AddJobOptions};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = Client::connect(ClientConfig::parse("127.0.0.1:7711,127.0.0.1:7712")).await?;
///
/// let id = client.addjob("emails", "hello", 0, &AddJobOptions::default()).await?;
/// let jobs = client.getjob(&["emails"], &GetJobOptions::new().count(1)).await?;
/// assert_eq!(jobs[0].id, id);
///
/// client.ackjob(&[id.as_str()]).await?;
/// client.quit().await;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    router: Router,
    closed: AtomicBool,
}

impl Client {
    /// Connects to the configured seed nodes.
    ///
    /// The first seed that answers becomes the active node and its `HELLO`
    /// reply seeds the topology.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` if the configuration does not validate
    /// - The last seed's error if no seed could be reached
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let router = Router::new(&config);
        if let Err(e) = router.bootstrap().await {
            router.close_all().await;
            return Err(e);
        }

        debug!(nodes = ?config.nodes, "Client connected");
        Ok(Self {
            router,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DisqueError::ClientClosed);
        }
        Ok(())
    }

    /// Sends an arbitrary command to the active node.
    ///
    /// # Arguments
    ///
    /// * `name` - Command name, e.g. `"DEBUG"`
    /// * `args` - Command arguments; use [`execute`](Self::execute) for
    ///   binary arguments
    ///
    /// # Returns
    ///
    /// The reply as sent by the node. Error replies become
    /// [`DisqueError::Command`].
    pub async fn call(&self, name: &str, args: &[&str]) -> Result<Reply> {
        self.execute(Command::new(name).args_from(args.iter().copied())).await
    }

    /// Sends a prepared command to the active node.
    pub async fn execute(&self, command: Command) -> Result<Reply> {
        self.ensure_open()?;
        self.router.execute(command).await
    }

    pub async fn ping(&self) -> Result<String> {
        self.execute(Command::new("PING")).await?.into_string()
    }

    /// Fetches `INFO` from the active node as a field map.
    pub async fn info(&self) -> Result<HashMap<String, String>> {
        let text = self.execute(Command::new("INFO")).await?.into_string()?;
        Ok(parse_info(&text))
    }

    /// Issues `HELLO` on the active node and refreshes the topology with it.
    pub async fn hello(&self) -> Result<Hello> {
        self.ensure_open()?;
        self.router.refresh().await
    }

    /// Adds a job to `queue` and returns its id.
    ///
    /// # Arguments
    ///
    /// * `queue` - Queue name
    /// * `body` - Job payload
    /// * `timeout_ms` - How long the node may wait for replication, 0 for
    ///   the server default
    /// * `options` - `REPLICATE`, `DELAY`, `RETRY`, `TTL`, `MAXLEN`, `ASYNC`
    ///
    /// # Errors
    ///
    /// `Command` when the node refuses the job, e.g. because `MAXLEN` is
    /// exceeded.
    pub async fn addjob(
        &self,
        queue: &str,
        body: impl ToArg,
        timeout_ms: u64,
        options: &AddJobOptions,
    ) -> Result<String> {
        self.ensure_open()?;
        self.router
            .submit(queue, options.command(queue, body, timeout_ms))
            .await
    }

    /// Fetches jobs from one or more queues.
    ///
    /// Returns an empty list when the node had nothing to deliver before its
    /// timeout.
    pub async fn getjob<S: AsRef<str>>(&self, queues: &[S], options: &GetJobOptions) -> Result<Vec<Job>> {
        self.ensure_open()?;
        if queues.is_empty() {
            return Err(DisqueError::InvalidConfig("GETJOB needs at least one queue".to_string()));
        }
        self.router.consume(queues, options).await
    }

    /// Acknowledges jobs and returns how many the node knew about.
    pub async fn ackjob<S: AsRef<str>>(&self, ids: &[S]) -> Result<i64> {
        self.id_command("ACKJOB", ids).await
    }

    /// Acknowledges jobs without cluster-wide confirmation.
    pub async fn fastack<S: AsRef<str>>(&self, ids: &[S]) -> Result<i64> {
        self.id_command("FASTACK", ids).await
    }

    /// Puts jobs back in their queues as soon as possible.
    pub async fn nack<S: AsRef<str>>(&self, ids: &[S]) -> Result<i64> {
        self.id_command("NACK", ids).await
    }

    async fn id_command<S: AsRef<str>>(&self, name: &str, ids: &[S]) -> Result<i64> {
        let command = Command::new(name).args_from(ids.iter().map(|id| id.as_ref()));
        self.execute(command).await?.into_integer()
    }

    pub async fn qlen(&self, queue: &str) -> Result<i64> {
        self.execute(Command::new("QLEN").arg(queue)).await?.into_integer()
    }

    /// Describes a job, or `None` if the node does not know it.
    pub async fn show(&self, id: &str) -> Result<Option<Reply>> {
        let reply = self.execute(Command::new("SHOW").arg(id)).await?;
        Ok(if reply.is_nil() { None } else { Some(reply) })
    }

    /// Prefix of the active node's id, once known.
    pub async fn prefix(&self) -> Option<String> {
        self.router.prefix().await
    }

    /// Nodes from the last topology refresh.
    pub async fn nodes(&self) -> Vec<NodeDescriptor> {
        self.router.known_nodes().await
    }

    /// Addresses this client has open connections to.
    pub async fn connected_addresses(&self) -> Vec<String> {
        self.router.addresses().await
    }

    /// Prefix of the producer node consumption switched to, if any.
    pub async fn preferred(&self) -> Option<String> {
        self.router.preferred().await
    }

    /// Forgets producer hints and statistics and returns to the seed that
    /// answered first.
    pub async fn reset_routing(&self) {
        self.router.reset().await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes every connection.
    ///
    /// Commands still waiting for a reply fail with `Cancelled`. Every later
    /// call fails with `ClientClosed`. Calling `quit` twice does nothing.
    pub async fn quit(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.router.close_all().await;
        debug!("Client closed");
    }
}

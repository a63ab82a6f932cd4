use std::time::Duration;

use disque_common::auth::AuthConfig;
use disque_common::protocol::error::{DisqueError, Result};
use disque_common::transport::DEFAULT_CONNECT_TIMEOUT;

/// Default number of consumption round-trips between topology refreshes.
pub const DEFAULT_CYCLE: u32 = 1000;

/// Default time to wait for a single reply.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Which discovered nodes the client may open connections to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryPolicy {
    /// Only the seed addresses the client was configured with. Other
    /// advertised nodes are recorded for identification but never contacted.
    #[default]
    ProvidedOnly,
    /// Any node advertised by a seed's `HELLO` reply.
    Any,
}

/// Settings for a single node connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Secret sent with `AUTH` before any other command
    pub auth: AuthConfig,
    /// Maximum time to establish the TCP connection
    pub connect_timeout: Duration,
    /// Maximum time to wait for each reply
    pub request_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            auth: AuthConfig::disabled(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Client configuration.
///
/// # Default Configuration
///
/// - `nodes`: empty (must be set)
/// - `cycle`: 1000 consumption round-trips between topology refreshes
/// - `discovery`: [`DiscoveryPolicy::ProvidedOnly`]
/// - `connection`: no auth, 5 s connect timeout, 30 s request timeout
///
/// # Example
///
/// ```rust
/// use disque_client::{ClientConfig, DiscoveryPolicy};
/// use std::time::Duration;
///
/// let config = ClientConfig::parse("127.0.0.1:7711,127.0.0.1:7712")
///     .with_cycle(5)
///     .with_auth("foobar")
///     .with_request_timeout(Duration::from_secs(2))
///     .with_discovery(DiscoveryPolicy::Any);
///
/// assert_eq!(config.nodes.len(), 2);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Seed addresses (`host:port`), in preference order
    pub nodes: Vec<String>,
    /// Consumption round-trips between topology refreshes; 0 never switches nodes
    pub cycle: u32,
    /// Which discovered nodes may be contacted
    pub discovery: DiscoveryPolicy,
    /// Per-connection settings
    pub connection: ConnectionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            cycle: DEFAULT_CYCLE,
            discovery: DiscoveryPolicy::default(),
            connection: ConnectionConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Creates a configuration from a list of seed addresses.
    ///
    /// Each element may itself be a comma-separated list, so
    /// `["a:1,b:2"]` and `["a:1", "b:2"]` are equivalent. Blank entries are
    /// dropped.
    pub fn new<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let nodes = nodes
            .into_iter()
            .flat_map(|n| split_nodes(n.as_ref()))
            .collect();
        Self {
            nodes,
            ..Self::default()
        }
    }

    /// Creates a configuration from a comma-separated address list.
    pub fn parse(nodes: &str) -> Self {
        Self::new([nodes])
    }

    pub fn with_cycle(mut self, cycle: u32) -> Self {
        self.cycle = cycle;
        self
    }

    pub fn with_auth(mut self, secret: impl Into<String>) -> Self {
        self.connection.auth = AuthConfig::with_secret(secret);
        self
    }

    pub fn with_auth_config(mut self, auth: AuthConfig) -> Self {
        self.connection.auth = auth;
        self
    }

    pub fn with_discovery(mut self, discovery: DiscoveryPolicy) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.connection.request_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connection.connect_timeout = timeout;
        self
    }

    /// Checks that at least one seed is present and every seed is `host:port`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the first offending address.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(DisqueError::InvalidConfig("no nodes configured".to_string()));
        }
        for node in &self.nodes {
            let valid = node
                .rsplit_once(':')
                .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
                .unwrap_or(false);
            if !valid {
                return Err(DisqueError::InvalidConfig(format!(
                    "invalid node address '{}', expected host:port",
                    node
                )));
            }
        }
        if self.connection.request_timeout.is_zero() {
            return Err(DisqueError::InvalidConfig("request timeout must be non-zero".to_string()));
        }
        Ok(())
    }
}

fn split_nodes(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}

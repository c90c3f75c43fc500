//! Server discovery and selection.
//!
//! A discovery keeps the list of servers offering a service and picks one per
//! call. [`ServerDiscovery`] works from a fixed list; [`RegistryDiscovery`]
//! keeps its list in sync with a heartbeat registry.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, warn};

use tinyrpc_common::protocol::registry::{parse_server_list, SERVERS_HEADER};
use tinyrpc_common::{Result, RpcError};

/// Default interval after which the registry is consulted again
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Strategy for picking a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectMode {
    /// Uniformly random choice per call
    #[default]
    Random,
    /// Cycles through the list from a random starting point
    RoundRobin,
    /// Always the same server for the same client identity
    IpHash,
}

impl SelectMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectMode::Random => "random",
            SelectMode::RoundRobin => "round_robin",
            SelectMode::IpHash => "ip_hash",
        }
    }
}

impl fmt::Display for SelectMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "random" => Ok(SelectMode::Random),
            "round_robin" => Ok(SelectMode::RoundRobin),
            "ip_hash" => Ok(SelectMode::IpHash),
            other => Err(format!("unknown select mode '{}'", other)),
        }
    }
}

/// A source of server addresses.
pub trait Discovery: Send + Sync {
    /// Fetches the server list from its source, if it has one.
    fn refresh(&self) -> impl Future<Output = Result<()>> + Send;

    /// Replaces the server list.
    fn update(&self, servers: Vec<String>) -> Result<()>;

    /// Picks one server.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::NoAvailableServer`] if the list is empty.
    fn get(&self, mode: SelectMode) -> impl Future<Output = Result<String>> + Send;

    /// Returns a copy of the whole server list.
    fn get_all(&self) -> impl Future<Output = Result<Vec<String>>> + Send;
}

struct Selection {
    servers: Vec<String>,
    index: usize,
}

/// Discovery over a list of servers supplied by the caller.
///
/// # Example
///
/// ```
/// use tinyrpc_client::{SelectMode, ServerDiscovery};
///
/// let discovery = ServerDiscovery::new(
///     vec!["127.0.0.1:8001".to_string(), "127.0.0.1:8002".to_string()],
///     "10.0.0.7",
/// );
/// let first = discovery.select(SelectMode::IpHash).unwrap();
/// assert_eq!(discovery.select(SelectMode::IpHash).unwrap(), first);
/// ```
pub struct ServerDiscovery {
    selection: Mutex<Selection>,
    identity: String,
}

impl ServerDiscovery {
    /// Creates a discovery over `servers` for the client known as `identity`.
    ///
    /// `identity` only matters to [`SelectMode::IpHash`].
    pub fn new(servers: Vec<String>, identity: impl Into<String>) -> Self {
        ServerDiscovery {
            selection: Mutex::new(Selection {
                servers,
                index: rand::rng().random_range(0..u32::MAX as usize),
            }),
            identity: identity.into(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Picks one server according to `mode`.
    pub fn select(&self, mode: SelectMode) -> Result<String> {
        let mut selection = self.selection.lock();
        let n = selection.servers.len();
        if n == 0 {
            return Err(RpcError::NoAvailableServer);
        }

        let picked = match mode {
            SelectMode::Random => rand::rng().random_range(0..n),
            SelectMode::RoundRobin => {
                let picked = selection.index % n;
                selection.index = (picked + 1) % n;
                picked
            }
            SelectMode::IpHash => crc32fast::hash(self.identity.as_bytes()) as usize % n,
        };
        Ok(selection.servers[picked].clone())
    }

    pub fn replace(&self, servers: Vec<String>) {
        self.selection.lock().servers = servers;
    }

    pub fn servers(&self) -> Vec<String> {
        self.selection.lock().servers.clone()
    }
}

impl Discovery for ServerDiscovery {
    async fn refresh(&self) -> Result<()> {
        Ok(())
    }

    fn update(&self, servers: Vec<String>) -> Result<()> {
        self.replace(servers);
        Ok(())
    }

    async fn get(&self, mode: SelectMode) -> Result<String> {
        self.select(mode)
    }

    async fn get_all(&self) -> Result<Vec<String>> {
        Ok(self.servers())
    }
}

/// Discovery backed by a heartbeat registry.
///
/// The list is fetched from the registry's `X-Tinyrpc-Servers` response
/// header, at most once per refresh interval.
pub struct RegistryDiscovery {
    servers: ServerDiscovery,
    registry_url: String,
    refresh_interval: Duration,
    last_refresh: Mutex<Option<Instant>>,
    http: reqwest::Client,
}

impl RegistryDiscovery {
    pub fn new(
        registry_url: impl Into<String>,
        identity: impl Into<String>,
        refresh_interval: Duration,
    ) -> Self {
        RegistryDiscovery {
            servers: ServerDiscovery::new(Vec::new(), identity),
            registry_url: registry_url.into(),
            refresh_interval,
            last_refresh: Mutex::new(None),
            http: reqwest::Client::new(),
        }
    }

    pub fn registry_url(&self) -> &str {
        &self.registry_url
    }

    fn is_stale(&self) -> bool {
        let last = *self.last_refresh.lock();
        last.map_or(true, |at| at.elapsed() >= self.refresh_interval)
    }

    async fn refresh_if_stale(&self) -> Result<()> {
        if self.is_stale() {
            self.refresh().await?;
        }
        Ok(())
    }
}

impl Discovery for RegistryDiscovery {
    async fn refresh(&self) -> Result<()> {
        let response = self.http.get(&self.registry_url).send().await.map_err(|e| {
            warn!("Registry {} unreachable: {}", self.registry_url, e);
            RpcError::Registry(format!("refresh from {} failed: {}", self.registry_url, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Registry(format!(
                "registry {} answered {}",
                self.registry_url, status
            )));
        }

        let servers = response
            .headers()
            .get(SERVERS_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(parse_server_list)
            .unwrap_or_default();
        debug!("Refreshed {} servers from {}", servers.len(), self.registry_url);

        self.update(servers)
    }

    fn update(&self, servers: Vec<String>) -> Result<()> {
        self.servers.replace(servers);
        *self.last_refresh.lock() = Some(Instant::now());
        Ok(())
    }

    async fn get(&self, mode: SelectMode) -> Result<String> {
        self.refresh_if_stale().await?;
        self.servers.select(mode)
    }

    async fn get_all(&self) -> Result<Vec<String>> {
        self.refresh_if_stale().await?;
        Ok(self.servers.servers())
    }
}

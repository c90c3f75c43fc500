//! Load-balanced client over a [`Discovery`].

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use tinyrpc_common::Result;

use crate::client::Client;
use crate::discovery::{Discovery, SelectMode};
use crate::options::ClientOptions;

/// A client that spreads calls over the servers of a [`Discovery`].
///
/// One connection is kept per server address and reused until it closes.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use tinyrpc_client::{BalancedClient, ClientOptions, SelectMode, ServerDiscovery};
///
/// # #[tokio::main]
/// # async fn main() -> tinyrpc_common::Result<()> {
/// let discovery = ServerDiscovery::new(
///     vec!["127.0.0.1:8001".to_string(), "127.0.0.1:8002".to_string()],
///     "client-1",
/// );
/// let client = BalancedClient::new(discovery, SelectMode::RoundRobin, ClientOptions::default());
/// let sum: i64 = client.call("Arith.Add", &(1i64, 2i64), Duration::from_secs(1)).await?;
/// client.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct BalancedClient<D> {
    discovery: D,
    mode: SelectMode,
    options: ClientOptions,
    clients: Mutex<HashMap<String, Client>>,
}

impl<D: Discovery> BalancedClient<D> {
    pub fn new(discovery: D, mode: SelectMode, options: ClientOptions) -> Self {
        BalancedClient {
            discovery,
            mode,
            options,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn discovery(&self) -> &D {
        &self.discovery
    }

    pub fn mode(&self) -> SelectMode {
        self.mode
    }

    /// Returns the cached client for `addr`, dialing a new one if the cached
    /// one is gone.
    ///
    /// The cache is not locked while dialing. When two dials to the same
    /// address race, the connection cached first wins and the other is closed.
    async fn client_for(&self, addr: &str) -> Result<Client> {
        if let Some(client) = self.cached(addr) {
            return Ok(client);
        }

        let dialed = Client::dial(addr, self.options.clone()).await?;
        let (client, spare) = {
            let mut clients = self.clients.lock();
            let live = clients.get(addr).filter(|c| !c.is_closing()).cloned();
            match live {
                Some(existing) => (existing, Some(dialed)),
                None => {
                    clients.insert(addr.to_string(), dialed.clone());
                    (dialed, None)
                }
            }
        };

        if let Some(spare) = spare {
            debug!("Closing duplicate connection to {}", addr);
            if let Err(e) = spare.close().await {
                debug!("Duplicate connection to {} already closed: {}", addr, e);
            }
        }
        Ok(client)
    }

    fn cached(&self, addr: &str) -> Option<Client> {
        let mut clients = self.clients.lock();
        match clients.get(addr).cloned() {
            Some(client) if !client.is_closing() => Some(client),
            Some(_) => {
                debug!("Replacing closed connection to {}", addr);
                clients.remove(addr);
                None
            }
            None => None,
        }
    }

    /// Picks a server and calls `service_method` on it.
    ///
    /// # Errors
    ///
    /// Returns the discovery's error if no server can be picked, otherwise
    /// whatever [`Client::call`] returns.
    pub async fn call<A, R>(&self, service_method: &str, args: &A, deadline: Duration) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let addr = self.discovery.get(self.mode).await?;
        let client = self.client_for(&addr).await?;
        client.call(service_method, args, deadline).await
    }

    /// Number of cached connections.
    pub fn connections(&self) -> usize {
        self.clients.lock().len()
    }

    /// Closes every cached connection.
    pub async fn close(&self) -> Result<()> {
        let clients: Vec<(String, Client)> = self.clients.lock().drain().collect();
        for (addr, client) in clients {
            if let Err(e) = client.close().await {
                debug!("Connection to {} already closed: {}", addr, e);
            }
        }
        Ok(())
    }
}

//! TTL table of live servers.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use tinyrpc_common::protocol::registry::DEFAULT_TTL;

/// Registry configuration.
///
/// # Fields
///
/// - `ttl` - How long a server stays listed after its last heartbeat
///   (default: 1 second)
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
    pub ttl: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { ttl: DEFAULT_TTL }
    }
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the TTL is zero.
    pub fn validate(&self) -> Result<(), String> {
        if self.ttl.is_zero() {
            return Err("ttl must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Addresses of servers that heartbeated within the TTL.
///
/// Expired entries are dropped whenever the list is read.
#[derive(Debug)]
pub struct Registry {
    servers: Mutex<HashMap<String, Instant>>,
    config: RegistryConfig,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Self {
        Registry {
            servers: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Records a heartbeat from `addr`.
    pub fn put_server(&self, addr: &str) {
        let fresh = self
            .servers
            .lock()
            .insert(addr.to_string(), Instant::now())
            .is_none();
        if fresh {
            debug!("Server {} joined", addr);
        }
    }

    /// Sorted addresses still within the TTL.
    pub fn alive_servers(&self) -> Vec<String> {
        let ttl = self.config.ttl;
        let mut servers = self.servers.lock();
        servers.retain(|addr, seen| {
            let alive = seen.elapsed() < ttl;
            if !alive {
                debug!("Server {} expired", addr);
            }
            alive
        });

        let mut alive: Vec<String> = servers.keys().cloned().collect();
        alive.sort_unstable();
        alive
    }

    /// Number of entries, expired or not.
    pub fn len(&self) -> usize {
        self.servers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

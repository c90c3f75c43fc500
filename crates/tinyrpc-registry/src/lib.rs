//! tinyrpc Registry
//!
//! A heartbeat registry: servers POST their address periodically, clients GET
//! the addresses heard from within the TTL.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tinyrpc_registry::{Registry, RegistryConfig, RegistryServer};
//!
//! # #[tokio::main]
//! # async fn main() -> tinyrpc_common::Result<()> {
//! let registry = Arc::new(Registry::new(RegistryConfig::default()));
//! RegistryServer::new(registry).run("127.0.0.1:9999").await
//! # }
//! ```

pub mod http_server;
pub mod registry;

pub use http_server::RegistryServer;
pub use registry::{Registry, RegistryConfig};

//! tinyrpc Client
//!
//! This crate provides the client side of tinyrpc.
//!
//! - **[`Client`]**: one connection, any number of concurrent calls matched to
//!   their responses by sequence number
//! - **[`Call`]**: the future of a single call
//! - **[`ServerDiscovery`]** / **[`RegistryDiscovery`]**: where the servers are
//! - **[`BalancedClient`]**: spreads calls over a discovery's servers

pub mod balanced;
pub mod call;
pub mod client;
pub mod discovery;
pub mod options;

pub use balanced::BalancedClient;
pub use call::Call;
pub use client::Client;
pub use discovery::{
    Discovery, RegistryDiscovery, SelectMode, ServerDiscovery, DEFAULT_REFRESH_INTERVAL,
};
pub use options::ClientOptions;

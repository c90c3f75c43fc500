//! tinyrpc
//!
//! A small RPC framework: typed services on the server, concurrent calls over
//! a single connection on the client, pluggable codecs in between, and
//! optional client-side load balancing fed by a heartbeat registry.
//!
//! This crate re-exports the workspace crates:
//!
//! - [`common`]: wire protocol, codecs and errors
//! - [`server`]: service registration and dispatch
//! - [`client`]: calls, discovery and balancing
//! - [`registry`]: the heartbeat registry
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tinyrpc::client::{Client, ClientOptions};
//! use tinyrpc::server::{Server, ServiceBuilder, ServiceError};
//!
//! struct Arith;
//!
//! # #[tokio::main]
//! # async fn main() -> tinyrpc::Result<()> {
//! let server = Server::new();
//! server.register(
//!     ServiceBuilder::new(Arith)
//!         .method("Add", |_arith, (a, b): (i64, i64), _ctx| async move {
//!             Ok::<_, ServiceError>(a + b)
//!         })
//!         .build(),
//! )?;
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
//! let addr = listener.local_addr()?.to_string();
//! tokio::spawn(async move { server.accept(listener).await });
//!
//! let client = Client::dial(&addr, ClientOptions::default()).await?;
//! let sum: i64 = client.call("Arith.Add", &(1i64, 2i64), Duration::from_secs(1)).await?;
//! assert_eq!(sum, 3);
//! # Ok(())
//! # }
//! ```

pub use tinyrpc_client as client;
pub use tinyrpc_common as common;
pub use tinyrpc_registry as registry;
pub use tinyrpc_server as server;

pub use tinyrpc_common::{Codec, CodecType, Result, RpcError};

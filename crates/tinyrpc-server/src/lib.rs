//! tinyrpc Server
//!
//! This crate provides service registration and the per-connection dispatch
//! engine.
//!
//! # Overview
//!
//! - **[`ServiceBuilder`]** turns an instance and a set of async handlers into
//!   a [`Service`], recording each method's argument and reply types
//! - **[`Server`]** publishes services by name and serves connections,
//!   running every request on its own task under a handle timeout
//! - **[`spawn_heartbeat`]** keeps the server listed in a registry
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tinyrpc_server::{spawn_heartbeat, Server, ServiceBuilder, ServiceError};
//!
//! #[derive(Default)]
//! struct Arith;
//!
//! # #[tokio::main]
//! # async fn main() -> tinyrpc_common::Result<()> {
//! let server = Server::new();
//! server.register(
//!     ServiceBuilder::new(Arith)
//!         .method("Add", |_arith, (a, b): (i64, i64), _ctx| async move {
//!             Ok::<_, ServiceError>(a + b)
//!         })
//!         .build(),
//! )?;
//!
//! spawn_heartbeat(
//!     "http://127.0.0.1:9999/_tinyrpc_/registry".to_string(),
//!     "127.0.0.1:8000".to_string(),
//!     Duration::from_millis(500),
//! )?;
//! server.serve("127.0.0.1:8000").await
//! # }
//! ```

pub mod config;
pub mod heartbeat;
pub mod server;
pub mod service;

pub use config::ServerConfig;
pub use heartbeat::{send_heartbeat, spawn_heartbeat};
pub use server::Server;
pub use service::{CallContext, MethodDescriptor, Service, ServiceBuilder, ServiceError};

//! HTTP Server for the Registry
//!
//! This module exposes a [`Registry`] over HTTP using axum.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tracing::{debug, info};

use tinyrpc_common::protocol::registry::{REGISTRY_PATH, SERVERS_HEADER, SERVER_HEADER};
use tinyrpc_common::RpcError;

use crate::registry::Registry;

/// HTTP front end of a [`Registry`].
///
/// This server:
/// - Answers `GET /_tinyrpc_/registry` with the alive servers in the
///   `X-Tinyrpc-Servers` header, comma-joined
/// - Records a heartbeat on `POST /_tinyrpc_/registry` carrying the
///   `X-Tinyrpc-Server` header
/// - Answers any other method on that path with 405
pub struct RegistryServer {
    registry: Arc<Registry>,
}

impl RegistryServer {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Builds the axum router.
    pub fn router(&self) -> Router {
        Router::new()
            .route(REGISTRY_PATH, get(list_servers).post(put_server))
            .with_state(self.registry.clone())
    }

    /// Binds `addr` and serves until the task is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or serving fails.
    pub async fn run(self, addr: &str) -> Result<(), RpcError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RpcError::Registry(format!("Failed to bind to {}: {}", addr, e)))?;
        self.serve(listener).await
    }

    /// Serves on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), RpcError> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| RpcError::Registry(format!("Failed to get local addr: {}", e)))?;
        info!("Registry listening on http://{}{}", local_addr, REGISTRY_PATH);

        axum::serve(listener, self.router())
            .await
            .map_err(|e| RpcError::Registry(format!("Server error: {}", e)))
    }
}

async fn list_servers(State(registry): State<Arc<Registry>>) -> impl IntoResponse {
    let servers = registry.alive_servers().join(",");
    (StatusCode::OK, [(SERVERS_HEADER, servers)])
}

async fn put_server(State(registry): State<Arc<Registry>>, headers: HeaderMap) -> impl IntoResponse {
    let addr = headers
        .get(SERVER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|addr| !addr.is_empty());

    match addr {
        Some(addr) => {
            debug!("Heartbeat from {}", addr);
            registry.put_server(addr);
            StatusCode::OK
        }
        None => StatusCode::BAD_REQUEST,
    }
}

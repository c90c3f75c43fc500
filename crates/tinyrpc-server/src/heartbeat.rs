//! Heartbeats to the registry.
//!
//! A server announces itself by POSTing its address to the registry in the
//! `X-Tinyrpc-Server` header. Registrations expire after the registry's TTL,
//! so heartbeats must be sent more often than that.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use tinyrpc_common::protocol::registry::SERVER_HEADER;
use tinyrpc_common::{Result, RpcError};

/// Sends one heartbeat for `addr` to the registry at `registry_url`.
///
/// # Errors
///
/// Returns [`RpcError::Registry`] if the request fails or the registry
/// answers with a non-success status.
pub async fn send_heartbeat(client: &reqwest::Client, registry_url: &str, addr: &str) -> Result<()> {
    let response = client
        .post(registry_url)
        .header(SERVER_HEADER, addr)
        .send()
        .await
        .map_err(|e| RpcError::Registry(format!("heartbeat to {} failed: {}", registry_url, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(RpcError::Registry(format!(
            "registry {} rejected heartbeat: {}",
            registry_url, status
        )));
    }

    debug!("Heartbeat for {} sent to {}", addr, registry_url);
    Ok(())
}

/// Sends a heartbeat now and then every `interval`.
///
/// The task stops at the first failed heartbeat; abort the returned handle
/// to stop it earlier.
///
/// # Errors
///
/// Returns [`RpcError::InvalidConfig`] if `interval` is zero.
pub fn spawn_heartbeat(
    registry_url: String,
    addr: String,
    interval: Duration,
) -> Result<JoinHandle<()>> {
    if interval.is_zero() {
        return Err(RpcError::InvalidConfig(
            "heartbeat interval must be greater than zero".to_string(),
        ));
    }

    Ok(tokio::spawn(async move {
        let client = reqwest::Client::new();
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = send_heartbeat(&client, &registry_url, &addr).await {
                warn!("Stopping heartbeat for {}: {}", addr, e);
                break;
            }
        }
    }))
}

use std::net::ToSocketAddrs;
use std::time::Duration;

use tokio::net::TcpStream;

use crate::protocol::error::{Result, RpcError};

/// Default timeout for establishing a TCP connection (5 seconds)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connects to a remote endpoint.
///
/// This resolves the address (which may resolve to multiple addresses)
/// and attempts to connect to each until one succeeds, giving each attempt
/// at most `timeout`.
///
/// # Errors
///
/// Returns an error if:
/// - The address cannot be parsed or resolved
/// - Connection fails to all resolved addresses
pub async fn connect(addr: &str, timeout: Duration) -> Result<TcpStream> {
    let socket_addrs = addr
        .to_socket_addrs()
        .map_err(|e| RpcError::Connection(format!("Invalid address '{}': {}", addr, e)))?;

    let mut last_err = None;
    for socket_addr in socket_addrs {
        match tokio::time::timeout(timeout, TcpStream::connect(&socket_addr)).await {
            Ok(Ok(stream)) => {
                // Requests are small and latency-sensitive.
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Ok(Err(e)) => last_err = Some(e.to_string()),
            Err(_) => last_err = Some(format!("timed out after {}ms", timeout.as_millis())),
        }
    }

    Err(RpcError::Connection(format!(
        "Failed to connect to {}: {}",
        addr,
        last_err.unwrap_or_else(|| "no address resolved".to_string())
    )))
}

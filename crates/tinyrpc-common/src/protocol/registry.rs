//! Names shared by the heartbeat registry and its clients.

use std::time::Duration;

/// HTTP path the registry is served on.
pub const REGISTRY_PATH: &str = "/_tinyrpc_/registry";

/// Request header carrying the address a server heartbeats for.
pub const SERVER_HEADER: &str = "X-Tinyrpc-Server";

/// Response header carrying the comma-joined list of alive servers.
pub const SERVERS_HEADER: &str = "X-Tinyrpc-Servers";

/// How long a server stays alive after its last heartbeat.
pub const DEFAULT_TTL: Duration = Duration::from_secs(1);

/// Splits a `X-Tinyrpc-Servers` value into addresses, skipping blanks.
pub fn parse_server_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

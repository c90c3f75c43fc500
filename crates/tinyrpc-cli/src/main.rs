//! # tinyrpc CLI Entry Point
//!
//! Main binary for tinyrpc. Provides a command-line interface for starting
//! servers and the registry, and for making one-off RPC calls.
//!
//! ## Usage
//!
//! ```bash
//! # Start a registry
//! tinyrpc registry -b 127.0.0.1:9999
//!
//! # Start a server that heartbeats to the registry
//! tinyrpc serve -b 127.0.0.1:8001 --registry http://127.0.0.1:9999/_tinyrpc_/registry
//!
//! # Make an RPC call (outputs raw JSON)
//! tinyrpc call 127.0.0.1:8001 Arith.Add -a '{"a": 1, "b": 2}'
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use argh::FromArgs;
use tokio::net::TcpListener;

use tinyrpc_client::{Client, ClientOptions};
use tinyrpc_registry::{Registry, RegistryConfig, RegistryServer};
use tinyrpc_server::{spawn_heartbeat, Server, ServerConfig};

/// Environment variable consulted for the heartbeat address
const ADVERTISE_ENV: &str = "TINYRPC_ADVERTISE_ADDR";

/// Validates that a URL string starts with http:// or https://
///
/// # Errors
///
/// Returns an error if the URL doesn't start with http:// or https://
fn validate_http_url(url: &str, description: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "Invalid {}: '{}' must start with http:// or https://",
            description,
            url
        ))
    }
}

#[derive(FromArgs)]
/// tinyrpc - a small RPC framework
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Registry(RegistryArgs),
    Call(CallArgs),
}

/// Arguments for starting a server.
///
/// The server exposes the built-in `Arith` service over TCP and accepts
/// whichever codec a client's handshake asks for.
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// start a tinyrpc server
struct ServeArgs {
    /// address to bind the server to
    #[argh(option, short = 'b', default = "\"0.0.0.0:8000\".into()")]
    bind: String,

    /// registry URL to heartbeat to
    ///
    /// Must include the http:// or https:// prefix and the registry path
    /// (e.g., http://127.0.0.1:9999/_tinyrpc_/registry).
    #[argh(option, long = "registry")]
    registry: Option<String>,

    /// address announced in heartbeats
    ///
    /// Falls back to TINYRPC_ADVERTISE_ADDR, then to the bound address.
    #[argh(option, long = "advertise")]
    advertise: Option<String>,

    /// interval between heartbeats in milliseconds
    ///
    /// Must stay below the registry's TTL. Defaults to 500ms.
    #[argh(option, long = "heartbeat-interval-ms", default = "500")]
    heartbeat_interval_ms: u64,

    /// per-request timeout in milliseconds
    ///
    /// A request still running after this long is answered with a timeout
    /// error and its method is asked to stop. Defaults to 1000ms.
    #[argh(option, long = "handle-timeout-ms", default = "1000")]
    handle_timeout_ms: u64,
}

/// Arguments for starting the heartbeat registry.
#[derive(FromArgs)]
#[argh(subcommand, name = "registry")]
/// start a tinyrpc registry
struct RegistryArgs {
    /// address to bind the registry's HTTP server to
    #[argh(option, short = 'b', default = "\"0.0.0.0:9999\".into()")]
    bind: String,

    /// how long a server stays listed after a heartbeat, in milliseconds
    #[argh(option, long = "ttl-ms", default = "1000")]
    ttl_ms: u64,
}

/// Arguments for making a single RPC call.
///
/// The call uses the JSON codec, so arguments and replies of any shape can
/// be passed through. The reply is printed as raw JSON to stdout; errors go
/// to stderr with a non-zero exit code.
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// call an RPC method on a server
struct CallArgs {
    /// address of the server to call (host:port)
    #[argh(positional)]
    server_address: String,

    /// target in Service.Method form
    #[argh(positional)]
    service_method: String,

    /// JSON argument for the method
    ///
    /// Must be valid JSON. Defaults to `null`.
    #[argh(option, short = 'a', long = "args", default = "\"null\".into()")]
    args: String,

    /// how long to wait for the reply in milliseconds
    #[argh(option, long = "timeout-ms", default = "5000")]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Keep stdout clean for `call` so its output can be piped.
    if !matches!(cli.command, Commands::Call(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Registry(args) => run_registry(args).await,
        Commands::Call(args) => run_call(args).await,
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let config =
        ServerConfig::new().with_handle_timeout(Duration::from_millis(args.handle_timeout_ms));
    let server = Server::try_with_config(config)?;
    tracing::info!("Handle timeout: {}ms", args.handle_timeout_ms);

    server.register(tinyrpc_cli::arith::service())?;

    let listener = TcpListener::bind(&args.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", args.bind, e))?;
    let local_addr = listener.local_addr()?;

    if let Some(registry) = &args.registry {
        validate_http_url(registry, "registry address")?;

        let advertise = args
            .advertise
            .or_else(|| std::env::var(ADVERTISE_ENV).ok())
            .unwrap_or_else(|| local_addr.to_string());
        tracing::info!("Heartbeating {} to {}", advertise, registry);
        spawn_heartbeat(
            registry.clone(),
            advertise,
            Duration::from_millis(args.heartbeat_interval_ms),
        )?;
    }

    let shutdown = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down");
            shutdown.shutdown();
        }
    });

    server.accept(listener).await?;
    Ok(())
}

async fn run_registry(args: RegistryArgs) -> Result<()> {
    let config = RegistryConfig::new().with_ttl(Duration::from_millis(args.ttl_ms));
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid registry configuration: {}", e))?;
    tracing::info!("Registry TTL: {}ms", args.ttl_ms);

    let registry = Arc::new(Registry::new(config));
    RegistryServer::new(registry).run(&args.bind).await?;
    Ok(())
}

/// Executes the `call` subcommand.
///
/// # Errors
///
/// Returns an error if:
/// - The args string is not valid JSON
/// - The connection to the server fails
/// - The RPC call itself fails or times out
async fn run_call(args: CallArgs) -> Result<()> {
    let args_value: serde_json::Value = serde_json::from_str(&args.args)
        .map_err(|e| anyhow::anyhow!("Invalid JSON in args: {}", e))?;

    let client = Client::dial(&args.server_address, ClientOptions::default()).await?;
    let result: serde_json::Value = client
        .call(
            &args.service_method,
            &args_value,
            Duration::from_millis(args.timeout_ms),
        )
        .await?;

    println!("{}", serde_json::to_string(&result)?);

    client.close().await?;
    Ok(())
}

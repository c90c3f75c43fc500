// End-to-end tests for tinyrpc-client
//
// Each test starts a real server on a loopback port (and a registry where
// discovery is involved) and drives it through the public client API.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tinyrpc_client::{
    BalancedClient, Client, ClientOptions, Discovery, RegistryDiscovery, SelectMode,
    ServerDiscovery,
};
use tinyrpc_common::{CodecType, RpcError};
use tinyrpc_registry::{Registry, RegistryConfig, RegistryServer};
use tinyrpc_server::{spawn_heartbeat, CallContext, Server, ServiceBuilder, ServiceError};
use tokio::net::{TcpListener, TcpSocket, TcpStream};

// ============================================================================
// Test Helpers
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct Args {
    num1: i64,
    num2: i64,
}

/// Reports which server answered, so balancing can be observed.
struct Foo {
    addr: String,
}

async fn start_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let server = Server::new();
    server
        .register(
            ServiceBuilder::new(Foo { addr: addr.clone() })
                .method("Sum", |_foo, args: Args, _ctx| async move {
                    Ok::<_, ServiceError>(args.num1 + args.num2)
                })
                .method("Addr", |foo: Arc<Foo>, _: (), _ctx| async move {
                    Ok::<_, ServiceError>(foo.addr.clone())
                })
                .method("Sleep", |_foo, ms: u64, ctx: CallContext| async move {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(ms),
                        _ = ctx.cancelled() => Err(ServiceError::new("cancelled")),
                    }
                })
                .build(),
        )
        .unwrap();
    tokio::spawn(async move { server.accept(listener).await });
    addr
}

async fn start_registry(ttl: Duration) -> String {
    let registry = Arc::new(Registry::new(RegistryConfig::new().with_ttl(ttl)));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/_tinyrpc_/registry", listener.local_addr().unwrap());
    tokio::spawn(RegistryServer::new(registry).serve(listener));
    url
}

/// Hands out addresses in a fixed order, one per pick.
struct Scripted {
    picks: Mutex<VecDeque<String>>,
}

impl Scripted {
    fn new(picks: &[&str]) -> Self {
        Scripted {
            picks: Mutex::new(picks.iter().map(|s| s.to_string()).collect()),
        }
    }
}

impl Discovery for Scripted {
    async fn refresh(&self) -> tinyrpc_common::Result<()> {
        Ok(())
    }

    fn update(&self, servers: Vec<String>) -> tinyrpc_common::Result<()> {
        *self.picks.lock().unwrap() = servers.into();
        Ok(())
    }

    async fn get(&self, _mode: SelectMode) -> tinyrpc_common::Result<String> {
        self.picks.lock().unwrap().pop_front().ok_or(RpcError::NoAvailableServer)
    }

    async fn get_all(&self) -> tinyrpc_common::Result<Vec<String>> {
        Ok(self.picks.lock().unwrap().iter().cloned().collect())
    }
}

/// A listener whose accept queue is full, so new connects stall. Keep the
/// returned listener and streams alive for as long as the stall is needed.
async fn stalled_listener() -> (String, TcpListener, Vec<TcpStream>) {
    let socket = TcpSocket::new_v4().unwrap();
    socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let listener = socket.listen(0).unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let mut queued = Vec::new();
    for _ in 0..4 {
        if let Ok(Ok(stream)) =
            tokio::time::timeout(Duration::from_millis(100), TcpStream::connect(&addr)).await
        {
            queued.push(stream);
        }
    }
    (addr, listener, queued)
}

// ============================================================================
// Client
// ============================================================================

#[tokio::test]
async fn test_concurrent_calls_receive_own_replies() {
    let addr = start_server().await;

    for codec_type in [CodecType::Json, CodecType::Postcard] {
        let client = Client::dial(&addr, ClientOptions::new().with_codec_type(codec_type))
            .await
            .unwrap();

        let calls = (0..50i64).map(|i| {
            let client = client.clone();
            async move {
                let reply: i64 = client
                    .call("Foo.Sum", &Args { num1: i, num2: i * i }, Duration::from_secs(5))
                    .await
                    .unwrap();
                (i, reply)
            }
        });

        for (i, reply) in join_all(calls).await {
            assert_eq!(reply, i + i * i);
        }
        assert_eq!(client.pending_calls(), 0);
        client.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_client_deadline_leaves_nothing_pending() {
    let addr = start_server().await;
    let client = Client::dial(&addr, ClientOptions::default()).await.unwrap();

    let err = client
        .call::<_, u64>("Foo.Sleep", &500u64, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Timeout(50)));
    assert_eq!(client.pending_calls(), 0);

    // The late response must not disturb later calls.
    tokio::time::sleep(Duration::from_millis(600)).await;
    let sum: i64 = client
        .call("Foo.Sum", &Args { num1: 1, num2: 1 }, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(sum, 2);
}

#[tokio::test]
async fn test_server_timeout_reported() {
    // The default server answers after one second at the latest.
    let addr = start_server().await;
    let client = Client::dial(&addr, ClientOptions::default()).await.unwrap();

    let err = client
        .call::<_, u64>("Foo.Sleep", &5_000u64, Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Timeout(1000)));
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn test_unknown_method_then_success() {
    let addr = start_server().await;
    let client = Client::dial(&addr, ClientOptions::default()).await.unwrap();

    let err = client
        .call::<_, i64>("Foo.Product", &Args { num1: 1, num2: 1 }, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::UnknownMethod(_)));

    let err = client
        .call::<_, i64>("FooSum", &Args { num1: 1, num2: 1 }, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::InvalidServiceMethod(_)));

    let sum: i64 = client
        .call("Foo.Sum", &Args { num1: 20, num2: 22 }, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(sum, 42);
}

#[tokio::test]
async fn test_close_with_outstanding_calls() {
    let addr = start_server().await;
    let client = Client::dial(&addr, ClientOptions::default()).await.unwrap();

    let mut calls = Vec::new();
    for _ in 0..5 {
        calls.push(client.go::<_, u64>("Foo.Sleep", &300u64).await);
    }
    client.close().await.unwrap();

    for call in calls {
        assert!(matches!(call.await, Err(RpcError::Connection(_))));
    }
    assert_eq!(client.pending_calls(), 0);
    assert!(matches!(client.close().await, Err(RpcError::Closing)));
}

// ============================================================================
// Discovery and balancing
// ============================================================================

#[tokio::test]
async fn test_round_robin_spreads_calls() {
    let mut addrs = Vec::new();
    for _ in 0..3 {
        addrs.push(start_server().await);
    }

    let discovery = ServerDiscovery::new(addrs.clone(), "client");
    let client = BalancedClient::new(discovery, SelectMode::RoundRobin, ClientOptions::default());

    let mut answered = HashSet::new();
    for _ in 0..addrs.len() {
        let addr: String = client.call("Foo.Addr", &(), Duration::from_secs(1)).await.unwrap();
        answered.insert(addr);
    }
    assert_eq!(answered, addrs.into_iter().collect::<HashSet<_>>());
    assert_eq!(client.connections(), 3);
    client.close().await.unwrap();
    assert_eq!(client.connections(), 0);
}

#[tokio::test]
async fn test_ip_hash_sticks_to_one_server() {
    let mut addrs = Vec::new();
    for _ in 0..3 {
        addrs.push(start_server().await);
    }

    let discovery = ServerDiscovery::new(addrs, "10.0.0.42");
    let client = BalancedClient::new(discovery, SelectMode::IpHash, ClientOptions::default());

    let first: String = client.call("Foo.Addr", &(), Duration::from_secs(1)).await.unwrap();
    for _ in 0..5 {
        let addr: String = client.call("Foo.Addr", &(), Duration::from_secs(1)).await.unwrap();
        assert_eq!(addr, first);
    }
}

#[tokio::test]
async fn test_empty_discovery_has_no_server() {
    let client = BalancedClient::new(
        ServerDiscovery::new(Vec::new(), "client"),
        SelectMode::Random,
        ClientOptions::default(),
    );
    let err = client
        .call::<_, i64>("Foo.Sum", &Args { num1: 1, num2: 1 }, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::NoAvailableServer));
}

#[tokio::test]
async fn test_registry_discovery_follows_heartbeats() {
    let registry_url = start_registry(Duration::from_millis(500)).await;
    let addr = start_server().await;
    let heartbeat =
        spawn_heartbeat(registry_url.clone(), addr.clone(), Duration::from_millis(100)).unwrap();

    let discovery = RegistryDiscovery::new(registry_url, "client", Duration::ZERO);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(discovery.get_all().await.unwrap(), vec![addr.clone()]);

    let client = BalancedClient::new(discovery, SelectMode::Random, ClientOptions::default());
    let reply: String = client.call("Foo.Addr", &(), Duration::from_secs(1)).await.unwrap();
    assert_eq!(reply, addr);

    // Without heartbeats the server drops out after the TTL.
    heartbeat.abort();
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(client.discovery().get_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_slow_dial_does_not_block_cached_server() {
    let healthy = start_server().await;
    let (stalled, _listener, _queued) = stalled_listener().await;

    let discovery = Scripted::new(&[healthy.as_str(), stalled.as_str(), healthy.as_str()]);
    let options = ClientOptions::new().with_connect_timeout(Duration::from_secs(3));
    let client = Arc::new(BalancedClient::new(discovery, SelectMode::Random, options));

    // Warm the cache for the healthy server.
    let reply: String = client.call("Foo.Addr", &(), Duration::from_secs(1)).await.unwrap();
    assert_eq!(reply, healthy);

    let slow = {
        let client = client.clone();
        tokio::spawn(async move {
            client.call::<_, String>("Foo.Addr", &(), Duration::from_secs(1)).await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    let reply: String = client.call("Foo.Addr", &(), Duration::from_secs(1)).await.unwrap();
    assert_eq!(reply, healthy);
    assert!(started.elapsed() < Duration::from_secs(1));

    slow.abort();
}

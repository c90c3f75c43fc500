// End-to-end tests for tinyrpc
//
// A real server on a loopback port, real clients, and the properties a user
// of the framework relies on: replies matched to calls, no leaked calls
// after deadlines or teardown, and strict service naming.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tinyrpc::client::{Client, ClientOptions};
use tinyrpc::common::protocol::{ConnectionArgs, Header};
use tinyrpc::common::transport::{
    connect, split_stream, write_handshake, CodecReader, CodecWriter, FrameWriter,
    DEFAULT_CONNECT_TIMEOUT,
};
use tinyrpc::server::{CallContext, Server, ServerConfig, ServiceBuilder, ServiceError};
use tinyrpc::{Codec, CodecType, RpcError};
use tokio::net::TcpListener;

// ============================================================================
// Test Helpers
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Args {
    num1: i64,
    num2: i64,
}

mod first {
    #[derive(Default)]
    pub struct Calculator {
        pub calls: std::sync::atomic::AtomicUsize,
    }
}

mod second {
    pub struct Calculator;
}

fn calculator(calc: Arc<first::Calculator>) -> tinyrpc::server::Service {
    ServiceBuilder::from_arc(calc)
        .method("Add", |calc: Arc<first::Calculator>, args: Args, _ctx| async move {
            calc.calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ServiceError>(args.num1 + args.num2)
        })
        .method("Jitter", |_calc, args: Args, _ctx| async move {
            // Later calls finish first, scrambling completion order.
            let delay = 60u64.saturating_sub(args.num1 as u64 * 3);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok::<_, ServiceError>(args.num1 * 1000 + args.num2)
        })
        .method("Sleep", |_calc, ms: u64, ctx: CallContext| async move {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(ms),
                _ = ctx.cancelled() => Err(ServiceError::new("cancelled")),
            }
        })
        .build()
}

async fn start(config: ServerConfig) -> (Server, Arc<first::Calculator>, String) {
    let calc = Arc::new(first::Calculator::default());
    let server = Server::with_config(config);
    server.register(calculator(calc.clone())).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let accepting = server.clone();
    tokio::spawn(async move { accepting.accept(listener).await });
    (server, calc, addr)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_concurrent_calls_matched_by_seq() {
    let (_server, _calc, addr) = start(ServerConfig::default()).await;
    let client = Client::dial(&addr, ClientOptions::default()).await.unwrap();

    let mut calls = Vec::new();
    for i in 0..20i64 {
        calls.push(client.go::<_, i64>("Calculator.Jitter", &Args { num1: i, num2: -i }).await);
    }
    let replies = join_all(calls).await;

    for (i, reply) in replies.into_iter().enumerate() {
        let i = i as i64;
        assert_eq!(reply.unwrap(), i * 1000 - i);
    }
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn test_add_over_range() {
    let (_server, calc, addr) = start(ServerConfig::default()).await;

    for codec_type in [CodecType::Json, CodecType::Postcard] {
        let client = Client::dial(&addr, ClientOptions::new().with_codec_type(codec_type))
            .await
            .unwrap();
        for a in -5i64..=5 {
            for b in [-1000i64, -1, 0, 1, 7, 1000] {
                let sum: i64 = client
                    .call("Calculator.Add", &Args { num1: a, num2: b }, Duration::from_secs(1))
                    .await
                    .unwrap();
                assert_eq!(sum, a + b);
            }
        }
    }
    assert_eq!(calc.calls.load(Ordering::SeqCst), 2 * 11 * 6);
}

#[tokio::test]
async fn test_client_deadline_no_leak() {
    let (_server, _calc, addr) = start(ServerConfig::default()).await;
    let client = Client::dial(&addr, ClientOptions::default()).await.unwrap();

    let err = client
        .call::<_, u64>("Calculator.Sleep", &400u64, Duration::from_millis(30))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Timeout(30)));
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn test_server_deadline_no_leak() {
    let config = ServerConfig::new().with_handle_timeout(Duration::from_millis(40));
    let (_server, _calc, addr) = start(config).await;
    let client = Client::dial(&addr, ClientOptions::default()).await.unwrap();

    let err = client
        .call::<_, u64>("Calculator.Sleep", &2_000u64, Duration::from_secs(2))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Timeout(40)));
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn test_close_completes_each_outstanding_call_once() {
    let (_server, _calc, addr) = start(ServerConfig::default()).await;
    let client = Client::dial(&addr, ClientOptions::default()).await.unwrap();

    let mut calls = Vec::new();
    for _ in 0..8 {
        calls.push(client.go::<_, u64>("Calculator.Sleep", &500u64).await);
    }
    assert_eq!(client.pending_calls(), 8);
    client.close().await.unwrap();

    let results = join_all(calls).await;
    assert_eq!(results.len(), 8);
    assert!(results.iter().all(|r| matches!(r, Err(RpcError::Connection(_)))));
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn test_duplicate_derived_name_rejected() {
    let (server, _calc, addr) = start(ServerConfig::default()).await;

    let impostor = ServiceBuilder::new(second::Calculator)
        .method("Add", |_calc, _args: Args, _ctx| async move { Ok::<_, ServiceError>(0i64) })
        .build();
    assert_eq!(impostor.name(), "Calculator");
    assert!(matches!(
        server.register(impostor),
        Err(RpcError::DuplicateService(name)) if name == "Calculator"
    ));

    let methods = server.service("Calculator").unwrap();
    assert_eq!(methods.method_names(), vec!["Add", "Jitter", "Sleep"]);

    let client = Client::dial(&addr, ClientOptions::default()).await.unwrap();
    let sum: i64 = client
        .call("Calculator.Add", &Args { num1: 2, num2: 2 }, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(sum, 4);
}

#[tokio::test]
async fn test_peer_disconnect_fails_pending_calls() {
    // A bare listener that accepts, swallows the handshake and hangs up.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (hang_up_tx, hang_up_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let _ = hang_up_rx.await;
        drop(stream);
    });

    let client = Client::dial(&addr, ClientOptions::default()).await.unwrap();
    let mut calls = Vec::new();
    for i in 0..3i64 {
        calls.push(client.go::<_, i64>("Calculator.Add", &Args { num1: i, num2: i }).await);
    }
    hang_up_tx.send(()).unwrap();

    for result in join_all(calls).await {
        assert!(matches!(result, Err(RpcError::Connection(_))));
    }
    assert_eq!(client.pending_calls(), 0);
    assert!(client.is_closing());
}

#[tokio::test]
async fn test_bad_protocol_never_dispatches() {
    let (_server, calc, addr) = start(ServerConfig::default()).await;

    let stream = connect(&addr, DEFAULT_CONNECT_TIMEOUT).await.unwrap();
    let (reader, writer) = split_stream(stream);
    let mut frames = FrameWriter::new(writer);
    let args = ConnectionArgs {
        protocol: "grpc".to_string(),
        codec_type: "json".to_string(),
    };
    write_handshake(&mut frames, &args).await.unwrap();

    let codec = Codec::for_type(CodecType::Json);
    let mut writer = CodecWriter::from_frames(frames, codec);
    let _ = writer.write_header(&Header::request(1, "Calculator.Add")).await;
    let _ = writer.write_body(&Args { num1: 1, num2: 1 }).await;

    let mut reader = CodecReader::new(reader, codec);
    let read = tokio::time::timeout(Duration::from_secs(1), reader.read_header())
        .await
        .unwrap();
    assert!(read.is_err());
    assert_eq!(calc.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_many_clients_one_server() {
    let (_server, calc, addr) = start(ServerConfig::default()).await;
    let counter = Arc::new(AtomicUsize::new(0));

    let tasks = (0..8i64).map(|c| {
        let addr = addr.clone();
        let counter = counter.clone();
        tokio::spawn(async move {
            let client = Client::dial(&addr, ClientOptions::default()).await.unwrap();
            for i in 0..10i64 {
                let sum: i64 = client
                    .call("Calculator.Add", &Args { num1: c, num2: i }, Duration::from_secs(1))
                    .await
                    .unwrap();
                assert_eq!(sum, c + i);
                counter.fetch_add(1, Ordering::SeqCst);
            }
            client.close().await.unwrap();
        })
    });
    for task in join_all(tasks).await {
        task.unwrap();
    }

    assert_eq!(counter.load(Ordering::SeqCst), 80);
    assert_eq!(calc.calls.load(Ordering::SeqCst), 80);
}

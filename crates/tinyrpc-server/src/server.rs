//! Server dispatch engine.
//!
//! Each accepted connection is served by one read loop. The loop reads the
//! handshake, then header/body pairs, resolving each `Service.Method` target
//! and handing the decoded invocation to its own task. Responses from all of
//! a connection's tasks share one writer behind a mutex, so a header and its
//! body are never interleaved with another response.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use tinyrpc_common::protocol::Header;
use tinyrpc_common::transport::{
    read_handshake, split_stream, CodecReader, CodecWriter, FrameReader, FrameWriter,
};
use tinyrpc_common::{Result, RpcError};

use crate::config::ServerConfig;
use crate::service::{CallContext, MethodDescriptor, PreparedCall, Service};

type SharedWriter = Arc<Mutex<CodecWriter>>;

/// An RPC server holding a table of registered services.
///
/// `Server` is a cheap handle; clones share the service table and the
/// shutdown signal.
///
/// # Example
///
/// ```no_run
/// use tinyrpc_server::{Server, ServiceBuilder, ServiceError};
///
/// struct Echo;
///
/// # #[tokio::main]
/// # async fn main() -> tinyrpc_common::Result<()> {
/// let server = Server::new();
/// server.register(
///     ServiceBuilder::new(Echo)
///         .method("Say", |_echo, msg: String, _ctx| async move { Ok::<_, ServiceError>(msg) })
///         .build(),
/// )?;
/// server.serve("127.0.0.1:9999").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    services: DashMap<String, Arc<Service>>,
    config: ServerConfig,
    shutdown: CancellationToken,
}

/// A request whose target resolved and whose argument decoded.
struct Request {
    header: Header,
    call: PreparedCall,
}

enum Incoming {
    Call(Request),
    /// The target did not resolve; the body has been consumed.
    Rejected(Header, RpcError),
}

/// A failure that ends the read loop.
struct ReadFailure {
    header: Option<Header>,
    error: RpcError,
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Server {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Builds a server from `config` as given.
    ///
    /// The configuration is not checked; see [`Server::try_with_config`].
    pub fn with_config(config: ServerConfig) -> Self {
        Server {
            inner: Arc::new(ServerInner {
                services: DashMap::new(),
                config,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Builds a server after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::InvalidConfig`] if [`ServerConfig::validate`] fails.
    pub fn try_with_config(config: ServerConfig) -> Result<Self> {
        config.validate().map_err(RpcError::InvalidConfig)?;
        Ok(Self::with_config(config))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Publishes a service under its name.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::DuplicateService`] if the name is taken; the
    /// existing service stays registered.
    pub fn register(&self, service: Service) -> Result<()> {
        match self.inner.services.entry(service.name().to_string()) {
            Entry::Occupied(entry) => {
                warn!("Service {} already registered", entry.key());
                Err(RpcError::DuplicateService(entry.key().clone()))
            }
            Entry::Vacant(entry) => {
                info!(
                    "Registered service {} with methods [{}]",
                    service.name(),
                    service.method_names().join(", ")
                );
                entry.insert(Arc::new(service));
                Ok(())
            }
        }
    }

    /// Names of all registered services, sorted.
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.services.iter().map(|e| e.key().clone()).collect();
        names.sort_unstable();
        names
    }

    pub fn service(&self, name: &str) -> Option<Arc<Service>> {
        self.inner.services.get(name).map(|e| e.value().clone())
    }

    /// Resolves a `Service.Method` target.
    pub fn find_method(&self, service_method: &str) -> Result<Arc<MethodDescriptor>> {
        let (service_name, method_name) = service_method
            .rsplit_once('.')
            .filter(|(s, m)| !s.is_empty() && !m.is_empty())
            .ok_or_else(|| {
                RpcError::InvalidServiceMethod(format!(
                    "service/method request ill-formed: {}",
                    service_method
                ))
            })?;

        let service = self
            .service(service_name)
            .ok_or_else(|| RpcError::UnknownService(format!("can't find service {}", service_name)))?;

        service
            .method(method_name)
            .ok_or_else(|| RpcError::UnknownMethod(format!("can't find method {}", method_name)))
    }

    /// Binds `addr` and serves connections until [`Server::shutdown`].
    pub async fn serve(&self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RpcError::Connection(format!("Failed to bind to {}: {}", addr, e)))?;
        self.accept(listener).await
    }

    /// Serves connections from `listener` until [`Server::shutdown`].
    ///
    /// Connections already being served keep running after the accept loop
    /// stops.
    ///
    /// # Errors
    ///
    /// Returns an error if accepting a connection fails.
    pub async fn accept(&self, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!("RPC server listening on {}", addr);
        }

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer_addr) = accepted.map_err(|e| {
                        error!("Accept error: {}", e);
                        RpcError::Connection(format!("Failed to accept connection: {}", e))
                    })?;
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("Failed to set TCP_NODELAY for {}: {}", peer_addr, e);
                    }
                    debug!("Connection established from {}", peer_addr);

                    let server = self.clone();
                    tokio::spawn(async move {
                        server.serve_conn(stream).await;
                        debug!("Connection from {} closed", peer_addr);
                    });
                }
                _ = self.inner.shutdown.cancelled() => {
                    info!("RPC server stopped accepting connections");
                    return Ok(());
                }
            }
        }
    }

    /// Stops every accept loop running on this server.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    /// Serves one connection until the peer closes it or it fails.
    ///
    /// Returns once every request read from the connection has been answered.
    pub async fn serve_conn<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let max_frame_size = self.inner.config.max_frame_size;
        let (reader, writer) = split_stream(stream);

        let mut frames = FrameReader::with_max_frame_size(reader, max_frame_size);
        let codec_type = match read_handshake(&mut frames).await.and_then(|args| args.validate()) {
            Ok(codec_type) => codec_type,
            Err(e) => {
                warn!("Rejecting connection: {}", e);
                return;
            }
        };
        debug!("Connection negotiated codec {}", codec_type);

        let codec = tinyrpc_common::Codec::for_type(codec_type);
        let mut reader = CodecReader::from_frames(frames, codec);
        let writer: SharedWriter = Arc::new(Mutex::new(CodecWriter::from_frames(
            FrameWriter::with_max_frame_size(writer, max_frame_size),
            codec,
        )));
        let tracker = TaskTracker::new();
        let handle_timeout = self.inner.config.handle_timeout;

        loop {
            match self.read_request(&mut reader).await {
                Ok(Incoming::Call(request)) => {
                    tracker.spawn(handle_request(request, writer.clone(), handle_timeout));
                }
                Ok(Incoming::Rejected(header, err)) => {
                    debug!("Rejecting request {}: {}", header.seq, err);
                    send_response(&writer, &header, Err(err)).await;
                }
                Err(ReadFailure { header, error }) => {
                    if !error.is_eof() {
                        warn!("Read error: {}", error);
                        if let Some(header) = header {
                            send_response(&writer, &header, Err(error)).await;
                        }
                    }
                    break;
                }
            }
        }

        tracker.close();
        tracker.wait().await;

        let closed = writer.lock().await.close().await;
        if let Err(e) = closed {
            debug!("Failed to close connection: {}", e);
        }
    }

    async fn read_request(&self, reader: &mut CodecReader) -> std::result::Result<Incoming, ReadFailure> {
        let header = reader
            .read_header()
            .await
            .map_err(|error| ReadFailure { header: None, error })?;

        // The body frame is consumed before the target is resolved so that an
        // unknown target leaves the stream aligned on the next header.
        let body = match reader.read_raw_body().await {
            Ok(body) => body,
            Err(error) => {
                return Err(ReadFailure {
                    header: Some(header),
                    error,
                })
            }
        };

        let method = match self.find_method(&header.service_method) {
            Ok(method) => method,
            Err(err) => return Ok(Incoming::Rejected(header, err)),
        };

        match method.prepare(reader.codec(), &body) {
            Ok(call) => Ok(Incoming::Call(Request { header, call })),
            Err(e) => Err(ReadFailure {
                header: Some(header),
                error: RpcError::Encoding(format!("reading argument: {}", e)),
            }),
        }
    }
}

/// Runs one invocation, answering within `timeout` whatever the method does.
async fn handle_request(request: Request, writer: SharedWriter, timeout: Duration) {
    let Request { header, call } = request;
    let ctx = CallContext::new(header.seq, header.service_method.clone());
    let cancellation = ctx.cancellation_token();

    let mut invocation = tokio::spawn(call(ctx));
    let result = tokio::select! {
        joined = &mut invocation => match joined {
            Ok(result) => result,
            Err(e) => Err(RpcError::Application(format!("method panicked: {}", e))),
        },
        _ = tokio::time::sleep(timeout) => {
            cancellation.cancel();
            warn!(
                "Request {} ({}) exceeded handle timeout of {}ms",
                header.seq,
                header.service_method,
                timeout.as_millis()
            );
            Err(RpcError::Timeout(timeout.as_millis() as u64))
        }
    };

    send_response(&writer, &header, result).await;
}

/// Writes a response header and body under the connection's write lock.
async fn send_response(writer: &SharedWriter, request: &Header, result: Result<Vec<u8>>) {
    let mut writer = writer.lock().await;
    let codec = writer.codec();

    let (header, body) = match result {
        Ok(body) => (Header::response_to(request, None), body),
        Err(err) => (
            Header::response_to(request, Some(err.to_wire())),
            codec.encode(&()).unwrap_or_default(),
        ),
    };

    if let Err(e) = writer.write_header(&header).await {
        error!("Failed to write response header for {}: {}", request.seq, e);
        return;
    }
    if let Err(e) = writer.write_raw_body(&body).await {
        error!("Failed to write response body for {}: {}", request.seq, e);
    }
}

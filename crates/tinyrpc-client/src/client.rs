use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use tinyrpc_common::protocol::{ConnectionArgs, Header, Seq};
use tinyrpc_common::transport::{
    connect, split_stream, write_handshake, CodecReader, CodecWriter, FrameReader, FrameWriter,
};
use tinyrpc_common::{Codec, Result, RpcError};

use crate::call::{Call, CallRegistry};
use crate::options::ClientOptions;

/// Error reported to outstanding calls when the client is closed locally.
const CLIENT_CLOSED: &str = "client closed";

/// A tinyrpc client bound to one connection.
///
/// Any number of calls may be in flight at once; a background task reads
/// responses and completes calls by sequence number, in whatever order the
/// server answers. `Client` is a cheap handle and clones share the connection.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use tinyrpc_client::{Client, ClientOptions};
///
/// # #[tokio::main]
/// # async fn main() -> tinyrpc_common::Result<()> {
/// let client = Client::dial("127.0.0.1:8000", ClientOptions::default()).await?;
/// let sum: i64 = client.call("Arith.Add", &(1i64, 2i64), Duration::from_secs(1)).await?;
/// assert_eq!(sum, 3);
/// client.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    registry: Arc<CallRegistry>,
    writer: Mutex<CodecWriter>,
    codec: Codec,
    /// Cancelled on close to stop the receive loop.
    closed: CancellationToken,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

impl Client {
    /// Connects to `addr` over TCP and performs the handshake.
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid, the connection cannot be
    /// established within `connect_timeout`, or the handshake cannot be sent.
    pub async fn dial(addr: &str, options: ClientOptions) -> Result<Client> {
        options
            .validate()
            .map_err(|e| RpcError::Connection(format!("invalid client options: {}", e)))?;
        let stream = connect(addr, options.connect_timeout).await?;
        debug!("Connected to {}", addr);
        Self::new(stream, options).await
    }

    /// Performs the handshake over an established stream and starts the
    /// receive loop.
    pub async fn new<S>(stream: S, options: ClientOptions) -> Result<Client>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = split_stream(stream);

        let mut frames = FrameWriter::with_max_frame_size(writer, options.max_frame_size);
        write_handshake(&mut frames, &ConnectionArgs::new(options.codec_type)).await?;

        let codec = Codec::for_type(options.codec_type);
        let reader = CodecReader::from_frames(
            FrameReader::with_max_frame_size(reader, options.max_frame_size),
            codec,
        );

        let registry = Arc::new(CallRegistry::new());
        let closed = CancellationToken::new();
        tokio::spawn(receive_loop(reader, registry.clone(), closed.clone()));

        Ok(Client {
            inner: Arc::new(ClientInner {
                registry,
                writer: Mutex::new(CodecWriter::from_frames(frames, codec)),
                codec,
                closed,
            }),
        })
    }

    /// Sends a request and returns its [`Call`] without waiting for the reply.
    ///
    /// Failures to encode or send are delivered through the returned call,
    /// as is [`RpcError::Closing`] when the client is closing; in those cases
    /// nothing is left registered.
    pub async fn go<A, R>(&self, service_method: &str, args: &A) -> Call<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let codec = self.inner.codec;
        let body = match codec.encode(args) {
            Ok(body) => body,
            Err(e) => return Call::failed(service_method, codec, e),
        };
        let (seq, rx) = match self.inner.registry.register() {
            Ok(registered) => registered,
            Err(e) => return Call::failed(service_method, codec, e),
        };
        let call = Call::pending(seq, service_method, codec, rx, &self.inner.registry);

        // The write runs on its own task so that a header is never left
        // without its body if this future is dropped halfway.
        let inner = self.inner.clone();
        let header = Header::request(seq, service_method);
        let sent = tokio::spawn(async move { inner.send_request(&header, &body).await }).await;

        let failure = match sent {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(e) => Some(RpcError::Connection(format!("send task failed: {}", e))),
        };
        if let Some(error) = failure {
            warn!("Failed to send {} ({}): {}", service_method, seq, error);
            self.fail(seq, error);
        }
        call
    }

    /// Sends a request and waits for its reply for at most `deadline`.
    ///
    /// On expiry the call is abandoned and [`RpcError::Timeout`] returned,
    /// unless the reply won the race, in which case the reply is returned.
    pub async fn call<A, R>(&self, service_method: &str, args: &A, deadline: Duration) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut call = self.go::<A, R>(service_method, args).await;
        match tokio::time::timeout(deadline, &mut call).await {
            Ok(result) => result,
            Err(_) => {
                if self.inner.registry.remove(call.seq()).is_some() {
                    debug!("Call {} ({}) timed out", call.seq(), service_method);
                    Err(RpcError::Timeout(deadline.as_millis() as u64))
                } else {
                    // Completed concurrently; the outcome is already on its way.
                    call.await
                }
            }
        }
    }

    /// Closes the connection.
    ///
    /// Outstanding calls fail with a connection error. New calls fail with
    /// [`RpcError::Closing`].
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Closing`] if the client was already closed.
    pub async fn close(&self) -> Result<()> {
        self.inner.registry.mark_closing()?;
        self.inner.closed.cancel();

        let mut writer = self.inner.writer.lock().await;
        if let Err(e) = writer.close().await {
            debug!("Failed to shut down connection: {}", e);
        }
        Ok(())
    }

    /// Whether the client was closed or its connection lost.
    pub fn is_closing(&self) -> bool {
        self.inner.registry.is_closing()
    }

    /// Number of calls awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.inner.registry.len()
    }

    fn fail(&self, seq: Seq, error: RpcError) {
        if let Some(completion) = self.inner.registry.remove(seq) {
            let _ = completion.send(Err(error));
        }
    }
}

impl ClientInner {
    async fn send_request(&self, header: &Header, body: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_header(header).await?;
        writer.write_raw_body(body).await
    }
}

/// Completes calls from responses until the connection ends, then fails
/// whatever is still outstanding.
async fn receive_loop(mut reader: CodecReader, registry: Arc<CallRegistry>, closed: CancellationToken) {
    let reason = loop {
        let header = tokio::select! {
            _ = closed.cancelled() => break CLIENT_CLOSED.to_string(),
            header = reader.read_header() => header,
        };
        let header = match header {
            Ok(header) => header,
            Err(e) if e.is_eof() => break "connection closed by server".to_string(),
            Err(e) => break e.to_string(),
        };

        // The body is read even for abandoned calls to stay aligned.
        let body = tokio::select! {
            _ = closed.cancelled() => break CLIENT_CLOSED.to_string(),
            body = reader.read_raw_body() => body,
        };
        let body = match body {
            Ok(body) => body,
            Err(e) => break e.to_string(),
        };

        let Some(completion) = registry.remove(header.seq) else {
            debug!("Discarding response to abandoned call {}", header.seq);
            continue;
        };
        let outcome = match header.error {
            Some(error) => Err(RpcError::from(error)),
            None => Ok(body),
        };
        let _ = completion.send(outcome);
    };

    let failed = registry.terminate(&reason);
    if failed > 0 {
        warn!("Connection ended ({}), failed {} outstanding calls", reason, failed);
    } else {
        debug!("Connection ended: {}", reason);
    }
}

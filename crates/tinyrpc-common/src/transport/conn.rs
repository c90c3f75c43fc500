//! Codec bound to one connection.
//!
//! A connection is split into a [`CodecReader`] and a [`CodecWriter`] so that
//! one task can block on the next incoming header while other tasks write.
//! Each header and each body travels as its own frame.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};

use super::codec::Codec;
use super::frame::{FrameReader, FrameWriter, DEFAULT_MAX_FRAME_SIZE};
use crate::protocol::error::{Result, RpcError};
use crate::protocol::{ConnectionArgs, Header};

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Splits a duplex stream into type-erased halves.
pub fn split_stream<S>(stream: S) -> (BoxedReader, BoxedWriter)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    (Box::new(reader), Box::new(writer))
}

/// Sends the handshake record, JSON-encoded regardless of the codec it selects.
pub async fn write_handshake<W>(frames: &mut FrameWriter<W>, args: &ConnectionArgs) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let encoded = serde_json::to_vec(args)?;
    frames.write_frame(&encoded).await?;
    frames.flush().await
}

/// Largest handshake frame a server will read (4 KB).
pub const MAX_HANDSHAKE_SIZE: usize = 4 * 1024;

/// Reads the handshake record from a freshly accepted connection.
///
/// The frame is capped at [`MAX_HANDSHAKE_SIZE`] whatever limit `frames`
/// carries; that limit is back in force for the frames that follow.
pub async fn read_handshake<R>(frames: &mut FrameReader<R>) -> Result<ConnectionArgs>
where
    R: AsyncRead + Unpin,
{
    let max_frame_size = frames.max_frame_size();
    frames.set_max_frame_size(max_frame_size.min(MAX_HANDSHAKE_SIZE));
    let read = frames.read_frame().await;
    frames.set_max_frame_size(max_frame_size);

    let data = read?;
    serde_json::from_slice(&data)
        .map_err(|e| RpcError::Handshake(format!("malformed connection args: {}", e)))
}

/// Read half of a connection-bound codec.
pub struct CodecReader {
    frames: FrameReader<BoxedReader>,
    codec: Codec,
}

impl CodecReader {
    pub fn new(reader: BoxedReader, codec: Codec) -> Self {
        Self::from_frames(FrameReader::with_max_frame_size(reader, DEFAULT_MAX_FRAME_SIZE), codec)
    }

    pub fn from_frames(frames: FrameReader<BoxedReader>, codec: Codec) -> Self {
        Self { frames, codec }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub async fn read_header(&mut self) -> Result<Header> {
        let data = self.frames.read_frame().await?;
        self.codec.decode(&data)
    }

    pub async fn read_body<T: DeserializeOwned>(&mut self) -> Result<T> {
        let data = self.frames.read_frame().await?;
        self.codec.decode(&data)
    }

    /// Reads the next body frame without decoding it.
    pub async fn read_raw_body(&mut self) -> Result<Vec<u8>> {
        self.frames.read_frame().await
    }

    /// Consumes the next body frame so the stream stays aligned on headers.
    pub async fn discard_body(&mut self) -> Result<()> {
        self.frames.read_frame().await.map(|_| ())
    }
}

/// Write half of a connection-bound codec.
///
/// `write_header` and the following `write_body` form one exchange; callers
/// sharing a writer must hold their lock across both.
pub struct CodecWriter {
    frames: FrameWriter<BoxedWriter>,
    codec: Codec,
}

impl CodecWriter {
    pub fn new(writer: BoxedWriter, codec: Codec) -> Self {
        Self::from_frames(FrameWriter::with_max_frame_size(writer, DEFAULT_MAX_FRAME_SIZE), codec)
    }

    pub fn from_frames(frames: FrameWriter<BoxedWriter>, codec: Codec) -> Self {
        Self { frames, codec }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub async fn write_header(&mut self, header: &Header) -> Result<()> {
        let encoded = self.codec.encode(header)?;
        self.frames.write_frame(&encoded).await
    }

    /// Writes the body and flushes the exchange.
    pub async fn write_body<T: Serialize + ?Sized>(&mut self, body: &T) -> Result<()> {
        let encoded = self.codec.encode(body)?;
        self.write_raw_body(&encoded).await
    }

    /// Writes an already-encoded body and flushes the exchange.
    pub async fn write_raw_body(&mut self, body: &[u8]) -> Result<()> {
        self.frames.write_frame(body).await?;
        self.frames.flush().await
    }

    /// Shuts down the write side of the connection.
    pub async fn close(&mut self) -> Result<()> {
        self.frames.shutdown().await
    }
}

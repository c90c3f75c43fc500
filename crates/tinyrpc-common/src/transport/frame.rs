use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use crate::protocol::error::{Result, RpcError};

/// Default maximum frame size (100 MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Reads length-prefixed frames.
///
/// Wire format: `[4-byte length as u32 big-endian] + [data]`
///
/// An EOF before the first byte of a length prefix is reported as
/// [`RpcError::ConnectionClosed`]; an EOF anywhere else means the peer went
/// away mid-frame and is a connection error.
pub struct FrameReader<R> {
    inner: R,
    max_frame_size: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max_frame_size(inner, DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(inner: R, max_frame_size: usize) -> Self {
        Self {
            inner,
            max_frame_size,
        }
    }

    /// Receives one frame.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The stream ends (cleanly or mid-frame)
    /// - The frame exceeds the maximum size
    /// - Reading fails
    pub async fn read_frame(&mut self) -> Result<Vec<u8>> {
        let mut len_buf = [0u8; 4];
        let first = self
            .inner
            .read(&mut len_buf)
            .await
            .map_err(|e| map_io_error(e, "reading length prefix"))?;
        if first == 0 {
            return Err(RpcError::ConnectionClosed);
        }
        if first < len_buf.len() {
            self.inner
                .read_exact(&mut len_buf[first..])
                .await
                .map_err(|e| map_io_error(e, "reading length prefix"))?;
        }

        let len = u32::from_be_bytes(len_buf) as usize;

        // Validate length to prevent allocation of excessively large buffers
        if len > self.max_frame_size {
            warn!("Rejecting {} byte frame (max {})", len, self.max_frame_size);
            return Err(RpcError::FrameTooLarge {
                size: len,
                max: self.max_frame_size,
            });
        }

        let mut buf = vec![0u8; len];
        self.inner
            .read_exact(&mut buf)
            .await
            .map_err(|e| map_io_error(e, "reading frame data"))?;

        Ok(buf)
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.max_frame_size = max_frame_size;
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Writes length-prefixed frames.
pub struct FrameWriter<W> {
    inner: W,
    max_frame_size: usize,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_max_frame_size(inner, DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(inner: W, max_frame_size: usize) -> Self {
        Self {
            inner,
            max_frame_size,
        }
    }

    /// Writes one frame without flushing.
    pub async fn write_frame(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > self.max_frame_size {
            return Err(RpcError::FrameTooLarge {
                size: data.len(),
                max: self.max_frame_size,
            });
        }
        let len = data.len() as u32;

        self.inner
            .write_all(&len.to_be_bytes())
            .await
            .map_err(|e| map_io_error(e, "writing length prefix"))?;
        self.inner
            .write_all(data)
            .await
            .map_err(|e| map_io_error(e, "writing frame data"))?;

        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.inner
            .flush()
            .await
            .map_err(|e| map_io_error(e, "flushing stream"))
    }

    /// Flushes and shuts down the write side of the stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.flush().await?;
        self.inner
            .shutdown()
            .await
            .map_err(|e| map_io_error(e, "shutting down stream"))
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Map IO errors to appropriate RpcError variants
///
/// - Connection errors and truncated frames -> `Connection`
/// - Other IO errors -> `Io`
fn map_io_error(err: std::io::Error, context: &str) -> RpcError {
    match err.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::UnexpectedEof => {
            RpcError::Connection(format!("{}: connection lost ({})", context, err))
        }
        _ => RpcError::Io(err),
    }
}

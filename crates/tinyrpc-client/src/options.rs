//! Client connection options.

use std::time::Duration;

use tinyrpc_common::transport::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_FRAME_SIZE};
use tinyrpc_common::CodecType;

/// Options for a [`Client`](crate::Client) connection.
///
/// # Example
///
/// ```
/// use tinyrpc_client::ClientOptions;
/// use tinyrpc_common::CodecType;
///
/// let options = ClientOptions::new().with_codec_type(CodecType::Postcard);
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    /// Codec advertised in the handshake
    pub codec_type: CodecType,
    /// Bound on establishing the TCP connection
    pub connect_timeout: Duration,
    /// Maximum size of a single frame in bytes
    pub max_frame_size: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            codec_type: CodecType::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_codec_type(mut self, codec_type: CodecType) -> Self {
        self.codec_type = codec_type;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns an error if the connect timeout or the maximum frame size is zero.
    pub fn validate(&self) -> Result<(), String> {
        if self.connect_timeout.is_zero() {
            return Err("connect timeout must be greater than zero".to_string());
        }
        if self.max_frame_size == 0 {
            return Err("max frame size must be greater than zero".to_string());
        }
        Ok(())
    }
}

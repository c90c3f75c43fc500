//! Server configuration.

use std::time::Duration;

use tinyrpc_common::transport::DEFAULT_MAX_FRAME_SIZE;

/// Configuration for a [`Server`](crate::Server).
///
/// # Fields
///
/// - `handle_timeout` - How long a caller waits for one invocation before the
///   server answers with a timeout error (default: 1 second)
/// - `max_frame_size` - Largest header or body frame accepted (default: 100 MB)
///
/// # Timeouts and Cancellation
///
/// When `handle_timeout` elapses the response is sent immediately and the
/// invocation's [`CallContext`](crate::CallContext) is cancelled. A method
/// that never checks its context keeps running detached until it finishes on
/// its own, and whatever resources it holds stay held until then.
///
/// # Example
///
/// ```
/// use tinyrpc_server::ServerConfig;
/// use std::time::Duration;
///
/// let config = ServerConfig::new()
///     .with_handle_timeout(Duration::from_secs(5));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Per-request bound on caller-visible latency
    pub handle_timeout: Duration,
    /// Maximum size of a single frame in bytes
    pub max_frame_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            handle_timeout: Duration::from_secs(1),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handle_timeout(mut self, timeout: Duration) -> Self {
        self.handle_timeout = timeout;
        self
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The handle timeout is zero
    /// - The maximum frame size is zero
    pub fn validate(&self) -> Result<(), String> {
        if self.handle_timeout.is_zero() {
            return Err("handle timeout must be greater than zero".to_string());
        }

        if self.max_frame_size == 0 {
            return Err("max frame size must be greater than zero".to_string());
        }

        Ok(())
    }
}

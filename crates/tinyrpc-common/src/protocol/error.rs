use thiserror::Error;

use super::header::{WireError, WireErrorKind};

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Handshake error: {0}")]
    Handshake(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] postcard::Error),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection on a frame boundary.
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Frame too large: {size} bytes (max {max} bytes)")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Invalid service method: {0}")]
    InvalidServiceMethod(String),

    #[error("Application error: {0}")]
    Application(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Client is closing")]
    Closing,

    #[error("Service already registered: {0}")]
    DuplicateService(String),

    #[error("No available server")]
    NoAvailableServer,

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RpcError {
    /// Whether this error is the clean end of a connection rather than a failure.
    pub fn is_eof(&self) -> bool {
        matches!(self, RpcError::ConnectionClosed)
    }

    /// Builds the error carried in a response header for this failure.
    pub fn to_wire(&self) -> WireError {
        let kind = match self {
            RpcError::UnknownService(_) => WireErrorKind::UnknownService,
            RpcError::UnknownMethod(_) => WireErrorKind::UnknownMethod,
            RpcError::InvalidServiceMethod(_) => WireErrorKind::InvalidServiceMethod,
            RpcError::Application(_) => WireErrorKind::Application,
            RpcError::Timeout(ms) => WireErrorKind::Timeout { after_ms: *ms },
            _ => WireErrorKind::Encoding,
        };
        let message = match self {
            RpcError::UnknownService(m)
            | RpcError::UnknownMethod(m)
            | RpcError::InvalidServiceMethod(m)
            | RpcError::Application(m) => m.clone(),
            other => other.to_string(),
        };
        WireError { kind, message }
    }
}

impl From<WireError> for RpcError {
    fn from(err: WireError) -> Self {
        match err.kind {
            WireErrorKind::UnknownService => RpcError::UnknownService(err.message),
            WireErrorKind::UnknownMethod => RpcError::UnknownMethod(err.message),
            WireErrorKind::InvalidServiceMethod => RpcError::InvalidServiceMethod(err.message),
            WireErrorKind::Application => RpcError::Application(err.message),
            WireErrorKind::Timeout { after_ms } => RpcError::Timeout(after_ms),
            WireErrorKind::Encoding => RpcError::Encoding(err.message),
        }
    }
}

impl From<std::net::AddrParseError> for RpcError {
    fn from(err: std::net::AddrParseError) -> Self {
        RpcError::Connection(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;

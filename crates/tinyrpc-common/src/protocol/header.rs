//! Per-exchange envelope.
//!
//! Every request and every response on a connection is one [`Header`] frame
//! followed by one body frame. The header correlates the two halves of an
//! exchange by sequence number; the body is the argument (requests) or the
//! reply (responses).

use serde::{Deserialize, Serialize};

/// Sequence number of a call, unique per client connection.
pub type Seq = u64;

/// Classification of a failure carried inside a response header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum WireErrorKind {
    UnknownService,
    UnknownMethod,
    InvalidServiceMethod,
    Application,
    Timeout { after_ms: u64 },
    Encoding,
}

/// A failure reported by the server for one exchange.
///
/// This is a plain record rather than an error trait object so that any
/// codec can carry it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WireError {
    pub kind: WireErrorKind,
    pub message: String,
}

impl WireError {
    pub fn new(kind: WireErrorKind, message: impl Into<String>) -> Self {
        WireError {
            kind,
            message: message.into(),
        }
    }
}

/// Header of a request or response.
///
/// # Example
///
/// ```
/// use tinyrpc_common::protocol::Header;
///
/// let header = Header::request(7, "Arith.Add");
/// assert_eq!(header.split_service_method(), Some(("Arith", "Add")));
/// assert!(header.error.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Header {
    /// Sequence number chosen by the client and echoed by the server
    pub seq: Seq,
    /// Target in `Service.Method` form
    pub service_method: String,
    /// Present only on failed responses
    pub error: Option<WireError>,
}

impl Header {
    pub fn request(seq: Seq, service_method: impl Into<String>) -> Self {
        Header {
            seq,
            service_method: service_method.into(),
            error: None,
        }
    }

    /// Response header echoing `request`'s sequence number and target.
    pub fn response_to(request: &Header, error: Option<WireError>) -> Self {
        Header {
            seq: request.seq,
            service_method: request.service_method.clone(),
            error,
        }
    }

    /// Splits `Service.Method` at the last dot.
    pub fn split_service_method(&self) -> Option<(&str, &str)> {
        let (service, method) = self.service_method.rsplit_once('.')?;
        if service.is_empty() || method.is_empty() {
            return None;
        }
        Some((service, method))
    }
}

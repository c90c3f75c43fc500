//! Connection handshake record.
//!
//! The first frame on every connection carries a [`ConnectionArgs`] encoded
//! as JSON, whatever codec it selects, so the server can decode it before a
//! codec has been chosen.

use serde::{Deserialize, Serialize};

use super::error::{Result, RpcError};
use crate::transport::CodecType;

/// Protocol tag a server accepts.
pub const PROTOCOL: &str = "rpc";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionArgs {
    pub protocol: String,
    pub codec_type: String,
}

impl ConnectionArgs {
    pub fn new(codec_type: CodecType) -> Self {
        ConnectionArgs {
            protocol: PROTOCOL.to_string(),
            codec_type: codec_type.to_string(),
        }
    }

    /// Checks the protocol tag and resolves the advertised codec.
    pub fn validate(&self) -> Result<CodecType> {
        if self.protocol != PROTOCOL {
            return Err(RpcError::Handshake(format!(
                "unexpected protocol '{}'",
                self.protocol
            )));
        }
        self.codec_type.parse()
    }
}

impl Default for ConnectionArgs {
    fn default() -> Self {
        Self::new(CodecType::default())
    }
}

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::protocol::error::{Result, RpcError};

/// Identifier of a serialization format, as advertised in the handshake.
///
/// # Example
///
/// ```
/// use tinyrpc_common::transport::CodecType;
///
/// let codec_type: CodecType = "postcard".parse().unwrap();
/// assert_eq!(codec_type, CodecType::Postcard);
/// assert_eq!(CodecType::Json.to_string(), "json");
/// assert!("gob".parse::<CodecType>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CodecType {
    /// JSON (self-describing, the default)
    #[default]
    Json,
    /// Postcard (compact binary, requires statically known types)
    Postcard,
}

impl CodecType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodecType::Json => "json",
            CodecType::Postcard => "postcard",
        }
    }
}

impl fmt::Display for CodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodecType {
    type Err = RpcError;

    fn from_str(tag: &str) -> Result<Self> {
        match tag {
            "json" => Ok(CodecType::Json),
            "postcard" => Ok(CodecType::Postcard),
            other => Err(RpcError::UnsupportedCodec(other.to_string())),
        }
    }
}

/// Codec for encoding/decoding headers and bodies.
///
/// Dispatches to one concrete format per variant; new formats are added as
/// variants together with a [`CodecType`] tag.
///
/// # Example
///
/// ```
/// use tinyrpc_common::transport::{Codec, CodecType};
/// use tinyrpc_common::protocol::Header;
///
/// let codec = Codec::for_type(CodecType::Json);
/// let header = Header::request(1, "Arith.Add");
///
/// let encoded = codec.encode(&header).unwrap();
/// let decoded: Header = codec.decode(&encoded).unwrap();
/// assert_eq!(header, decoded);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Json(JsonCodec),
    Postcard(PostcardCodec),
}

impl Codec {
    /// Looks up the codec for a negotiated type.
    pub fn for_type(codec_type: CodecType) -> Self {
        match codec_type {
            CodecType::Json => Codec::Json(JsonCodec),
            CodecType::Postcard => Codec::Postcard(PostcardCodec),
        }
    }

    pub fn codec_type(&self) -> CodecType {
        match self {
            Codec::Json(_) => CodecType::Json,
            Codec::Postcard(_) => CodecType::Postcard,
        }
    }

    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            Codec::Json(_) => JsonCodec::encode(value),
            Codec::Postcard(_) => PostcardCodec::encode(value),
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        match self {
            Codec::Json(_) => JsonCodec::decode(data),
            Codec::Postcard(_) => PostcardCodec::decode(data),
        }
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::for_type(CodecType::default())
    }
}

/// JSON codec backed by `serde_json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Binary codec backed by `postcard`.
///
/// Postcard is not self-describing, so values such as `serde_json::Value`
/// cannot be decoded with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PostcardCodec;

impl PostcardCodec {
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(postcard::to_allocvec(value)?)
    }

    pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
        Ok(postcard::from_bytes(data)?)
    }
}

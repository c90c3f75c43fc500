//! tinyrpc Common Types and Transport
//!
//! This crate provides the wire protocol definitions and the codec/framing
//! layer shared by tinyrpc clients and servers.
//!
//! # Overview
//!
//! tinyrpc lets a client invoke `Service.Method` on a remote server over a
//! plain TCP connection. This crate contains:
//!
//! - **Protocol Layer**: [`Header`], [`WireError`], the handshake record and
//!   the [`RpcError`] taxonomy
//! - **Transport Layer**: length-prefixed framing, pluggable codecs and the
//!   per-connection codec halves
//!
//! # Wire Protocol
//!
//! 1. Handshake: one JSON frame `{"protocol":"rpc","codec_type":"json"}`
//! 2. Zero or more exchanges, each a header frame followed by a body frame
//!
//! Every frame is `[4-byte length prefix as u32 big-endian] + [payload]`,
//! capped at 100 MB by default.
//!
//! # Example
//!
//! ```
//! use tinyrpc_common::{Codec, CodecType, Header};
//!
//! let codec = Codec::for_type(CodecType::Postcard);
//! let header = Header::request(1, "Arith.Add");
//! let bytes = codec.encode(&header).unwrap();
//! assert_eq!(codec.decode::<Header>(&bytes).unwrap(), header);
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
pub use transport::{Codec, CodecType};

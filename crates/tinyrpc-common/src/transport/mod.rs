//! tinyrpc Transport Layer
//!
//! This module provides framing, codecs and the connection-bound codec halves
//! used by both clients and servers.
//!
//! # Architecture
//!
//! - **Transport**: any async byte stream, TCP in practice
//! - **Framing**: `[4-byte length prefix as u32 big-endian] + [payload]`
//! - **Handshake**: the first frame, a JSON [`ConnectionArgs`](crate::protocol::ConnectionArgs)
//! - **Exchanges**: a header frame followed by a body frame, encoded with the
//!   negotiated [`Codec`]
//!
//! # Components
//!
//! - **[`CodecType`]** / **[`Codec`]**: negotiated serialization format
//! - **[`FrameReader`]** / **[`FrameWriter`]**: length-prefixed framing
//! - **[`CodecReader`]** / **[`CodecWriter`]**: codec bound to one connection
//! - **[`connect`]**: TCP connect with timeout
//!
//! # Example
//!
//! ```no_run
//! use tinyrpc_common::protocol::{ConnectionArgs, Header};
//! use tinyrpc_common::transport::{self, Codec, CodecType, CodecWriter, FrameWriter};
//!
//! # #[tokio::main]
//! # async fn main() -> tinyrpc_common::Result<()> {
//! let stream = transport::connect("127.0.0.1:9999", transport::DEFAULT_CONNECT_TIMEOUT).await?;
//! let (_reader, writer) = transport::split_stream(stream);
//!
//! let mut frames = FrameWriter::new(writer);
//! transport::write_handshake(&mut frames, &ConnectionArgs::new(CodecType::Json)).await?;
//!
//! let mut writer = CodecWriter::from_frames(frames, Codec::for_type(CodecType::Json));
//! writer.write_header(&Header::request(1, "Arith.Add")).await?;
//! writer.write_body(&(1, 2)).await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod conn;
pub mod frame;
pub mod tcp;

pub use codec::{Codec, CodecType, JsonCodec, PostcardCodec};
pub use conn::{
    read_handshake, split_stream, write_handshake, BoxedReader, BoxedWriter, CodecReader,
    CodecWriter, MAX_HANDSHAKE_SIZE,
};
pub use frame::{FrameReader, FrameWriter, DEFAULT_MAX_FRAME_SIZE};
pub use tcp::{connect, DEFAULT_CONNECT_TIMEOUT};

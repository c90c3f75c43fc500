pub mod error;
pub mod handshake;
pub mod header;
pub mod registry;


pub use error::{Result, RpcError};
pub use handshake::{ConnectionArgs, PROTOCOL};
pub use header::{Header, Seq, WireError, WireErrorKind};

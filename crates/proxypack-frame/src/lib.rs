//! Tunnel frame codec: many client connections over one byte stream.
//!
//! A front-end relaying client connections to a backend writes every piece of
//! every connection as a frame on one shared link:
//! - A version byte (`255 - version`)
//! - A 1-byte header length
//! - A comma-separated ASCII header naming the originating client address,
//!   the body length and the service
//! - The body
//!
//! [`Assembler`] rebuilds frames from arbitrarily split deliveries and hands
//! each one to the [`Handlers`] registered for its channel.

pub mod assembler;
pub mod codec;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod reader;
pub mod service;
#[cfg(feature = "async")]
pub mod tokio_codec;
pub mod writer;

pub use assembler::{Assembler, AssemblerConfig};
pub use codec::{
    encode_frame, encode_header, encode_into, pack, pack_legacy, pack_with, version_byte, Address,
    Descriptor, FrameHeader, PackOptions, Payload, MAX_HEADER_LEN, PROTOCOL_VERSION,
};
pub use dispatch::{Handler, Handlers};
pub use error::{FrameError, Result};
pub use message::{ErrorBody, Message, UNKNOWN_ERROR_CODE};
pub use reader::{FrameReader, ReaderConfig};
pub use service::ServiceTag;
#[cfg(feature = "async")]
pub use tokio_codec::{OutboundFrame, TunnelCodec};
pub use writer::FrameWriter;

//! `tokio_util::codec` adapter for use with `Framed`, `FramedRead` and
//! `FramedWrite`.

use std::sync::mpsc;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::assembler::{Assembler, AssemblerConfig};
use crate::codec::{encode_into, Descriptor, PackOptions, Payload};
use crate::dispatch::Handlers;
use crate::error::{FrameError, Result};
use crate::message::Message;
use crate::service::ServiceTag;

/// A frame waiting to be encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundFrame {
    pub descriptor: Descriptor,
    pub service: Option<ServiceTag>,
    pub payload: Option<Payload>,
}

impl OutboundFrame {
    /// A data frame carrying `payload`.
    pub fn data(descriptor: Descriptor, payload: impl Into<Payload>) -> Self {
        Self {
            descriptor,
            service: None,
            payload: Some(payload.into()),
        }
    }

    /// A bodyless frame with an explicit tag (`connection`, `end`, ...).
    pub fn tagged(descriptor: Descriptor, service: ServiceTag) -> Self {
        Self {
            descriptor,
            service: Some(service),
            payload: None,
        }
    }
}

/// Codec yielding one [`Message`] per assembled frame.
///
/// Decoding hands every buffered byte to an internal [`Assembler`] and then
/// drains the messages it produced, one per `decode` call.
#[derive(Debug)]
pub struct TunnelCodec {
    assembler: Assembler,
    ready: mpsc::Receiver<Message>,
    options: PackOptions,
}

impl TunnelCodec {
    pub fn new() -> Self {
        Self::with_config(AssemblerConfig::default())
    }

    pub fn with_config(config: AssemblerConfig) -> Self {
        let (handlers, ready) = Handlers::channel();
        Self {
            assembler: Assembler::with_config(handlers, config),
            ready,
            options: PackOptions::default(),
        }
    }

    /// Pad empty bodies of encoded frames to one byte.
    pub fn with_legacy_padding(mut self, legacy_padding: bool) -> Self {
        self.options.legacy_padding = legacy_padding;
        self
    }

    pub fn assembler(&self) -> &Assembler {
        &self.assembler
    }
}

impl Default for TunnelCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for TunnelCodec {
    type Item = Message;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        if !src.is_empty() {
            self.assembler.push(src.split().freeze());
        }
        Ok(self.ready.try_recv().ok())
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }
        if !self.assembler.is_idle() {
            return Err(FrameError::ConnectionClosed);
        }
        Ok(None)
    }
}

impl Encoder<OutboundFrame> for TunnelCodec {
    type Error = FrameError;

    fn encode(&mut self, item: OutboundFrame, dst: &mut BytesMut) -> Result<()> {
        encode_into(
            &item.descriptor,
            item.payload,
            item.service,
            self.options,
            dst,
        )
    }
}

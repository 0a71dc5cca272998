//! Incremental frame decoder.
//!
//! The assembler consumes the link's byte stream in whatever pieces the
//! transport delivers and dispatches each frame once its body is complete.
//! A frame may span many calls to [`Assembler::push`], and one call may
//! complete many frames.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{trace, warn};

use crate::codec::{version_byte, FrameHeader, PROTOCOL_VERSION};
use crate::dispatch::Handlers;
use crate::message::Message;

/// Decoder configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblerConfig {
    /// Protocol version the peer is expected to speak.
    pub version: u8,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            version: PROTOCOL_VERSION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ReadVersion,
    ReadHeaderLength,
    ReadHeader,
    ReadBody,
}

/// Reassembles frames from one physical link and hands them to [`Handlers`].
///
/// One instance per link. Feed it chunks in arrival order; it is not
/// internally synchronized.
#[derive(Debug)]
pub struct Assembler {
    handlers: Handlers,
    config: AssemblerConfig,
    state: State,
    header_len: usize,
    header: FrameHeader,
    /// Bytes of the current stage gathered from earlier chunks.
    pending: BytesMut,
    dispatched: u64,
    version_mismatches: u64,
}

impl Assembler {
    /// Create an assembler expecting the current protocol version.
    pub fn new(handlers: Handlers) -> Self {
        Self::with_config(handlers, AssemblerConfig::default())
    }

    /// Create an assembler with explicit configuration.
    pub fn with_config(handlers: Handlers, config: AssemblerConfig) -> Self {
        Self {
            handlers,
            config,
            state: State::ReadVersion,
            header_len: 0,
            header: FrameHeader::default(),
            pending: BytesMut::new(),
            dispatched: 0,
            version_mismatches: 0,
        }
    }

    /// Consume one delivery from the link.
    ///
    /// Stages satisfied entirely by `chunk` are sliced out of it without
    /// copying; only stages that straddle deliveries are buffered.
    pub fn push(&mut self, mut chunk: Bytes) {
        trace!(len = chunk.len(), "assembler received chunk");
        while self.step(&mut chunk) {}
    }

    /// Consume one delivery from a borrowed buffer.
    pub fn push_slice(&mut self, chunk: &[u8]) {
        self.push(Bytes::copy_from_slice(chunk));
    }

    /// True when no frame is partially assembled.
    pub fn is_idle(&self) -> bool {
        self.state == State::ReadVersion && self.pending.is_empty()
    }

    /// Number of messages dispatched so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Number of frames whose version byte did not match.
    pub fn version_mismatches(&self) -> u64 {
        self.version_mismatches
    }

    /// Advance the state machine once. Returns false when it needs more input.
    fn step(&mut self, chunk: &mut Bytes) -> bool {
        match self.state {
            State::ReadVersion => {
                if !chunk.has_remaining() {
                    return false;
                }
                let found = chunk.get_u8();
                let expected = version_byte(self.config.version);
                if found != expected {
                    // No resynchronization: the next byte is still taken as the header length.
                    self.version_mismatches += 1;
                    warn!(
                        expected,
                        found,
                        version = self.config.version,
                        "unexpected frame version byte (data may be corrupt)"
                    );
                }
                self.state = State::ReadHeaderLength;
            }
            State::ReadHeaderLength => {
                if !chunk.has_remaining() {
                    return false;
                }
                self.header_len = usize::from(chunk.get_u8());
                self.state = State::ReadHeader;
            }
            State::ReadHeader => {
                let Some(raw) = self.collect(chunk, self.header_len) else {
                    return false;
                };
                self.header = FrameHeader::parse(&raw);
                trace!(
                    service = %self.header.service,
                    body_len = self.header.body_len,
                    "frame header complete"
                );
                self.state = State::ReadBody;
            }
            State::ReadBody => {
                let Some(body) = self.collect(chunk, self.header.body_len) else {
                    return false;
                };
                let header = std::mem::take(&mut self.header);
                self.state = State::ReadVersion;
                self.dispatched += 1;
                self.handlers.dispatch(Message::from_parts(header, body));
            }
        }
        true
    }

    /// Gather exactly `size` bytes for the current stage.
    fn collect(&mut self, chunk: &mut Bytes, size: usize) -> Option<Bytes> {
        if self.pending.is_empty() && chunk.len() >= size {
            return Some(chunk.split_to(size));
        }
        if !chunk.has_remaining() {
            return None;
        }

        // Grow with the bytes actually received; `size` comes from the peer.
        let take = (size - self.pending.len()).min(chunk.len());
        self.pending.reserve(take);
        self.pending.put_slice(&chunk[..take]);
        chunk.advance(take);

        (self.pending.len() == size).then(|| self.pending.split().freeze())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::codec::{pack, pack_legacy, Address, Descriptor, Payload};
    use crate::service::ServiceTag;

    fn descriptor() -> Descriptor {
        Descriptor::new(Address::new("IPv4", "127.0.1.1", 4321))
            .with_service("foo-https")
            .with_serviceport(443)
            .with_name("foo.example.com")
    }

    fn collecting() -> (Assembler, Arc<Mutex<Vec<Message>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = |seen: &Arc<Mutex<Vec<Message>>>| {
            let seen = Arc::clone(seen);
            move |message: Message| seen.lock().unwrap().push(message)
        };
        let handlers = Handlers::new(record(&seen))
            .on_connection(record(&seen))
            .on_control(record(&seen))
            .on_error(record(&seen))
            .on_end(record(&seen));
        (Assembler::new(handlers), seen)
    }

    fn stream() -> (Vec<u8>, Vec<u8>) {
        let body: Vec<u8> = (0..199u32).map(|i| (i % 251) as u8).collect();
        let mut wire = Vec::new();
        wire.extend_from_slice(&pack(&descriptor(), None, Some(ServiceTag::Connection)).unwrap());
        wire.extend_from_slice(&pack(&descriptor(), Some(Payload::from(body.clone())), None).unwrap());
        wire.extend_from_slice(&pack(&descriptor(), None, Some(ServiceTag::End)).unwrap());
        (wire, body)
    }

    fn assert_scenario(messages: &[Message], body: &[u8]) {
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].tag, ServiceTag::Connection);
        assert_eq!(messages[0].service, "foo-https");
        assert_eq!(messages[1].tag, ServiceTag::Data);
        assert_eq!(messages[1].body.as_ref(), body);
        assert_eq!(messages[2].tag, ServiceTag::End);
        assert!(messages[2].body.is_empty());
    }

    #[test]
    fn whole_buffer() {
        let (wire, body) = stream();
        let (mut assembler, seen) = collecting();

        assembler.push(Bytes::from(wire));

        assert_scenario(&seen.lock().unwrap(), &body);
        assert!(assembler.is_idle());
        assert_eq!(assembler.dispatched(), 3);
    }

    #[test]
    fn one_byte_at_a_time() {
        let (wire, body) = stream();
        let (mut assembler, seen) = collecting();

        for byte in &wire {
            assembler.push_slice(std::slice::from_ref(byte));
        }

        assert_scenario(&seen.lock().unwrap(), &body);
        assert!(assembler.is_idle());
    }

    #[test]
    fn overlapping_slices_across_two_copies() {
        let (mut wire, _) = stream();
        let (mut assembler, seen) = collecting();
        let copy = wire.clone();
        wire.extend_from_slice(&copy);

        let cuts = [0, 7, 14, 21, 28, 217, 224, 238, wire.len()];
        for pair in cuts.windows(2) {
            assembler.push(Bytes::copy_from_slice(&wire[pair[0]..pair[1]]));
        }

        assert_eq!(seen.lock().unwrap().len(), 6);
        assert!(assembler.is_idle());
    }

    #[test]
    fn frame_waits_for_full_body() {
        let wire = pack(&descriptor(), Some(Payload::from(vec![1u8; 50])), None).unwrap();
        let (mut assembler, seen) = collecting();

        assembler.push(wire.slice(..wire.len() - 1));
        assert!(seen.lock().unwrap().is_empty());
        assert!(!assembler.is_idle());

        assembler.push(wire.slice(wire.len() - 1..));
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(assembler.is_idle());
    }

    #[test]
    fn zero_body_dispatches_without_more_input() {
        let wire = pack(&descriptor(), None, Some(ServiceTag::End)).unwrap();
        let (mut assembler, seen) = collecting();

        assembler.push(wire);

        let messages = seen.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].tag, ServiceTag::End);
        assert!(messages[0].body.is_empty());
        assert!(assembler.is_idle());
    }

    #[test]
    fn zero_length_header_completes_frame() {
        let (mut assembler, seen) = collecting();

        assembler.push_slice(&[254, 0]);

        let messages = seen.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].tag, ServiceTag::Data);
        assert!(assembler.is_idle());
    }

    #[test]
    fn single_chunk_body_is_not_copied() {
        let wire = pack(&descriptor(), Some(Payload::from(vec![9u8; 64])), None).unwrap();
        let body_start = wire.len() - 64;
        let body_ptr = wire[body_start..].as_ptr();
        let (mut assembler, seen) = collecting();

        assembler.push(wire);

        let messages = seen.lock().unwrap();
        assert_eq!(messages[0].body.as_ptr(), body_ptr);
    }

    #[test]
    fn leftover_bytes_carry_into_next_frame() {
        let first = pack(&descriptor(), Some(Payload::from(&b"first"[..])), None).unwrap();
        let second = pack(&descriptor(), Some(Payload::from(&b"second"[..])), None).unwrap();
        let mut wire = first.to_vec();
        wire.extend_from_slice(&second[..3]);
        let (mut assembler, seen) = collecting();

        assembler.push_slice(&wire);
        assert_eq!(seen.lock().unwrap().len(), 1);

        assembler.push(second.slice(3..));
        let messages = seen.lock().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].body.as_ref(), b"second");
    }

    #[test]
    fn version_mismatch_keeps_parsing() {
        let mut wire = pack(&descriptor(), Some(Payload::from(&b"hi"[..])), None)
            .unwrap()
            .to_vec();
        wire[0] = 0x42;
        let (mut assembler, seen) = collecting();

        assembler.push_slice(&wire);

        assert_eq!(assembler.version_mismatches(), 1);
        let messages = seen.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].body.as_ref(), b"hi");
    }

    #[test]
    fn configured_version_is_checked() {
        let wire = pack(&descriptor(), None, Some(ServiceTag::End)).unwrap();
        let (handlers, _rx) = Handlers::channel();
        let mut assembler = Assembler::with_config(handlers, AssemblerConfig { version: 2 });

        assembler.push(wire);

        assert_eq!(assembler.version_mismatches(), 1);
        assert_eq!(assembler.dispatched(), 1);
    }

    #[test]
    fn error_frame_with_garbage_body() {
        let wire = pack(
            &descriptor(),
            Some(Payload::from(&b"\xffnot json"[..])),
            Some(ServiceTag::Error),
        )
        .unwrap();
        let (mut assembler, seen) = collecting();

        assembler.push(wire);

        let messages = seen.lock().unwrap();
        assert_eq!(messages[0].tag, ServiceTag::Error);
        let error = messages[0].error.as_ref().unwrap();
        assert_eq!(error.code, crate::message::UNKNOWN_ERROR_CODE);
        assert!(assembler.is_idle());
    }

    #[test]
    fn legacy_padded_frames_decode() {
        let mut wire = pack_legacy(&descriptor(), None, Some(ServiceTag::Connection))
            .unwrap()
            .to_vec();
        wire.extend_from_slice(&pack_legacy(&descriptor(), None, Some(ServiceTag::End)).unwrap());
        let (mut assembler, seen) = collecting();

        assembler.push_slice(&wire);

        let messages = seen.lock().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].body.as_ref(), b" ");
        assert_eq!(messages[1].tag, ServiceTag::End);
    }

    #[test]
    fn huge_declared_body_waits_for_bytes() {
        let header = b"IPv4,1.2.3.4,5,18446744073709551615,https,443,x";
        let mut wire = vec![version_byte(PROTOCOL_VERSION), header.len() as u8];
        wire.extend_from_slice(header);
        wire.extend_from_slice(b"abc");
        let (mut assembler, seen) = collecting();

        assembler.push_slice(&wire);
        assembler.push_slice(b"more");

        assert!(!assembler.is_idle());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn large_declared_body_is_not_reserved_up_front() {
        let header = b"IPv4,1.2.3.4,5,1099511627776,https,443,x";
        let mut wire = vec![version_byte(PROTOCOL_VERSION), header.len() as u8];
        wire.extend_from_slice(header);
        wire.extend_from_slice(&[7u8; 16]);
        let (mut assembler, _seen) = collecting();

        assembler.push_slice(&wire);

        assert!(!assembler.is_idle());
        assert!(assembler.pending.capacity() < 1 << 20);
    }

    #[test]
    fn empty_push_is_harmless() {
        let (mut assembler, seen) = collecting();
        assembler.push(Bytes::new());
        assert!(assembler.is_idle());
        assert!(seen.lock().unwrap().is_empty());
    }
}

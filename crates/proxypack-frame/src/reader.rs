use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use tracing::debug;

use crate::assembler::Assembler;
use crate::dispatch::Handlers;
use crate::error::{FrameError, Result};

const DEFAULT_READ_CHUNK_SIZE: usize = 8 * 1024;

/// Configuration for [`FrameReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Upper bound on the bytes requested from the source per read.
    pub read_chunk_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }
}

/// Feeds a blocking byte source into an [`Assembler`].
///
/// Each successful read becomes one delivery; messages are dispatched to the
/// assembler's handlers as soon as their last byte arrives.
pub struct FrameReader<T> {
    inner: T,
    assembler: Assembler,
    config: ReaderConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a reader dispatching to `handlers`.
    pub fn new(inner: T, handlers: Handlers) -> Self {
        Self::with_assembler(inner, Assembler::new(handlers), ReaderConfig::default())
    }

    /// Create a reader around an existing assembler.
    pub fn with_assembler(inner: T, assembler: Assembler, config: ReaderConfig) -> Self {
        Self {
            inner,
            assembler,
            config,
        }
    }

    /// Perform one read and hand the bytes to the assembler.
    ///
    /// Returns the number of bytes read; `0` means end of stream.
    pub fn read_chunk(&mut self) -> Result<usize> {
        let mut chunk = BytesMut::zeroed(self.config.read_chunk_size.max(1));
        loop {
            match self.inner.read(&mut chunk) {
                Ok(read) => {
                    chunk.truncate(read);
                    if read > 0 {
                        self.assembler.push(chunk.freeze());
                    }
                    return Ok(read);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Read until end of stream.
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` if the stream ends in the
    /// middle of a frame.
    pub fn run(&mut self) -> Result<()> {
        while self.read_chunk()? > 0 {}

        if !self.assembler.is_idle() {
            debug!(
                dispatched = self.assembler.dispatched(),
                "stream ended mid-frame"
            );
            return Err(FrameError::ConnectionClosed);
        }
        Ok(())
    }

    /// Borrow the assembler.
    pub fn assembler(&self) -> &Assembler {
        &self.assembler
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream and assembler.
    pub fn into_parts(self) -> (T, Assembler) {
        (self.inner, self.assembler)
    }

    /// Current reader configuration.
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;

    use super::*;
    use crate::codec::{encode_frame, Address, Descriptor};
    use crate::message::Message;
    use crate::service::ServiceTag;

    fn descriptor() -> Descriptor {
        Descriptor::new(Address::new("IPv4", "192.168.1.20", 50123))
            .with_service("ssh")
            .with_serviceport(22)
    }

    fn wire() -> Vec<u8> {
        let mut wire = BytesMut::new();
        encode_frame(&descriptor(), b"", Some(ServiceTag::Connection), &mut wire).unwrap();
        encode_frame(&descriptor(), b"SSH-2.0-OpenSSH_9.6\r\n", None, &mut wire).unwrap();
        encode_frame(&descriptor(), b"", Some(ServiceTag::End), &mut wire).unwrap();
        wire.to_vec()
    }

    #[test]
    fn reads_all_frames() {
        let (handlers, rx) = Handlers::channel();
        let mut reader = FrameReader::new(Cursor::new(wire()), handlers);

        reader.run().unwrap();

        let tags: Vec<ServiceTag> = rx.try_iter().map(|m| m.tag).collect();
        assert_eq!(
            tags,
            vec![ServiceTag::Connection, ServiceTag::Data, ServiceTag::End]
        );
        assert_eq!(reader.assembler().dispatched(), 3);
    }

    #[test]
    fn partial_read_handling() {
        let (handlers, rx) = Handlers::channel();
        let byte_reader = ByteByByteReader {
            bytes: wire(),
            pos: 0,
        };
        let mut reader = FrameReader::new(byte_reader, handlers);

        reader.run().unwrap();

        let messages: Vec<Message> = rx.try_iter().collect();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].body.as_ref(), b"SSH-2.0-OpenSSH_9.6\r\n");
        assert_eq!(messages[1].service, "ssh");
    }

    #[test]
    fn small_read_chunks() {
        let (handlers, rx) = Handlers::channel();
        let config = ReaderConfig { read_chunk_size: 5 };
        let mut reader =
            FrameReader::with_assembler(Cursor::new(wire()), Assembler::new(handlers), config);

        reader.run().unwrap();

        assert_eq!(rx.try_iter().count(), 3);
    }

    #[test]
    fn connection_closed_cleanly() {
        let (handlers, _rx) = Handlers::channel();
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()), handlers);
        reader.run().unwrap();
    }

    #[test]
    fn connection_closed_mid_frame() {
        let (handlers, rx) = Handlers::channel();
        let mut partial = wire();
        partial.truncate(partial.len() - 3);
        let mut reader = FrameReader::new(Cursor::new(partial), handlers);

        let err = reader.run().unwrap_err();

        assert!(matches!(err, FrameError::ConnectionClosed));
        assert_eq!(rx.try_iter().count(), 2);
    }

    #[test]
    fn interrupted_read_retries() {
        let (handlers, rx) = Handlers::channel();
        let reader = InterruptedThenData {
            interrupted: false,
            inner: Cursor::new(wire()),
        };
        let mut framed = FrameReader::new(reader, handlers);

        framed.run().unwrap();
        assert_eq!(rx.try_iter().count(), 3);
    }

    #[test]
    fn read_error_propagates() {
        let (handlers, _rx) = Handlers::channel();
        let mut framed = FrameReader::new(FailingReader, handlers);

        let err = framed.read_chunk().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::ConnectionReset));
    }

    #[test]
    fn accessors_and_into_parts() {
        let (handlers, _rx) = Handlers::channel();
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()), handlers);

        let _ = reader.get_ref();
        let _ = reader.get_mut();
        assert_eq!(reader.config().read_chunk_size, DEFAULT_READ_CHUNK_SIZE);
        let (_inner, assembler) = reader.into_parts();
        assert!(assembler.is_idle());
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }

            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::ConnectionReset))
        }
    }
}

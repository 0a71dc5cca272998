use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_into, Descriptor, PackOptions, Payload};
use crate::error::{FrameError, Result};
use crate::message::ErrorBody;
use crate::service::ServiceTag;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes frames for one sub-connection to any `Write` stream.
///
/// Every payload written through [`Write`] becomes one data frame carrying
/// the bound descriptor.
pub struct FrameWriter<T> {
    inner: T,
    descriptor: Descriptor,
    buf: BytesMut,
    legacy_padding: bool,
}

impl<T: Write> FrameWriter<T> {
    /// Create a writer for the sub-connection described by `descriptor`.
    pub fn new(inner: T, descriptor: Descriptor) -> Self {
        Self {
            inner,
            descriptor,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            legacy_padding: false,
        }
    }

    /// Pad empty bodies to one byte for peers running the older decoder.
    pub fn with_legacy_padding(mut self, legacy_padding: bool) -> Self {
        self.legacy_padding = legacy_padding;
        self
    }

    /// Encode and send a data frame.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.send_tagged(None, Some(Payload::from(payload)))
    }

    /// Encode and send a frame with an explicit service tag.
    pub fn send_tagged(
        &mut self,
        service: Option<ServiceTag>,
        payload: Option<Payload>,
    ) -> Result<()> {
        let options = PackOptions {
            include_body: true,
            legacy_padding: self.legacy_padding,
        };

        self.buf.clear();
        encode_into(&self.descriptor, payload, service, options, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush_inner()
    }

    /// Announce the sub-connection and its service.
    pub fn send_connection(&mut self) -> Result<()> {
        self.send_tagged(Some(ServiceTag::Connection), None)
    }

    /// Close the sub-connection.
    pub fn send_end(&mut self) -> Result<()> {
        self.send_tagged(Some(ServiceTag::End), None)
    }

    pub fn send_pause(&mut self) -> Result<()> {
        self.send_tagged(Some(ServiceTag::Pause), None)
    }

    pub fn send_resume(&mut self) -> Result<()> {
        self.send_tagged(Some(ServiceTag::Resume), None)
    }

    /// Report an application error for the sub-connection.
    pub fn send_error(&mut self, error: &ErrorBody) -> Result<()> {
        self.send_tagged(Some(ServiceTag::Error), Some(error.to_payload()?))
    }

    /// Send a control frame. The bound address is not included.
    pub fn send_control(&mut self, payload: Option<Payload>) -> Result<()> {
        self.send_tagged(Some(ServiceTag::Control), payload)
    }

    fn flush_inner(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// The descriptor stamped on every frame.
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Write> Write for FrameWriter<T> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.send(buf).map_err(into_io_error)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner().map_err(into_io_error)
    }
}

fn into_io_error(err: FrameError) -> std::io::Error {
    match err {
        FrameError::Io(io) => io,
        FrameError::ConnectionClosed => std::io::Error::from(ErrorKind::WriteZero),
        other => std::io::Error::other(other),
    }
}

//! Delivery of assembled messages to per-channel handlers.

use std::fmt;
use std::sync::mpsc;

use tracing::{debug, trace};

use crate::message::Message;
use crate::service::ServiceTag;

/// Callback invoked with each message delivered on a channel.
pub type Handler = Box<dyn FnMut(Message) + Send>;

/// One handler per channel.
///
/// Only the data handler is mandatory. A missing connection handler drops
/// connection messages; every other missing handler falls back to the data
/// handler.
pub struct Handlers {
    data: Handler,
    control: Option<Handler>,
    connection: Option<Handler>,
    error: Option<Handler>,
    end: Option<Handler>,
    pause: Option<Handler>,
    resume: Option<Handler>,
}

impl Handlers {
    /// Create a handler set with only the data handler installed.
    pub fn new(on_data: impl FnMut(Message) + Send + 'static) -> Self {
        Self {
            data: Box::new(on_data),
            control: None,
            connection: None,
            error: None,
            end: None,
            pause: None,
            resume: None,
        }
    }

    /// Handle control frames.
    pub fn on_control(mut self, handler: impl FnMut(Message) + Send + 'static) -> Self {
        self.control = Some(Box::new(handler));
        self
    }

    /// Handle sub-connection openings.
    pub fn on_connection(mut self, handler: impl FnMut(Message) + Send + 'static) -> Self {
        self.connection = Some(Box::new(handler));
        self
    }

    /// Handle application error frames.
    pub fn on_error(mut self, handler: impl FnMut(Message) + Send + 'static) -> Self {
        self.error = Some(Box::new(handler));
        self
    }

    /// Handle sub-connection closings.
    pub fn on_end(mut self, handler: impl FnMut(Message) + Send + 'static) -> Self {
        self.end = Some(Box::new(handler));
        self
    }

    pub fn on_pause(mut self, handler: impl FnMut(Message) + Send + 'static) -> Self {
        self.pause = Some(Box::new(handler));
        self
    }

    pub fn on_resume(mut self, handler: impl FnMut(Message) + Send + 'static) -> Self {
        self.resume = Some(Box::new(handler));
        self
    }

    /// Handler set that forwards every channel, connection included, into `tx`.
    ///
    /// Messages sent after the receiver is dropped are discarded.
    pub fn forward_to(tx: mpsc::Sender<Message>) -> Self {
        let forward = |tx: &mpsc::Sender<Message>| {
            let tx = tx.clone();
            move |message: Message| {
                if tx.send(message).is_err() {
                    trace!("message receiver dropped; discarding message");
                }
            }
        };

        Self::new(forward(&tx))
            .on_control(forward(&tx))
            .on_connection(forward(&tx))
            .on_error(forward(&tx))
            .on_end(forward(&tx))
            .on_pause(forward(&tx))
            .on_resume(forward(&tx))
    }

    /// Handler set paired with a receiver yielding every message in arrival
    /// order.
    pub fn channel() -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel();
        (Self::forward_to(tx), rx)
    }

    /// Deliver a message on the channel selected by its tag.
    pub fn dispatch(&mut self, message: Message) {
        if message.tag.is_lifecycle() {
            debug!(
                channel = %message.tag,
                id = %message.addr,
                service = %message.service,
                "sub-connection event"
            );
        } else {
            trace!(
                channel = %message.tag,
                id = %message.addr,
                len = message.body.len(),
                "dispatching message"
            );
        }

        let slot = match message.tag {
            ServiceTag::Data => return (self.data)(message),
            ServiceTag::Connection => {
                if let Some(handler) = self.connection.as_mut() {
                    handler(message);
                }
                return;
            }
            ServiceTag::Control => &mut self.control,
            ServiceTag::Error => &mut self.error,
            ServiceTag::End => &mut self.end,
            ServiceTag::Pause => &mut self.pause,
            ServiceTag::Resume => &mut self.resume,
        };

        match slot {
            Some(handler) => handler(message),
            None => (self.data)(message),
        }
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("control", &self.control.is_some())
            .field("connection", &self.connection.is_some())
            .field("error", &self.error.is_some())
            .field("end", &self.end.is_some())
            .field("pause", &self.pause.is_some())
            .field("resume", &self.resume.is_some())
            .finish_non_exhaustive()
    }
}

//! Service tags and the delivery channels they map to.
//!
//! Every frame names a service in its header. Seven names are reserved and
//! select a dedicated channel; any other name (`https`, `ssh`, ...) is payload
//! for an application service and is delivered on the data channel.

use std::fmt;

/// Connection management that is not tied to a sub-connection.
pub const CONTROL: &str = "control";

/// Opening of a sub-connection.
pub const CONNECTION: &str = "connection";

/// Ordinary payload bytes.
pub const DATA: &str = "data";

/// Application-level error report for a sub-connection.
pub const ERROR: &str = "error";

/// Closing of a sub-connection.
pub const END: &str = "end";

/// Ask the other side to stop sending for a sub-connection.
pub const PAUSE: &str = "pause";

/// Ask the other side to resume sending for a sub-connection.
pub const RESUME: &str = "resume";

/// The closed set of delivery channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ServiceTag {
    Control,
    Connection,
    #[default]
    Data,
    Error,
    End,
    Pause,
    Resume,
}

impl ServiceTag {
    /// All tags, in wire-name order of the reserved list.
    pub const ALL: [ServiceTag; 7] = [
        ServiceTag::Control,
        ServiceTag::Connection,
        ServiceTag::Data,
        ServiceTag::Error,
        ServiceTag::End,
        ServiceTag::Pause,
        ServiceTag::Resume,
    ];

    /// The name written in the header for this tag.
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceTag::Control => CONTROL,
            ServiceTag::Connection => CONNECTION,
            ServiceTag::Data => DATA,
            ServiceTag::Error => ERROR,
            ServiceTag::End => END,
            ServiceTag::Pause => PAUSE,
            ServiceTag::Resume => RESUME,
        }
    }

    /// Map a header service field to its channel.
    ///
    /// Unreserved names (including the empty string) land on [`ServiceTag::Data`].
    pub fn from_wire(name: &str) -> Self {
        match name {
            CONTROL => ServiceTag::Control,
            CONNECTION => ServiceTag::Connection,
            ERROR => ServiceTag::Error,
            END => ServiceTag::End,
            PAUSE => ServiceTag::Pause,
            RESUME => ServiceTag::Resume,
            _ => ServiceTag::Data,
        }
    }

    /// Returns true for tags that describe the lifecycle of a sub-connection
    /// rather than carrying its bytes.
    pub fn is_lifecycle(self) -> bool {
        matches!(
            self,
            ServiceTag::Connection | ServiceTag::End | ServiceTag::Pause | ServiceTag::Resume
        )
    }
}

impl fmt::Display for ServiceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

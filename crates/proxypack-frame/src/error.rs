/// Errors that can occur while encoding frames or moving them over a stream.
///
/// Decoding never fails: the assembler recovers locally from every malformed
/// input, so none of these variants is produced by [`crate::Assembler`].
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The comma-joined header does not fit in the one-byte length field.
    #[error("frame header too long ({len} bytes, max {max})")]
    HeaderTooLong { len: usize, max: usize },

    /// A header field contains a comma and would split into two fields.
    #[error("invalid {field} field {value:?}: commas are not allowed in header fields")]
    InvalidField { field: &'static str, value: String },

    /// A structured payload could not be serialized.
    #[error("payload serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended before the frame in progress was complete.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;

/// Errors that can occur while inspecting a transport endpoint.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The endpoint could not report its remote address.
    #[error("failed to read remote address: {0}")]
    RemoteAddr(std::io::Error),

    /// The endpoint could not report its local address.
    #[error("failed to read local address: {0}")]
    LocalAddr(std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;

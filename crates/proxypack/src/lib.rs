//! Multiplex many proxied client connections over one tunnel byte stream.
//!
//! A reverse proxy in front of a backend relays every accepted client
//! connection through a single link. Each piece of each client connection
//! travels as a self-delimiting frame tagged with the client's address, so
//! the backend can rebuild the individual connections.
//!
//! # Crate Structure
//!
//! - [`transport`]: Remote/local address discovery for accepted endpoints
//! - [`frame`]: Frame format, encoder, incremental assembler and channel dispatch

/// Re-export transport types.
pub mod transport {
    pub use proxypack_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use proxypack_frame::*;
}

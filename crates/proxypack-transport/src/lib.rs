//! Endpoint address discovery for tunnel sub-connections.
//!
//! The framing layer identifies every logical sub-connection by the remote
//! family/address/port of the client that opened it, plus the local port it
//! arrived on. This crate reads those values from a connected endpoint:
//! - [`std::net::TcpStream`]
//! - `tokio::net::TcpStream` (behind the `async` feature)
//!
//! Moving bytes in and out of the endpoint is left to the caller.

pub mod endpoint;
pub mod error;

pub use endpoint::{addr_to_id, socket_to_addr, socket_to_id, EndpointAddr, EndpointInfo};
pub use error::{Result, TransportError};

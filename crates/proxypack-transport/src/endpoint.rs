use std::net::{IpAddr, SocketAddr};

use tracing::trace;

use crate::error::{Result, TransportError};

/// A connected endpoint that can report both ends of its connection.
pub trait EndpointAddr {
    /// Address of the peer on the other side of the connection.
    fn remote_addr(&self) -> std::io::Result<SocketAddr>;

    /// Address this side of the connection is bound to.
    fn local_addr(&self) -> std::io::Result<SocketAddr>;
}

impl EndpointAddr for std::net::TcpStream {
    fn remote_addr(&self) -> std::io::Result<SocketAddr> {
        self.peer_addr()
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        std::net::TcpStream::local_addr(self)
    }
}

#[cfg(feature = "async")]
impl EndpointAddr for tokio::net::TcpStream {
    fn remote_addr(&self) -> std::io::Result<SocketAddr> {
        self.peer_addr()
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        tokio::net::TcpStream::local_addr(self)
    }
}

/// Identity of a sub-connection as seen from the accepting side.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointInfo {
    /// `IPv4` or `IPv6`.
    pub family: String,
    /// Remote IP address in its canonical text form.
    pub address: String,
    /// Remote port.
    pub port: u16,
    /// Local port the connection was accepted on.
    pub serviceport: u16,
}

impl EndpointInfo {
    /// Build endpoint info from a remote socket address and local port.
    pub fn from_parts(remote: SocketAddr, serviceport: u16) -> Self {
        Self {
            family: family_name(remote.ip()).to_string(),
            address: remote.ip().to_string(),
            port: remote.port(),
            serviceport,
        }
    }

    /// The `family,address,port` identity string.
    pub fn id(&self) -> String {
        addr_to_id(&self.family, &self.address, self.port)
    }
}

/// Returns the family name used on the wire for an IP address.
pub fn family_name(ip: IpAddr) -> &'static str {
    match ip {
        IpAddr::V4(_) => "IPv4",
        IpAddr::V6(_) => "IPv6",
    }
}

/// Read the remote family/address/port and the local port of an endpoint.
pub fn socket_to_addr<E: EndpointAddr + ?Sized>(endpoint: &E) -> Result<EndpointInfo> {
    let remote = endpoint
        .remote_addr()
        .map_err(TransportError::RemoteAddr)?;
    let local = endpoint.local_addr().map_err(TransportError::LocalAddr)?;
    trace!(%remote, %local, "resolved endpoint addresses");
    Ok(EndpointInfo::from_parts(remote, local.port()))
}

/// Join an address triple into the `family,address,port` identity string.
pub fn addr_to_id(family: &str, address: &str, port: u16) -> String {
    format!("{family},{address},{port}")
}

/// Identity string of a connected endpoint.
pub fn socket_to_id<E: EndpointAddr + ?Sized>(endpoint: &E) -> Result<String> {
    socket_to_addr(endpoint).map(|info| info.id())
}

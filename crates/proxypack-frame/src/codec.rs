use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use proxypack_transport::EndpointInfo;
use serde::Serialize;
use tracing::debug;

use crate::error::{FrameError, Result};
use crate::service::{ServiceTag, CONNECTION, CONTROL};

/// Protocol version spoken by this crate.
pub const PROTOCOL_VERSION: u8 = 1;

/// Version byte + header-length byte.
pub const PREFIX_SIZE: usize = 2;

/// The header length travels in a single byte.
pub const MAX_HEADER_LEN: usize = u8::MAX as usize;

/// Body written in place of an empty payload when legacy padding is requested.
pub const LEGACY_PADDING: &[u8] = b" ";

/// The byte that opens every frame of the given protocol version.
///
/// Versions are complemented so the first byte of a frame sits at the top of
/// the byte range, away from printable text.
pub const fn version_byte(version: u8) -> u8 {
    u8::MAX - version
}

/// Identity of a logical sub-connection on the shared link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Address {
    /// `IPv4` or `IPv6` for real sub-connections; empty on control frames.
    pub family: String,
    /// Remote address of the client.
    pub address: String,
    /// Remote port of the client.
    pub port: Option<u16>,
}

impl Address {
    /// Create an address for a remote client.
    pub fn new(family: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            family: family.into(),
            address: address.into(),
            port: Some(port),
        }
    }

    /// Returns true when no field is set (control frames).
    pub fn is_empty(&self) -> bool {
        self.family.is_empty() && self.address.is_empty() && self.port.is_none()
    }

    /// The `family,address,port` identity string used to key sub-connections.
    pub fn id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},", self.family, self.address)?;
        if let Some(port) = self.port {
            write!(f, "{port}")?;
        }
        Ok(())
    }
}

/// Everything the encoder needs to know about the sub-connection a frame
/// belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Descriptor {
    pub addr: Address,
    /// Application service (`https`, `ssh`, ...). Announced on connection frames.
    pub service: Option<String>,
    /// Local port the client connected to.
    pub serviceport: Option<u16>,
    /// Server name, usually taken from SNI or the `Host` header.
    pub name: Option<String>,
}

impl Descriptor {
    /// Create a descriptor for an address with no service details.
    pub fn new(addr: Address) -> Self {
        Self {
            addr,
            ..Self::default()
        }
    }

    /// Build a descriptor from the two ends of an accepted connection.
    pub fn from_endpoint(info: &EndpointInfo) -> Self {
        Self {
            addr: Address::new(info.family.clone(), info.address.clone(), info.port),
            service: None,
            serviceport: Some(info.serviceport),
            name: None,
        }
    }

    /// Set the application service.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Set the local service port.
    pub fn with_serviceport(mut self, serviceport: u16) -> Self {
        self.serviceport = Some(serviceport);
        self
    }

    /// Set the server name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl From<EndpointInfo> for Descriptor {
    fn from(info: EndpointInfo) -> Self {
        Self::from_endpoint(&info)
    }
}

/// Frame body before encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Bytes written to the wire unchanged.
    Raw(Bytes),
    /// Structured value, written as its JSON text.
    Json(serde_json::Value),
}

impl Payload {
    /// Capture any serializable value as a structured payload.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Payload::Json(serde_json::to_value(value)?))
    }

    /// The bytes that go on the wire.
    pub fn into_bytes(self) -> Result<Bytes> {
        match self {
            Payload::Raw(bytes) => Ok(bytes),
            Payload::Json(value) => Ok(Bytes::from(serde_json::to_vec(&value)?)),
        }
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Payload::Raw(bytes)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Raw(Bytes::from(bytes))
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::Raw(Bytes::copy_from_slice(bytes))
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Json(value)
    }
}

/// Encoder switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackOptions {
    /// Append the body after the header. When false only the header is
    /// produced and the caller streams the declared body bytes itself.
    pub include_body: bool,
    /// Replace an empty body with a single space, for peers running the older
    /// decoder that cannot handle zero-length bodies.
    pub legacy_padding: bool,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            include_body: true,
            legacy_padding: false,
        }
    }
}

/// The header of one frame, as written or as parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameHeader {
    pub addr: Address,
    pub body_len: usize,
    /// Raw service field.
    pub service: String,
    pub serviceport: Option<u16>,
    pub name: String,
    /// Sub-service announced by a connection frame.
    pub announced: Option<String>,
}

impl FrameHeader {
    /// Header for a frame about `desc` carrying `body_len` bytes.
    ///
    /// `service` overrides the descriptor's own service: `Control` drops the
    /// address entirely, `Connection` announces the descriptor's service, any
    /// other tag replaces the service field.
    pub fn new(desc: &Descriptor, body_len: usize, service: Option<ServiceTag>) -> Self {
        let mut header = Self {
            addr: desc.addr.clone(),
            body_len,
            service: desc.service.clone().unwrap_or_default(),
            serviceport: desc.serviceport,
            name: desc.name.clone().unwrap_or_default(),
            announced: None,
        };

        match service {
            Some(ServiceTag::Control) => {
                header = Self {
                    body_len,
                    service: CONTROL.to_string(),
                    ..Self::default()
                };
            }
            Some(ServiceTag::Connection) => {
                header.announced = Some(std::mem::replace(
                    &mut header.service,
                    CONNECTION.to_string(),
                ));
            }
            Some(tag) => header.service = tag.as_str().to_string(),
            None => {}
        }

        header
    }

    /// The channel this header selects on the wire.
    pub fn tag(&self) -> ServiceTag {
        ServiceTag::from_wire(&self.service)
    }

    /// The service consumers see: the announced sub-service for connection
    /// frames, the service field otherwise.
    pub fn effective_service(&self) -> &str {
        match self.tag() {
            ServiceTag::Connection => self.announced.as_deref().unwrap_or(""),
            _ => &self.service,
        }
    }

    /// Render the comma-separated header text.
    pub fn render(&self) -> Result<String> {
        let tag = self.tag();
        if tag == ServiceTag::Control {
            return Ok(format!(",,,{},{CONTROL}", self.body_len));
        }

        check_field("family", &self.addr.family)?;
        check_field("address", &self.addr.address)?;
        check_field("service", &self.service)?;
        check_field("name", &self.name)?;

        let mut text = format!(
            "{},{},{},{},{},{},{}",
            self.addr.family,
            self.addr.address,
            optional_port(self.addr.port),
            self.body_len,
            self.service,
            optional_port(self.serviceport),
            self.name,
        );

        if tag == ServiceTag::Connection {
            let announced = self.announced.as_deref().unwrap_or("");
            check_field("announced service", announced)?;
            text.push(',');
            text.push_str(announced);
        }

        Ok(text)
    }

    /// Parse header text received from the wire.
    ///
    /// Parsing is lenient: missing fields are empty, ports that do not parse
    /// are absent and an unreadable body length counts as zero.
    pub fn parse(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        let mut fields = text.split(',');
        let mut next = || fields.next().unwrap_or("");

        let family = next().to_string();
        let address = next().to_string();
        let port = parse_port("port", next());
        let body_len = parse_body_len(next());
        let service = next().to_string();
        let serviceport = parse_port("serviceport", next());
        let name = next().to_string();
        let announced = (service == CONNECTION).then(|| next().to_string());

        Self {
            addr: Address {
                family,
                address,
                port,
            },
            body_len,
            service,
            serviceport,
            name,
            announced,
        }
    }
}

fn check_field(field: &'static str, value: &str) -> Result<()> {
    if value.contains(',') {
        return Err(FrameError::InvalidField {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

fn optional_port(port: Option<u16>) -> String {
    port.map(|port| port.to_string()).unwrap_or_default()
}

fn parse_port(field: &str, value: &str) -> Option<u16> {
    if value.is_empty() {
        return None;
    }
    match value.parse() {
        Ok(port) => Some(port),
        Err(_) => {
            debug!(field, value, "ignoring unparseable port in frame header");
            None
        }
    }
}

/// Leading decimal digits of the field; anything unreadable is zero.
fn parse_body_len(value: &str) -> usize {
    let value = value.trim_start();
    let end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    value[..end].parse().unwrap_or(0)
}

/// Write the version byte, header length and header text.
fn put_header(header: &FrameHeader, dst: &mut BytesMut) -> Result<()> {
    let text = header.render()?;
    if text.len() > MAX_HEADER_LEN {
        return Err(FrameError::HeaderTooLong {
            len: text.len(),
            max: MAX_HEADER_LEN,
        });
    }

    dst.reserve(PREFIX_SIZE + text.len());
    dst.put_u8(version_byte(PROTOCOL_VERSION));
    dst.put_u8(text.len() as u8);
    dst.put_slice(text.as_bytes());
    Ok(())
}

/// Encode only the header of a frame that declares `body_len` body bytes.
///
/// The caller must write exactly `body_len` bytes right after it.
pub fn encode_header(
    desc: &Descriptor,
    body_len: usize,
    service: Option<ServiceTag>,
    dst: &mut BytesMut,
) -> Result<()> {
    put_header(&FrameHeader::new(desc, body_len, service), dst)
}

/// Encode a self-contained frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌─────────────┬────────────┬──────────────────────────┬──────────────┐
/// │ Version     │ Header len │ Header (ASCII, CSV)      │ Body         │
/// │ 255 - v     │ (1B)       │ family,address,port,     │ (bodyLength  │
/// │ (1B)        │            │ bodyLength,service,...   │  bytes)      │
/// └─────────────┴────────────┴──────────────────────────┴──────────────┘
/// ```
pub fn encode_frame(
    desc: &Descriptor,
    body: &[u8],
    service: Option<ServiceTag>,
    dst: &mut BytesMut,
) -> Result<()> {
    encode_header(desc, body.len(), service, dst)?;
    dst.put_slice(body);
    Ok(())
}

/// Encode a frame with explicit options into `dst`.
pub fn encode_into(
    desc: &Descriptor,
    payload: Option<Payload>,
    service: Option<ServiceTag>,
    options: PackOptions,
    dst: &mut BytesMut,
) -> Result<()> {
    let mut body = match payload {
        Some(payload) => payload.into_bytes()?,
        None => Bytes::new(),
    };
    if options.legacy_padding && body.is_empty() {
        body = Bytes::from_static(LEGACY_PADDING);
    }

    encode_header(desc, body.len(), service, dst)?;
    if options.include_body {
        dst.put_slice(&body);
    }
    Ok(())
}

/// Encode a frame with explicit options.
pub fn pack_with(
    desc: &Descriptor,
    payload: Option<Payload>,
    service: Option<ServiceTag>,
    options: PackOptions,
) -> Result<Bytes> {
    let mut dst = BytesMut::new();
    encode_into(desc, payload, service, options, &mut dst)?;
    Ok(dst.freeze())
}

/// Encode a self-contained frame.
pub fn pack(
    desc: &Descriptor,
    payload: Option<Payload>,
    service: Option<ServiceTag>,
) -> Result<Bytes> {
    pack_with(desc, payload, service, PackOptions::default())
}

/// Encode a self-contained frame whose body is never empty.
pub fn pack_legacy(
    desc: &Descriptor,
    payload: Option<Payload>,
    service: Option<ServiceTag>,
) -> Result<Bytes> {
    pack_with(
        desc,
        payload,
        service,
        PackOptions {
            include_body: true,
            legacy_padding: true,
        },
    )
}

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::codec::{Address, Descriptor, FrameHeader, Payload};
use crate::error::Result;
use crate::service::ServiceTag;

/// Error code reported when an error frame body cannot be decoded.
pub const UNKNOWN_ERROR_CODE: &str = "E_UNKNOWN_ERR";

/// Structured body of an error frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default, deserialize_with = "lenient_string")]
    pub message: String,
    /// Peers send string codes (`ECONNREFUSED`) as well as numeric ones.
    #[serde(default, deserialize_with = "lenient_string")]
    pub code: String,
}

/// Accept any JSON value for a text field: strings as-is, null as empty,
/// everything else as its JSON text.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(text) => text,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

impl ErrorBody {
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
        }
    }

    /// Decode an error frame body, falling back to a synthesized record when
    /// the body is not a JSON object.
    pub fn decode(body: &[u8]) -> Self {
        match serde_json::from_slice(body) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(%err, len = body.len(), "malformed error frame body");
                let raw = serde_json::Value::String(String::from_utf8_lossy(body).into_owned());
                Self {
                    message: format!("e:{raw}"),
                    code: UNKNOWN_ERROR_CODE.to_string(),
                }
            }
        }
    }

    /// The payload to send in an error frame.
    pub fn to_payload(&self) -> Result<Payload> {
        Payload::json(self)
    }
}

/// One fully assembled frame, as handed to a channel handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub addr: Address,
    /// Channel the message is delivered on.
    pub tag: ServiceTag,
    /// Effective service. For connection frames this is the announced
    /// sub-service, otherwise the header's service field.
    pub service: String,
    pub serviceport: Option<u16>,
    pub name: String,
    pub body: Bytes,
    /// Parsed body, present on error frames only.
    pub error: Option<ErrorBody>,
}

impl Message {
    pub(crate) fn from_parts(header: FrameHeader, body: Bytes) -> Self {
        let tag = header.tag();
        let service = header.effective_service().to_string();
        let error = (tag == ServiceTag::Error).then(|| ErrorBody::decode(&body));

        Self {
            addr: header.addr,
            tag,
            service,
            serviceport: header.serviceport,
            name: header.name,
            body,
            error,
        }
    }

    /// The `family,address,port` identity of the originating sub-connection.
    pub fn id(&self) -> String {
        self.addr.id()
    }

    /// A descriptor for sending frames back on the same sub-connection.
    pub fn descriptor(&self) -> Descriptor {
        Descriptor {
            addr: self.addr.clone(),
            service: (!self.service.is_empty()).then(|| self.service.clone()),
            serviceport: self.serviceport,
            name: (!self.name.is_empty()).then(|| self.name.clone()),
        }
    }
}

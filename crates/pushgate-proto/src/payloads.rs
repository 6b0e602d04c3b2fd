//! Control payloads exchanged between clients and the gateway.
//!
//! Application messages are opaque to the gateway. Only the few control
//! frames the gateway itself answers (bind and error replies) have a schema,
//! and those are encoded as CBOR.

use bytes::Bytes;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::errors::{ProtocolError, Result};

/// Encode a control payload as CBOR.
pub fn to_cbor<T: Serialize>(value: &T) -> Result<Bytes> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)
        .map_err(|e| ProtocolError::PayloadEncode(e.to_string()))?;
    Ok(Bytes::from(buf))
}

/// Decode a control payload from CBOR.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::PayloadDecode(e.to_string()))
}

/// Request to bind a user identity to the sending connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindPayload {
    /// Application user identifier.
    pub user_id: String,

    /// Client kind (mobile, desktop, web...). Part of the routing key, so one
    /// user may hold one session per client type.
    pub client_type: u8,

    /// Optional device identifier, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl BindPayload {
    /// Encode as CBOR.
    pub fn encode(&self) -> Result<Bytes> {
        to_cbor(self)
    }

    /// Decode from CBOR.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        from_cbor(bytes)
    }
}

/// Machine-readable reason carried in an error reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum ErrorCode {
    /// Request requires a bound identity and the connection has none.
    NotBound = 1,
    /// Control payload could not be parsed.
    BadRequest = 2,
    /// Gateway could not complete the request.
    Internal = 3,
}

/// Body of an `Error` reply frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Machine-readable code.
    pub code: ErrorCode,

    /// Human-readable reason.
    pub reason: String,
}

impl ErrorPayload {
    /// Build an error body.
    pub fn new(code: ErrorCode, reason: impl Into<String>) -> Self {
        Self { code, reason: reason.into() }
    }

    /// Encode as CBOR.
    pub fn encode(&self) -> Result<Bytes> {
        to_cbor(self)
    }

    /// Decode from CBOR.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        from_cbor(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_payload_without_device() {
        let bind = BindPayload { user_id: "alice".into(), client_type: 1, device_id: None };
        let decoded = BindPayload::decode(&bind.encode().unwrap()).unwrap();
        assert_eq!(decoded, bind);
    }

    #[test]
    fn error_payload_keeps_code_and_reason() {
        let err = ErrorPayload::new(ErrorCode::NotBound, "not bind user");
        let decoded = ErrorPayload::decode(&err.encode().unwrap()).unwrap();
        assert_eq!(decoded.code, ErrorCode::NotBound);
        assert_eq!(decoded.reason, "not bind user");
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let result = BindPayload::decode(&[0xFF, 0x00, 0x13]);
        assert!(matches!(result, Err(ProtocolError::PayloadDecode(_))));
    }
}

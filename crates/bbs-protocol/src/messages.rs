use serde::{Deserialize, Serialize};

use crate::constants::{ENVELOPE_ERROR_PREFIX, ENVELOPE_OK_PREFIX};
use crate::error::ProtocolError;
use crate::types::ContentHash;

/// Result envelope handed to RPC-style callers.
///
/// Encodes as `[OK] <payload>` or `[ERROR] {"message": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Envelope {
    /// Success marker carrying a JSON payload.
    Ok(String),
    /// Error marker carrying a human-readable message.
    Error { message: String },
}

#[derive(Serialize, Deserialize)]
struct ErrorBody {
    message: String,
}

impl Envelope {
    /// Wrap a serializable payload in a success envelope.
    pub fn ok<T: Serialize>(payload: &T) -> Result<Self, ProtocolError> {
        Ok(Envelope::Ok(serde_json::to_string(payload)?))
    }

    pub fn error(message: impl std::fmt::Display) -> Self {
        Envelope::Error {
            message: message.to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Envelope::Ok(_))
    }

    /// Render the wire form.
    pub fn encode(&self) -> String {
        match self {
            Envelope::Ok(payload) => format!("{}{}", ENVELOPE_OK_PREFIX, payload),
            Envelope::Error { message } => {
                let body = ErrorBody {
                    message: message.clone(),
                };
                let data = serde_json::to_string_pretty(&body).unwrap_or_default();
                format!("{}{}", ENVELOPE_ERROR_PREFIX, data)
            }
        }
    }

    /// Parse the wire form produced by [`Envelope::encode`].
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        if let Some(payload) = raw.strip_prefix(ENVELOPE_OK_PREFIX) {
            return Ok(Envelope::Ok(payload.to_string()));
        }
        if let Some(data) = raw.strip_prefix(ENVELOPE_ERROR_PREFIX) {
            let body: ErrorBody = serde_json::from_str(data)?;
            return Ok(Envelope::Error {
                message: body.message,
            });
        }
        Err(ProtocolError::InvalidEnvelope(format!(
            "missing result marker in {:?}",
            raw.chars().take(16).collect::<String>()
        )))
    }

    /// Deserialize the payload of a success envelope.
    pub fn payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        match self {
            Envelope::Ok(payload) => Ok(serde_json::from_str(payload)?),
            Envelope::Error { message } => Err(ProtocolError::InvalidEnvelope(format!(
                "error envelope has no payload: {}",
                message
            ))),
        }
    }
}

/// Completion of an asynchronous request, keyed by the request's content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub hash: ContentHash,
    pub envelope: Envelope,
}

impl Response {
    pub fn new(hash: ContentHash, envelope: Envelope) -> Self {
        Self { hash, envelope }
    }
}

/// One line of the node's line-delimited RPC protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Echoed back in the reply.
    #[serde(default)]
    pub id: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Reply to an [`RpcRequest`]; `result` holds the encoded envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcReply {
    pub id: Option<String>,
    pub result: String,
}

impl RpcReply {
    pub fn new(id: Option<String>, envelope: &Envelope) -> Self {
        Self {
            id,
            result: envelope.encode(),
        }
    }

    pub fn envelope(&self) -> Result<Envelope, ProtocolError> {
        Envelope::decode(&self.result)
    }
}

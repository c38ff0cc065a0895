//! Wire-facing and internal types for the broker.
//!
//! Client-visible types use camelCase JSON serialization; nothing here
//! binds to a transport — an HTTP layer frames these directly.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cause of an `ErrorEvent`, carried through from a failed backend call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cause {
    /// Stable error code clients branch on.
    pub error_code: String,

    /// Human-readable description.
    pub description: String,

    /// Additional context, provider-specific.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, String>,
}

impl Cause {
    pub fn new(error_code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            description: description.into(),
            extra: HashMap::new(),
        }
    }
}

/// The terminal record for one submitted async request.
///
/// Tagged inline so the poll response mapper never needs to consult the
/// outstanding-request table to recover the concrete variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ClientEvent {
    DeployServiceEvent { id: u64, address: String },
    ExecuteServiceEvent { id: u64, address: String, output: serde_json::Value },
    ErrorEvent { id: u64, cause: Cause },
}

impl ClientEvent {
    /// The sequence number this event was assigned at submit time.
    pub fn id(&self) -> u64 {
        match self {
            ClientEvent::DeployServiceEvent { id, .. } => *id,
            ClientEvent::ExecuteServiceEvent { id, .. } => *id,
            ClientEvent::ErrorEvent { id, .. } => *id,
        }
    }
}

/// What kind of request produced an allocated id.
///
/// Kept purely for logging/tracing context and outstanding-table
/// bookkeeping — the concrete event variant is never reconstructed from
/// this at poll time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Deploy,
    Execute,
}

/// `POST /v0/api/service/deploy` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    pub data: String,
}

/// `POST /v0/api/service/execute` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub data: String,
    pub address: String,
}

/// Response to any async submit (`deploy`, `execute`): the allocated id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncResponse {
    pub id: u64,
}

/// `POST /v0/api/service/poll` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollRequest {
    pub offset: u64,

    #[serde(default)]
    pub count: u32,

    #[serde(default)]
    pub discard_previous: bool,
}

/// `POST /v0/api/service/poll` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub offset: u64,
    pub events: Vec<ClientEvent>,
}

/// `GET /v0/api/service/getCode` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCodeResponse {
    pub address: String,
    pub code: String,
}

/// `GET /v0/api/service/getExpiry` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetExpiryResponse {
    pub address: String,
    pub expiry: u64,
}

/// `GET /v0/api/service/getPublicKey` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPublicKeyResponse {
    pub timestamp: u64,
    pub address: String,
    pub public_key: String,
    pub signature: String,
}

/// Current time in Unix milliseconds.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_id() {
        let e = ClientEvent::DeployServiceEvent { id: 7, address: "0xabc".into() };
        assert_eq!(e.id(), 7);
    }

    #[test]
    fn test_error_event_tag_serialization() {
        let e = ClientEvent::ErrorEvent {
            id: 3,
            cause: Cause::new("BACKEND_UNAVAILABLE", "store unreachable"),
        };
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("\"errorCode\":\"BACKEND_UNAVAILABLE\""));

        let parsed: ClientEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id(), 3);
        assert!(matches!(parsed, ClientEvent::ErrorEvent { .. }));
    }

    #[test]
    fn test_execute_event_roundtrip() {
        let e = ClientEvent::ExecuteServiceEvent {
            id: 1,
            address: "0xdead".into(),
            output: serde_json::json!({"result": 42}),
        };
        let json = serde_json::to_string(&e).unwrap();
        let parsed: ClientEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id(), 1);
    }

    #[test]
    fn test_poll_request_defaults() {
        let json = r#"{"offset": 5}"#;
        let req: PollRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.offset, 5);
        assert_eq!(req.count, 0);
        assert!(!req.discard_previous);
    }

    #[test]
    fn test_cause_skips_empty_extra() {
        let c = Cause::new("X", "y");
        let json = serde_json::to_string(&c).unwrap();
        assert!(!json.contains("extra"));
    }
}

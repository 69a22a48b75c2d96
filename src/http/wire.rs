//! Wire messages exchanged between peers.
//!
//! Bodies are length-delimited binary messages. The request message carries
//! the group and key redundantly with the URL for forward compatibility;
//! the response message carries the value bytes and doubles as the body of
//! a replica push.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Content type of every peer request and response body.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Identifies the group and key a peer request is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRequest {
    pub group: String,
    pub key: String,
}

impl PeerRequest {
    pub fn new(group: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            key: key.into(),
        }
    }
}

/// Value payload of a lookup response or a replica push.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerResponse {
    pub value: Vec<u8>,
}

impl PeerResponse {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

pub fn encode_request(msg: &PeerRequest) -> Result<Vec<u8>> {
    bincode::serialize(msg).map_err(|err| Error::Internal(format!("encoding request: {err}")))
}

pub fn decode_request(bytes: &[u8]) -> Result<PeerRequest> {
    bincode::deserialize(bytes).map_err(|err| Error::Decode(err.to_string()))
}

pub fn encode_response(msg: &PeerResponse) -> Result<Vec<u8>> {
    bincode::serialize(msg).map_err(|err| Error::Internal(format!("encoding response: {err}")))
}

pub fn decode_response(bytes: &[u8]) -> Result<PeerResponse> {
    bincode::deserialize(bytes).map_err(|err| Error::Decode(err.to_string()))
}

// =============================================================================
// Tests
// =============================================================================

//! Broker payload for one chunk.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// JSON message carrying one chunk through the broker.
///
/// Field names stay camelCase on the wire so existing producers and
/// consumers interoperate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMessage {
    pub file_id: String,
    pub chunk_id: u32,
    /// Base64-encoded chunk bytes.
    pub data: String,
}

impl ChunkMessage {
    /// Build a message from raw chunk bytes.
    #[must_use]
    pub fn from_bytes(file_id: &str, chunk_id: u32, bytes: &[u8]) -> Self {
        Self {
            file_id: file_id.to_string(),
            chunk_id,
            data: BASE64.encode(bytes),
        }
    }

    /// Decode the chunk bytes out of the payload.
    pub fn decode_data(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(&self.data)
    }

    /// Serialize for publishing.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse a delivery payload.
    pub fn from_json(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

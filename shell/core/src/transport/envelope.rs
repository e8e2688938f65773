//! Reverse request/response envelopes
//!
//! Owner-to-controller requests are carried as two notify frames:
//! `"<channel>:request"` with a [`PeerRequest`] and `"<channel>:response"`
//! with a [`PeerResponse`]. The correlation id ties them together.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Correlation id of a reverse request
pub type CorrelationId = u64;

/// Body of a `"<channel>:request"` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerRequest {
    /// Correlation id
    pub id: CorrelationId,
    /// Request payload
    #[serde(default)]
    pub payload: Value,
}

/// Body of a `"<channel>:response"` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerResponse {
    /// Correlation id of the request being answered
    pub id: CorrelationId,
    /// Handler output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    /// Handler error message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PeerResponse {
    /// Successful response
    #[must_use]
    pub fn ok(id: CorrelationId, response: Value) -> Self {
        Self {
            id,
            response: Some(response),
            error: None,
        }
    }

    /// Error response
    #[must_use]
    pub fn err(id: CorrelationId, message: impl Into<String>) -> Self {
        Self {
            id,
            response: None,
            error: Some(message.into()),
        }
    }

    /// Collapse into the reply carried back to the waiting caller
    ///
    /// An error wins over a response if both are present.
    #[must_use]
    pub fn into_reply(self) -> Result<Value, String> {
        match self.error {
            Some(message) => Err(message),
            None => Ok(self.response.unwrap_or(Value::Null)),
        }
    }
}

//! Message type definitions for client-server communication.

use serde::{Deserialize, Serialize};

/// A message sent from a client to the server.
///
/// Every frame uses a namespace/event pattern so collaborators can route
/// without inspecting the payload:
///
/// ```json
/// {
///   "namespace": "chat",
///   "event": "send_message",
///   "data": { "text": "hello" }
/// }
/// ```
///
/// `data` defaults to `null` when omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMessage {
    /// The namespace that should handle this message
    pub namespace: String,

    /// The specific event type within the namespace
    pub event: String,

    /// The message payload as a JSON value
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Parses one raw transport frame into a [`ClientMessage`].
pub fn parse_frame(raw: &[u8]) -> Result<ClientMessage, serde_json::Error> {
    serde_json::from_slice(raw)
}

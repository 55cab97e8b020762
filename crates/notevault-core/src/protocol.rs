//! Real-time wire protocol.
//!
//! Messages are JSON text frames. Inbound parsing is deliberately lenient:
//! anything that is not a well-formed known message yields `None` and the
//! caller drops it silently. Real-time clients have no error channel; the
//! only symptom of a protocol violation is the absence of expected events.

use serde::{Deserialize, Serialize};

/// Message sent by a client over its live connection.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Subscribe to a vault, implicitly leaving any previous one.
    Join { hash: String },
}

impl ClientMessage {
    /// Parse an inbound text frame. Returns `None` for malformed JSON,
    /// missing fields, or unknown message types.
    pub fn from_text(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

/// Message pushed by the server to a live connection.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Acknowledges a join; sent only to the joining connection.
    Joined { users: usize },
    /// Subscriber count change; broadcast to a vault's subscribers.
    Users { count: usize },
    /// The vault's record was overwritten; broadcast to all subscribers,
    /// including the writer's own connection if it is subscribed.
    Updated,
}

impl ServerMessage {
    /// Serialize for sending as a text frame.
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).expect("server message serialization should not fail")
    }
}

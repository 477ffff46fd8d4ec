//! Signaling protocol messages
//!
//! Every WebSocket text frame carries one JSON object tagged by `type`.
//! SDP and ICE payloads are whatever the browser produced; the relay
//! forwards them as opaque JSON values and never looks inside.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::types::ConnectionId;

/// Messages a client sends to the relay
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Enter a room, creating it on first use
    JoinRoom { room: String },

    /// Session description from the initiating peer
    Offer { sdp: Value, room: String },

    /// Session description from the receiving peer
    Answer { sdp: Value, room: String },

    /// ICE connectivity candidate
    Candidate { candidate: Value, room: String },
}

/// Messages the relay sends to a client
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Members already present, sent only to a newcomer
    #[serde(rename = "all_users")]
    AllUsers { users: Vec<UserEntry> },

    #[serde(rename = "getOffer")]
    GetOffer { sdp: Value },

    #[serde(rename = "getAnswer")]
    GetAnswer { sdp: Value },

    #[serde(rename = "getCandidate")]
    GetCandidate { candidate: Value },

    /// A member of the recipient's room disconnected
    #[serde(rename = "user_exit")]
    UserExit { id: ConnectionId },

    /// Framing diagnostic for a frame that could not be decoded
    #[serde(rename = "error")]
    Error { message: String },
}

/// One entry of an `all_users` list
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub id: ConnectionId,
}

impl ClientMessage {
    /// Room named by the message
    pub fn room(&self) -> &str {
        match self {
            Self::JoinRoom { room }
            | Self::Offer { room, .. }
            | Self::Answer { room, .. }
            | Self::Candidate { room, .. } => room,
        }
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(json).map_err(ProtocolError::Malformed)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Serialization)
    }
}

impl ServerMessage {
    /// Create an error message
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Build the `all_users` list from member identifiers, keeping their order
    pub fn all_users<'a>(ids: impl IntoIterator<Item = &'a ConnectionId>) -> Self {
        Self::AllUsers {
            users: ids
                .into_iter()
                .map(|id| UserEntry { id: id.clone() })
                .collect(),
        }
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(json).map_err(ProtocolError::Malformed)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Serialization)
    }
}

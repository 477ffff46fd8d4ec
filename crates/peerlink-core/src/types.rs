//! Core type definitions for PeerLink

use serde::{Deserialize, Serialize};

/// Number of random bytes in a connection identifier
const CONNECTION_ID_LEN: usize = 8;

/// Identifier the transport assigns to a client connection on accept
///
/// Rendered as lowercase hex and carried on the wire as a plain string.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Try to generate a random connection ID, returning an error if RNG fails
    pub fn try_generate() -> Result<Self, getrandom::Error> {
        let mut bytes = [0u8; CONNECTION_ID_LEN];
        getrandom::fill(&mut bytes)?;
        Ok(Self(hex::encode(bytes)))
    }

    /// Wrap an identifier chosen elsewhere (tests, client tooling)
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_generation() {
        let id1 = ConnectionId::try_generate().unwrap();
        let id2 = ConnectionId::try_generate().unwrap();

        assert_eq!(id1.as_str().len(), 16); // 8 bytes = 16 hex chars
        assert!(id1.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_connection_id_is_plain_string_on_wire() {
        let id = ConnectionId::from_string("abc123");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""abc123""#);
        assert_eq!(id.to_string(), "abc123");
    }
}

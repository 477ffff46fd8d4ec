//! Error types for the signal server

use thiserror::Error;

use peerlink_core::ConfigError;

/// Server-level failures
///
/// Nothing in the registry or the session dispatcher can fail; these come
/// from the listener, the WebSocket layer, and startup.
#[derive(Error, Debug)]
pub enum SignalError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("failed to generate connection id: {0}")]
    ConnectionId(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

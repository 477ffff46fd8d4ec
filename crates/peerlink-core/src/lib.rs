//! PeerLink Core - Shared wire types and configuration
//!
//! This crate contains the pieces shared by the signaling relay and any
//! client tooling. It has no dependencies on networking code.

pub mod config;
pub mod error;
pub mod protocol;
pub mod types;

pub use config::{Config, ConfigError, SignalConfig};
pub use error::ProtocolError;
pub use protocol::{ClientMessage, ServerMessage, UserEntry};
pub use types::ConnectionId;

/// Default signaling port
pub const DEFAULT_PORT: u16 = 8080;

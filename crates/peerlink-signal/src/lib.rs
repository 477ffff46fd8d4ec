//! PeerLink Signal Server
//!
//! WebRTC signaling relay. Browser peers connect over WebSocket, join a
//! named room, and exchange SDP offers/answers and ICE candidates with the
//! other members of that room. Media never passes through the relay.
//!
//! # Protocol
//!
//! 1. Client sends `join_room`; if others are present it gets `all_users`
//! 2. Clients send `offer`/`answer`/`candidate` naming their room
//! 3. Every other member receives `getOffer`/`getAnswer`/`getCandidate`
//! 4. When a client disconnects the remaining members get `user_exit`

pub mod error;
pub mod registry;
pub mod server;
pub mod session;

pub use error::SignalError;
pub use registry::{Connection, Departure, Joined, Registry};
pub use server::SignalServer;
pub use session::{send_to_members, Session, SessionState};

pub use peerlink_core::DEFAULT_PORT;

//! Per-connection relay dispatcher
//!
//! A [`Session`] is the state machine for one client. Each inbound message
//! maps to one registry access and one send; nothing is buffered or retried.

use std::sync::Arc;

use tracing::{debug, info};

use peerlink_core::{ClientMessage, ConnectionId, ServerMessage};

use crate::registry::{Connection, Departure, Registry};

/// Where a connection is in its lifecycle
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Unjoined,
    Joined(String),
    /// Transport disconnected; no further events are processed
    Terminated,
}

/// Signaling state for one connected client
pub struct Session {
    conn: Connection,
    registry: Arc<Registry>,
    state: SessionState,
}

impl Session {
    pub fn new(conn: Connection, registry: Arc<Registry>) -> Self {
        Self {
            conn,
            registry,
            state: SessionState::Unjoined,
        }
    }

    pub fn id(&self) -> &ConnectionId {
        self.conn.id()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Send a message to this session's own client
    pub fn reply(&self, msg: ServerMessage) {
        if !self.conn.send(msg) {
            debug!("Dropped reply to closed connection {}", self.id());
        }
    }

    /// Dispatch one inbound message
    pub fn handle(&mut self, msg: ClientMessage) {
        if self.state == SessionState::Terminated {
            debug!(
                "Ignoring message for room {} from terminated connection {}",
                msg.room(),
                self.id()
            );
            return;
        }

        match msg {
            ClientMessage::JoinRoom { room } => self.join(room),
            ClientMessage::Offer { sdp, room } => {
                self.relay(&room, ServerMessage::GetOffer { sdp });
            }
            ClientMessage::Answer { sdp, room } => {
                self.relay(&room, ServerMessage::GetAnswer { sdp });
            }
            ClientMessage::Candidate { candidate, room } => {
                self.relay(&room, ServerMessage::GetCandidate { candidate });
            }
        }
    }

    /// Handle the transport going away. Safe to call more than once.
    pub fn disconnect(&mut self) {
        if self.state == SessionState::Terminated {
            return;
        }
        self.state = SessionState::Terminated;

        if let Some(departure) = self.registry.leave(self.conn.id()) {
            self.notify_exit(departure);
        }
        debug!("Connection closed: {}", self.id());
    }

    fn join(&mut self, room: String) {
        let joined = self.registry.join(&self.conn, &room);
        info!("Connection {} joined room {}", self.id(), room);

        if let Some(departure) = joined.left {
            self.notify_exit(departure);
        }

        self.state = SessionState::Joined(room);
    }

    fn relay(&self, room: &str, msg: ServerMessage) {
        let targets = self.registry.others_in(room, self.conn.id());
        let delivered = send_to_members(&targets, &msg);
        debug!(
            "Relayed message from {} to {}/{} members of room {}",
            self.id(),
            delivered,
            targets.len(),
            room
        );
    }

    fn notify_exit(&self, departure: Departure) {
        info!("Connection {} left room {}", self.id(), departure.room);
        let exit = ServerMessage::UserExit {
            id: self.conn.id().clone(),
        };
        send_to_members(&departure.remaining, &exit);
    }
}

/// Deliver `msg` to every connection in `members`, returning how many accepted it.
///
/// Delivery is at-most-once: a member whose writer has gone is skipped.
pub fn send_to_members(members: &[Connection], msg: &ServerMessage) -> usize {
    members.iter().filter(|m| m.send(msg.clone())).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Client {
        session: Session,
        rx: UnboundedReceiver<ServerMessage>,
    }

    impl Client {
        fn new(id: &str, registry: &Arc<Registry>) -> Self {
            let (conn, rx) = Connection::channel(ConnectionId::from_string(id));
            Self {
                session: Session::new(conn, registry.clone()),
                rx,
            }
        }

        fn id(&self) -> ConnectionId {
            self.session.id().clone()
        }

        fn join(&mut self, room: &str) {
            self.session.handle(ClientMessage::JoinRoom { room: room.into() });
        }

        fn drain(&mut self) -> Vec<ServerMessage> {
            let mut out = Vec::new();
            while let Ok(msg) = self.rx.try_recv() {
                out.push(msg);
            }
            out
        }
    }

    #[test]
    fn test_peer_discovery() {
        let registry = Arc::new(Registry::new());
        let mut a = Client::new("a", &registry);
        let mut b = Client::new("b", &registry);

        a.join("x");
        b.join("x");

        assert!(a.drain().is_empty());
        assert_eq!(b.drain(), vec![ServerMessage::all_users([&a.id()])]);
        assert_eq!(b.session.state(), &SessionState::Joined("x".into()));
    }

    #[test]
    fn test_offer_excludes_sender() {
        let registry = Arc::new(Registry::new());
        let mut a = Client::new("a", &registry);
        let mut b = Client::new("b", &registry);
        let mut c = Client::new("c", &registry);
        a.join("x");
        b.join("x");
        c.join("x");
        b.drain();
        c.drain();

        a.session.handle(ClientMessage::Offer {
            sdp: json!({"type": "offer"}),
            room: "x".into(),
        });

        let expected = ServerMessage::GetOffer {
            sdp: json!({"type": "offer"}),
        };
        assert!(a.drain().is_empty());
        assert_eq!(b.drain(), vec![expected.clone()]);
        assert_eq!(c.drain(), vec![expected]);
    }

    #[test]
    fn test_disconnect_notifies_remaining() {
        let registry = Arc::new(Registry::new());
        let mut a = Client::new("a", &registry);
        let mut b = Client::new("b", &registry);
        a.join("y");
        b.join("y");
        b.drain();

        a.session.disconnect();

        assert_eq!(b.drain(), vec![ServerMessage::UserExit { id: a.id() }]);
        assert_eq!(registry.members("y"), vec![b.id()]);
        assert_eq!(a.session.state(), &SessionState::Terminated);
    }

    #[test]
    fn test_lone_candidate_is_noop() {
        let registry = Arc::new(Registry::new());
        let mut d = Client::new("d", &registry);
        d.join("z");

        d.session.handle(ClientMessage::Candidate {
            candidate: json!({"candidate": "candidate:1 1 udp 1 10.0.0.1 9 typ host"}),
            room: "z".into(),
        });

        assert!(d.drain().is_empty());
        assert_eq!(d.session.state(), &SessionState::Joined("z".into()));
        assert_eq!(registry.members("z"), vec![d.id()]);
    }

    #[test]
    fn test_disconnect_without_join() {
        let registry = Arc::new(Registry::new());
        let mut a = Client::new("a", &registry);

        a.session.disconnect();
        a.session.disconnect();

        assert_eq!(a.session.state(), &SessionState::Terminated);
        assert_eq!(registry.room_count(), 0);
    }

    #[test]
    fn test_last_member_disconnect_removes_room() {
        let registry = Arc::new(Registry::new());
        let mut a = Client::new("a", &registry);
        a.join("solo");

        a.session.disconnect();

        assert_eq!(registry.room_count(), 0);
        assert!(registry.others_in("solo", &a.id()).is_empty());
    }

    #[test]
    fn test_terminated_ignores_messages() {
        let registry = Arc::new(Registry::new());
        let mut a = Client::new("a", &registry);
        let mut b = Client::new("b", &registry);
        b.join("x");
        a.session.disconnect();

        a.join("x");
        a.session.handle(ClientMessage::Offer {
            sdp: json!("late"),
            room: "x".into(),
        });

        assert!(b.drain().is_empty());
        assert_eq!(registry.members("x"), vec![b.id()]);
    }

    #[test]
    fn test_unjoined_relay_reaches_room() {
        let registry = Arc::new(Registry::new());
        let mut a = Client::new("a", &registry);
        let mut x = Client::new("x", &registry);
        a.join("r");

        x.session.handle(ClientMessage::Offer {
            sdp: json!("s"),
            room: "r".into(),
        });

        assert_eq!(a.drain(), vec![ServerMessage::GetOffer { sdp: json!("s") }]);
        assert!(x.drain().is_empty());
        assert_eq!(x.session.state(), &SessionState::Unjoined);
        assert_eq!(registry.members("r"), vec![a.id()]);
    }

    #[test]
    fn test_switching_rooms_notifies_old_room() {
        let registry = Arc::new(Registry::new());
        let mut a = Client::new("a", &registry);
        let mut b = Client::new("b", &registry);
        a.join("x");
        b.join("x");
        b.drain();

        a.join("y");

        assert_eq!(b.drain(), vec![ServerMessage::UserExit { id: a.id() }]);
        assert_eq!(a.session.state(), &SessionState::Joined("y".into()));
        assert!(a.drain().is_empty());
    }

    #[test]
    fn test_send_skips_closed_members() {
        let (open, _rx) = Connection::channel(ConnectionId::from_string("open"));
        let (closed, closed_rx) = Connection::channel(ConnectionId::from_string("closed"));
        drop(closed_rx);

        let delivered = send_to_members(&[open, closed], &ServerMessage::error("x"));
        assert_eq!(delivered, 1);
    }

    #[test]
    fn test_signaling_handshake() {
        let registry = Arc::new(Registry::new());
        let mut a = Client::new("a", &registry);
        let mut b = Client::new("b", &registry);

        a.join("r1");
        b.join("r1");
        assert_eq!(b.drain(), vec![ServerMessage::all_users([&a.id()])]);

        a.session.handle(ClientMessage::Offer {
            sdp: json!("sdp1"),
            room: "r1".into(),
        });
        assert_eq!(b.drain(), vec![ServerMessage::GetOffer { sdp: json!("sdp1") }]);

        b.session.handle(ClientMessage::Answer {
            sdp: json!("sdp2"),
            room: "r1".into(),
        });
        assert_eq!(a.drain(), vec![ServerMessage::GetAnswer { sdp: json!("sdp2") }]);

        a.session.handle(ClientMessage::Candidate {
            candidate: json!("c1"),
            room: "r1".into(),
        });
        assert_eq!(
            b.drain(),
            vec![ServerMessage::GetCandidate {
                candidate: json!("c1")
            }]
        );

        a.session.disconnect();
        assert_eq!(b.drain(), vec![ServerMessage::UserExit { id: a.id() }]);
        assert_eq!(registry.members("r1"), vec![b.id()]);
        assert!(a.drain().is_empty());
    }
}

//! Room membership for the signal server
//!
//! The registry owns two maps that must always agree: room name to member
//! sequence, and connection to current room. Both live behind one lock so
//! every join or leave is a single read-modify-write.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

use peerlink_core::{ConnectionId, ServerMessage};

/// Handle to one client's outbound message channel
#[derive(Clone, Debug)]
pub struct Connection {
    id: ConnectionId,
    outbox: mpsc::UnboundedSender<ServerMessage>,
}

impl Connection {
    pub fn new(id: ConnectionId, outbox: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self { id, outbox }
    }

    /// Create a connection together with the receiving end of its outbox
    pub fn channel(id: ConnectionId) -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(id, tx), rx)
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Queue a message for this client.
    ///
    /// Returns false if the client's writer has already gone away; the
    /// message is dropped.
    pub fn send(&self, msg: ServerMessage) -> bool {
        self.outbox.send(msg).is_ok()
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Connection {}

/// A member left a room that still has other members
#[derive(Debug)]
pub struct Departure {
    /// Room the member left
    pub room: String,
    /// Members still present, in join order
    pub remaining: Vec<Connection>,
}

/// Result of a join
#[derive(Debug, Default)]
pub struct Joined {
    /// Members that were already in the room, in join order
    pub peers: Vec<Connection>,
    /// Set when the join moved the connection out of a different, still occupied room
    pub left: Option<Departure>,
}

#[derive(Default)]
struct Rooms {
    members: HashMap<String, Vec<Connection>>,
    memberships: HashMap<ConnectionId, String>,
}

impl Rooms {
    fn others_in(&self, room: &str, excluding: &ConnectionId) -> Vec<Connection> {
        self.members
            .get(room)
            .map(|members| {
                members
                    .iter()
                    .filter(|m| m.id() != excluding)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn remove_member(&mut self, id: &ConnectionId) -> Option<Departure> {
        let room = self.memberships.remove(id)?;
        let members = self.members.get_mut(&room)?;
        members.retain(|m| m.id() != id);

        if members.is_empty() {
            self.members.remove(&room);
            debug!("Room {} removed (empty)", room);
            return None;
        }

        let remaining = members.clone();
        Some(Departure { room, remaining })
    }
}

/// Process-wide room membership
#[derive(Default)]
pub struct Registry {
    rooms: Mutex<Rooms>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `conn` to the end of `room`, creating the room if needed.
    ///
    /// A connection already in a room is removed from it first, so it is
    /// never listed twice. The peers already present are computed, and the
    /// `all_users` list queued to `conn`, under the same lock as the insert.
    pub fn join(&self, conn: &Connection, room: &str) -> Joined {
        let mut rooms = self.rooms.lock();

        let previous = rooms.memberships.get(conn.id()).cloned();
        let left = match previous.as_deref() {
            // Rejoining in place keeps the room alive even if it was the only member
            Some(previous) if previous == room => {
                if let Some(members) = rooms.members.get_mut(room) {
                    members.retain(|m| m.id() != conn.id());
                }
                None
            }
            Some(_) => rooms.remove_member(conn.id()),
            None => None,
        };

        match rooms.members.entry(room.to_owned()) {
            Entry::Occupied(mut members) => members.get_mut().push(conn.clone()),
            Entry::Vacant(slot) => {
                info!("Room created: {}", room);
                slot.insert(vec![conn.clone()]);
            }
        }
        rooms
            .memberships
            .insert(conn.id().clone(), room.to_owned());

        let peers = rooms.others_in(room, conn.id());
        if !peers.is_empty() {
            let users = ServerMessage::all_users(peers.iter().map(Connection::id));
            if !conn.send(users) {
                debug!("Dropped peer list for closed connection {}", conn.id());
            }
        }

        Joined { peers, left }
    }

    /// Members of `room` other than `excluding`, in join order.
    ///
    /// An unknown room has no members.
    pub fn others_in(&self, room: &str, excluding: &ConnectionId) -> Vec<Connection> {
        self.rooms.lock().others_in(room, excluding)
    }

    /// Remove a connection from its room.
    ///
    /// Returns the room and its remaining members, or `None` if the
    /// connection was in no room or the room is now gone.
    pub fn leave(&self, id: &ConnectionId) -> Option<Departure> {
        self.rooms.lock().remove_member(id)
    }

    /// Room the connection currently belongs to
    pub fn room_of(&self, id: &ConnectionId) -> Option<String> {
        self.rooms.lock().memberships.get(id).cloned()
    }

    /// Member IDs of a room in join order
    pub fn members(&self, room: &str) -> Vec<ConnectionId> {
        self.rooms
            .lock()
            .members
            .get(room)
            .map(|members| members.iter().map(|m| m.id().clone()).collect())
            .unwrap_or_default()
    }

    /// Number of live rooms (for monitoring)
    pub fn room_count(&self) -> usize {
        self.rooms.lock().members.len()
    }

    /// Number of connections in some room (for monitoring)
    pub fn member_count(&self) -> usize {
        self.rooms.lock().memberships.len()
    }

    #[cfg(test)]
    fn assert_consistent(&self) {
        let rooms = self.rooms.lock();
        let mut listed = 0;
        for (name, members) in &rooms.members {
            assert!(!members.is_empty(), "empty room {} retained", name);
            for member in members {
                assert_eq!(rooms.memberships.get(member.id()), Some(name));
                listed += 1;
            }
        }
        assert_eq!(listed, rooms.memberships.len());
    }
}

//! Relay rooms: membership, authority and fan-out

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::ws::protocol::ServerMsg;

/// Frames buffered per room before slow peers start lagging
const ROOM_CHANNEL_CAPACITY: usize = 256;

/// One relay room
pub struct Room {
    name: String,
    /// First peer to join; kept for the room's lifetime even after it leaves
    authority: Uuid,
    members: Mutex<HashSet<Uuid>>,
    tx: broadcast::Sender<ServerMsg>,
}

impl Room {
    fn new(name: &str, authority: Uuid) -> Self {
        let (tx, _) = broadcast::channel(ROOM_CHANNEL_CAPACITY);
        Self {
            name: name.to_string(),
            authority,
            members: Mutex::new(HashSet::new()),
            tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn authority(&self) -> Uuid {
        self.authority
    }

    pub fn member_count(&self) -> usize {
        self.members.lock().len()
    }

    pub fn contains(&self, peer_id: Uuid) -> bool {
        self.members.lock().contains(&peer_id)
    }
}

/// A peer's seat in a room. Frames authored by the peer itself are filtered
/// out by [`Membership::accepts`].
pub struct Membership {
    pub peer_id: Uuid,
    pub room: Arc<Room>,
    pub authority: bool,
    pub rx: broadcast::Receiver<ServerMsg>,
}

impl Membership {
    /// Whether a room frame should be delivered to this peer
    pub fn accepts(&self, msg: &ServerMsg) -> bool {
        match msg {
            ServerMsg::Relay { from, .. } => *from != self.peer_id,
            ServerMsg::PeerJoined { peer_id } | ServerMsg::PeerLeft { peer_id } => {
                *peer_id != self.peer_id
            }
            ServerMsg::Welcome { .. } | ServerMsg::Error { .. } => false,
        }
    }

    /// The welcome frame sent to this peer on connect
    pub fn welcome(&self) -> ServerMsg {
        ServerMsg::Welcome {
            peer_id: self.peer_id,
            room: self.room.name.clone(),
            authority: self.authority,
        }
    }
}

/// Registry of live rooms, keyed by name
#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<String, Arc<Room>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join (or create) a room. A peer id may hold one seat per room.
    pub fn join(&self, room_name: &str, peer_id: Option<Uuid>) -> Result<Membership, RelayError> {
        let peer_id = peer_id.unwrap_or_else(Uuid::new_v4);

        // Membership is updated under the shard guard so `leave` cannot drop
        // the room between lookup and insert
        let entry = self
            .rooms
            .entry(room_name.to_string())
            .or_insert_with(|| Arc::new(Room::new(room_name, peer_id)));
        let room = entry.value().clone();
        {
            let mut members = room.members.lock();
            if !members.insert(peer_id) {
                return Err(RelayError::DuplicatePeer(peer_id));
            }
        }
        let rx = room.tx.subscribe();
        drop(entry);

        let authority = room.authority == peer_id;
        let _ = room.tx.send(ServerMsg::PeerJoined { peer_id });
        info!(room = %room_name, peer_id = %peer_id, authority, "Peer joined room");

        Ok(Membership {
            peer_id,
            room,
            authority,
            rx,
        })
    }

    /// Leave a room; the room is dropped once its last member is gone.
    /// Leaving twice is a no-op.
    pub fn leave(&self, room_name: &str, peer_id: Uuid) -> bool {
        let Some(room) = self.rooms.get(room_name).map(|r| r.value().clone()) else {
            return false;
        };
        if !room.members.lock().remove(&peer_id) {
            return false;
        }
        let _ = room.tx.send(ServerMsg::PeerLeft { peer_id });
        info!(room = %room_name, peer_id = %peer_id, "Peer left room");

        if self
            .rooms
            .remove_if(room_name, |_, r| r.members.lock().is_empty())
            .is_some()
        {
            debug!(room = %room_name, "Room closed");
        }
        true
    }

    /// Fan a peer's game message out to the rest of the room
    pub fn publish(
        &self,
        room_name: &str,
        from: Uuid,
        payload: serde_json::Value,
    ) -> Result<usize, RelayError> {
        let room = self
            .rooms
            .get(room_name)
            .map(|r| r.value().clone())
            .ok_or_else(|| RelayError::RoomNotFound(room_name.to_string()))?;
        if !room.contains(from) {
            return Err(RelayError::NotMember(from));
        }
        // Zero receivers is not an error for a relay
        Ok(room.tx.send(ServerMsg::Relay { from, payload }).unwrap_or(0))
    }

    pub fn room(&self, room_name: &str) -> Option<Arc<Room>> {
        self.rooms.get(room_name).map(|r| r.value().clone())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn peer_count(&self) -> usize {
        self.rooms.iter().map(|r| r.member_count()).sum()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Peer {0} is already in this room")]
    DuplicatePeer(Uuid),

    #[error("Room not found: {0}")]
    RoomNotFound(String),

    #[error("Peer {0} is not a member of this room")]
    NotMember(Uuid),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_joiner_holds_authority_for_room_lifetime() {
        let registry = RoomRegistry::new();
        let host = registry.join("lobby", None).unwrap();
        let guest = registry.join("lobby", None).unwrap();
        assert!(host.authority);
        assert!(!guest.authority);

        registry.leave("lobby", host.peer_id);
        let late = registry.join("lobby", None).unwrap();
        assert!(!late.authority);
        assert_eq!(registry.room("lobby").unwrap().authority(), host.peer_id);
    }

    #[test]
    fn empty_rooms_are_removed() {
        let registry = RoomRegistry::new();
        let a = registry.join("r1", None).unwrap();
        let b = registry.join("r1", None).unwrap();
        assert_eq!(registry.room_count(), 1);
        assert_eq!(registry.peer_count(), 2);

        assert!(registry.leave("r1", a.peer_id));
        assert!(!registry.leave("r1", a.peer_id));
        assert_eq!(registry.room_count(), 1);

        registry.leave("r1", b.peer_id);
        assert_eq!(registry.room_count(), 0);

        // Fresh room, fresh authority
        let c = registry.join("r1", None).unwrap();
        assert!(c.authority);
    }

    #[test]
    fn duplicate_peer_is_rejected() {
        let registry = RoomRegistry::new();
        let id = Uuid::new_v4();
        registry.join("r", Some(id)).unwrap();
        assert!(matches!(
            registry.join("r", Some(id)),
            Err(RelayError::DuplicatePeer(_))
        ));
    }

    #[test]
    fn relay_reaches_others_but_not_sender() {
        let registry = RoomRegistry::new();
        let mut a = registry.join("r", None).unwrap();
        let mut b = registry.join("r", None).unwrap();

        registry
            .publish("r", a.peer_id, json!({"type": "pose"}))
            .unwrap();

        let mut seen_by_b = Vec::new();
        while let Ok(msg) = b.rx.try_recv() {
            if b.accepts(&msg) {
                seen_by_b.push(msg);
            }
        }
        assert_eq!(seen_by_b.len(), 1);
        assert!(matches!(&seen_by_b[0], ServerMsg::Relay { from, .. } if *from == a.peer_id));

        let mut seen_by_a = Vec::new();
        while let Ok(msg) = a.rx.try_recv() {
            if a.accepts(&msg) {
                seen_by_a.push(msg);
            }
        }
        // Only b's join notice
        assert_eq!(seen_by_a.len(), 1);
        assert!(matches!(&seen_by_a[0], ServerMsg::PeerJoined { peer_id } if *peer_id == b.peer_id));
    }

    #[test]
    fn publish_requires_membership() {
        let registry = RoomRegistry::new();
        registry.join("r", None).unwrap();
        assert!(matches!(
            registry.publish("r", Uuid::new_v4(), json!({"type": "pose"})),
            Err(RelayError::NotMember(_))
        ));
        assert!(matches!(
            registry.publish("nope", Uuid::new_v4(), json!({"type": "pose"})),
            Err(RelayError::RoomNotFound(_))
        ));
    }
}

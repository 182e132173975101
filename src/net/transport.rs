//! Transport abstraction for replication
//!
//! Replication only sees [`Transport`]; how frames move between peers is up
//! to the implementation.

use std::sync::Arc;

use tokio::sync::broadcast::error::TryRecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::relay::{Membership, RelayError, RoomRegistry};
use crate::ws::protocol::{ServerMsg, WireMsg};

/// What a transport reports on poll
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Connection accepted; carries our peer id and whether we hold authority
    Welcome { peer_id: Uuid, authority: bool },
    Message { from: Uuid, msg: WireMsg },
    PeerJoined(Uuid),
    PeerLeft(Uuid),
}

pub trait Transport: Send {
    /// Our peer id, once connected
    fn local_id(&self) -> Option<Uuid>;

    fn is_open(&self) -> bool;

    fn send(&mut self, msg: &WireMsg) -> Result<(), TransportError>;

    /// Drain everything received since the last poll, oldest first
    fn poll(&mut self) -> Vec<TransportEvent>;

    /// Disconnect; later calls are no-ops
    fn close(&mut self);
}

/// Transport for single-player sessions. Never open, drops every send.
#[derive(Debug, Default)]
pub struct OfflineTransport;

impl Transport for OfflineTransport {
    fn local_id(&self) -> Option<Uuid> {
        None
    }

    fn is_open(&self) -> bool {
        false
    }

    fn send(&mut self, _msg: &WireMsg) -> Result<(), TransportError> {
        Ok(())
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        Vec::new()
    }

    fn close(&mut self) {}
}

/// In-process transport riding a relay room's broadcast channel
pub struct ChannelTransport {
    registry: Arc<RoomRegistry>,
    membership: Option<Membership>,
    pending: Vec<TransportEvent>,
}

impl ChannelTransport {
    pub fn connect(registry: Arc<RoomRegistry>, room: &str) -> Result<Self, TransportError> {
        let membership = registry.join(room, None)?;
        let welcome = TransportEvent::Welcome {
            peer_id: membership.peer_id,
            authority: membership.authority,
        };
        info!(room = %room, peer_id = %membership.peer_id, "Channel transport connected");

        Ok(Self {
            registry,
            membership: Some(membership),
            pending: vec![welcome],
        })
    }

    fn translate(msg: ServerMsg) -> Option<TransportEvent> {
        match msg {
            ServerMsg::Relay { from, payload } => match WireMsg::from_value(payload) {
                Ok(msg) => Some(TransportEvent::Message { from, msg }),
                Err(e) => {
                    debug!(from = %from, error = %e, "Dropping malformed relay payload");
                    None
                }
            },
            ServerMsg::PeerJoined { peer_id } => Some(TransportEvent::PeerJoined(peer_id)),
            ServerMsg::PeerLeft { peer_id } => Some(TransportEvent::PeerLeft(peer_id)),
            ServerMsg::Welcome { .. } | ServerMsg::Error { .. } => None,
        }
    }
}

impl Transport for ChannelTransport {
    fn local_id(&self) -> Option<Uuid> {
        self.membership.as_ref().map(|m| m.peer_id)
    }

    fn is_open(&self) -> bool {
        self.membership.is_some()
    }

    fn send(&mut self, msg: &WireMsg) -> Result<(), TransportError> {
        let membership = self.membership.as_ref().ok_or(TransportError::Closed)?;
        let payload = msg.to_value()?;
        self.registry
            .publish(membership.room.name(), membership.peer_id, payload)?;
        Ok(())
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        let mut events = std::mem::take(&mut self.pending);
        let Some(membership) = self.membership.as_mut() else {
            return events;
        };

        let mut closed = false;
        loop {
            match membership.rx.try_recv() {
                Ok(msg) => {
                    if membership.accepts(&msg) {
                        events.extend(Self::translate(msg));
                    }
                }
                Err(TryRecvError::Lagged(n)) => {
                    warn!(peer_id = %membership.peer_id, lagged = n, "Transport lagged, frames skipped");
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Closed) => {
                    debug!(peer_id = %membership.peer_id, "Room channel closed");
                    closed = true;
                    break;
                }
            }
        }
        if closed {
            self.close();
        }
        events
    }

    fn close(&mut self) {
        if let Some(membership) = self.membership.take() {
            self.registry
                .leave(membership.room.name(), membership.peer_id);
        }
    }
}

impl Drop for ChannelTransport {
    fn drop(&mut self) {
        self.close();
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport is closed")]
    Closed,

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::Score;

    #[tokio::test]
    async fn peers_exchange_messages_through_a_room() {
        let registry = Arc::new(RoomRegistry::new());
        let mut host = ChannelTransport::connect(registry.clone(), "arena").unwrap();
        let mut guest = ChannelTransport::connect(registry.clone(), "arena").unwrap();

        let host_events = host.poll();
        assert!(matches!(
            host_events[0],
            TransportEvent::Welcome { authority: true, .. }
        ));
        assert_eq!(
            host_events[1],
            TransportEvent::PeerJoined(guest.local_id().unwrap())
        );

        let msg = WireMsg::Score {
            score: Score { team_a: 1, team_b: 0 },
        };
        host.send(&msg).unwrap();

        let guest_events = guest.poll();
        assert!(matches!(
            guest_events[0],
            TransportEvent::Welcome { authority: false, .. }
        ));
        assert_eq!(
            guest_events[1],
            TransportEvent::Message {
                from: host.local_id().unwrap(),
                msg
            }
        );
        assert!(host.poll().is_empty());
    }

    #[tokio::test]
    async fn close_announces_departure_and_is_idempotent() {
        let registry = Arc::new(RoomRegistry::new());
        let mut a = ChannelTransport::connect(registry.clone(), "r").unwrap();
        let mut b = ChannelTransport::connect(registry.clone(), "r").unwrap();
        let b_id = b.local_id().unwrap();
        a.poll();

        b.close();
        b.close();
        assert!(!b.is_open());
        assert!(matches!(b.send(&WireMsg::Unknown), Err(TransportError::Closed)));
        assert_eq!(a.poll(), vec![TransportEvent::PeerLeft(b_id)]);

        drop(a);
        assert_eq!(registry.room_count(), 0);
    }

    #[tokio::test]
    async fn malformed_payloads_are_dropped() {
        let registry = Arc::new(RoomRegistry::new());
        let mut a = ChannelTransport::connect(registry.clone(), "r").unwrap();
        let b = ChannelTransport::connect(registry.clone(), "r").unwrap();
        a.poll();

        registry
            .publish(
                "r",
                b.local_id().unwrap(),
                serde_json::json!({"type": "pose", "pos": "nowhere"}),
            )
            .unwrap();
        assert!(a.poll().is_empty());
    }
}

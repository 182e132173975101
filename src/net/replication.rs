//! Pose replication between peers
//!
//! Outbound snapshots are rate limited to a fixed interval. Inbound poses
//! are smoothed toward their target instead of snapped, and the shared ball
//! is only ever simulated by the authoritative peer.

use std::collections::HashMap;
use std::time::Duration;

use glam::{Quat, Vec3};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::avatar::Appearance;
use crate::game::physics::{BodyHandle, PhysicsBackend};
use crate::ws::protocol::{Score, WireMsg, WireQuat, WireVec3};

use super::transport::{Transport, TransportError, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplicationConfig {
    /// Minimum time between outbound snapshots
    pub send_interval: Duration,
    /// Fraction of the remaining distance covered per received message
    pub smoothing: f32,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            send_interval: Duration::from_millis(100),
            smoothing: 0.2,
        }
    }
}

/// Another peer's avatar as seen locally
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntity {
    pub peer_id: Uuid,
    pub position: Vec3,
    pub rotation: Quat,
    pub target_position: Vec3,
    pub target_rotation: Quat,
    pub appearance: Appearance,
    pub last_seen_ms: u64,
}

impl RemoteEntity {
    /// Spawned directly at the first snapshot's pose
    fn spawn(peer_id: Uuid, position: Vec3, rotation: Quat, texture: Option<&str>, now_ms: u64) -> Self {
        Self {
            peer_id,
            position,
            rotation,
            target_position: position,
            target_rotation: rotation,
            appearance: Appearance::from_texture(texture),
            last_seen_ms: now_ms,
        }
    }

    /// A texture arriving after spawn replaces the fallback colour
    fn paint(&mut self, texture: &str) {
        if let appearance @ Appearance::Texture(_) = Appearance::from_texture(Some(texture)) {
            debug!(peer_id = %self.peer_id, "Applying late avatar texture");
            self.appearance = appearance;
        }
    }

    fn approach(&mut self, position: Vec3, rotation: Quat, factor: f32, now_ms: u64) {
        self.target_position = position;
        self.target_rotation = rotation;
        self.position = self.position.lerp(position, factor);
        self.rotation = self.rotation.slerp(rotation, factor);
        self.last_seen_ms = now_ms;
    }
}

/// Things the session or shell may want to react to
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicationEvent {
    Connected { peer_id: Uuid, authority: bool },
    RemoteSpawned(Uuid),
    PeerJoined(Uuid),
    PeerLeft(Uuid),
    Score(Score),
    StartGame(String),
}

pub struct Replicator {
    config: ReplicationConfig,
    local_id: Option<Uuid>,
    authority: Option<bool>,
    remotes: HashMap<Uuid, RemoteEntity>,
    last_send_ms: Option<u64>,
    local_texture: Option<String>,
    /// Texture rides along with the next pose (first send, and after a join)
    texture_pending: bool,
    shared_object: Option<BodyHandle>,
}

impl Replicator {
    pub fn new(config: ReplicationConfig) -> Self {
        Self {
            config,
            local_id: None,
            authority: None,
            remotes: HashMap::new(),
            last_send_ms: None,
            local_texture: None,
            texture_pending: true,
            shared_object: None,
        }
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    pub fn set_local_texture(&mut self, texture: Option<String>) {
        self.local_texture = texture;
        self.texture_pending = true;
    }

    /// Body replicated as the shared object (the soccer ball)
    pub fn set_shared_object(&mut self, body: Option<BodyHandle>) {
        self.shared_object = body;
    }

    pub fn local_id(&self) -> Option<Uuid> {
        self.local_id
    }

    /// Authority is decided once per session. Later assignments are ignored.
    pub fn assign_authority(&mut self, authority: bool) -> bool {
        match self.authority {
            None => {
                self.authority = Some(authority);
                info!(authority, "Replication authority assigned");
                true
            }
            Some(current) => {
                if current != authority {
                    warn!(current, requested = authority, "Ignoring authority transfer");
                }
                false
            }
        }
    }

    pub fn is_authority(&self) -> bool {
        self.authority.unwrap_or(false)
    }

    pub fn remote(&self, peer_id: Uuid) -> Option<&RemoteEntity> {
        self.remotes.get(&peer_id)
    }

    pub fn remotes(&self) -> impl Iterator<Item = &RemoteEntity> {
        self.remotes.values()
    }

    pub fn remote_count(&self) -> usize {
        self.remotes.len()
    }

    /// Send the local pose (and the shared object when authoritative) if the
    /// send interval has elapsed. Returns whether anything was sent.
    pub fn maybe_send(
        &mut self,
        now_ms: u64,
        player_body: Option<BodyHandle>,
        physics: &dyn PhysicsBackend,
        transport: &mut dyn Transport,
    ) -> Result<bool, TransportError> {
        if !transport.is_open() {
            return Ok(false);
        }
        let interval_ms = self.config.send_interval.as_millis() as u64;
        if let Some(last) = self.last_send_ms {
            if now_ms.saturating_sub(last) < interval_ms {
                return Ok(false);
            }
        }
        self.last_send_ms = Some(now_ms);

        let mut sent = false;
        if let Some(body) = player_body {
            if let (Some(pos), Some(rot)) = (physics.position(body), physics.rotation(body)) {
                let texture = if self.texture_pending {
                    self.local_texture.clone()
                } else {
                    None
                };
                transport.send(&WireMsg::Pose {
                    pos: pos.into(),
                    rot: rot.into(),
                    texture,
                })?;
                self.texture_pending = false;
                sent = true;
            }
        }

        if self.is_authority() {
            if let Some(ball) = self.shared_object {
                if let (Some(pos), Some(vel)) = (physics.position(ball), physics.linear_velocity(ball)) {
                    transport.send(&WireMsg::ObjectPose {
                        pos: pos.into(),
                        vel: vel.into(),
                    })?;
                    sent = true;
                }
            }
        }
        Ok(sent)
    }

    /// Apply one transport event
    pub fn handle_event(
        &mut self,
        event: TransportEvent,
        physics: &mut dyn PhysicsBackend,
        now_ms: u64,
    ) -> Option<ReplicationEvent> {
        match event {
            TransportEvent::Welcome { peer_id, authority } => {
                self.local_id = Some(peer_id);
                self.assign_authority(authority);
                Some(ReplicationEvent::Connected {
                    peer_id,
                    authority: self.is_authority(),
                })
            }
            TransportEvent::Message { from, msg } => self.handle_message(from, msg, physics, now_ms),
            TransportEvent::PeerJoined(peer_id) => {
                self.texture_pending = true;
                Some(ReplicationEvent::PeerJoined(peer_id))
            }
            TransportEvent::PeerLeft(peer_id) => {
                self.remove_peer(peer_id);
                Some(ReplicationEvent::PeerLeft(peer_id))
            }
        }
    }

    fn handle_message(
        &mut self,
        from: Uuid,
        msg: WireMsg,
        physics: &mut dyn PhysicsBackend,
        now_ms: u64,
    ) -> Option<ReplicationEvent> {
        match msg {
            WireMsg::Pose { pos, rot, texture } => self
                .apply_pose(from, pos, rot, texture.as_deref(), now_ms)
                .then_some(ReplicationEvent::RemoteSpawned(from)),
            WireMsg::ObjectPose { pos, vel } => {
                self.apply_object_pose(pos, vel, physics);
                None
            }
            WireMsg::Score { score } => Some(ReplicationEvent::Score(score)),
            WireMsg::StartGame { game_id } => Some(ReplicationEvent::StartGame(game_id)),
            WireMsg::Unknown => {
                debug!(from = %from, "Ignoring unknown message type");
                None
            }
        }
    }

    /// Update (or create) the remote entity for `from`. Returns true when a
    /// new entity was spawned.
    pub fn apply_pose(
        &mut self,
        from: Uuid,
        pos: WireVec3,
        rot: WireQuat,
        texture: Option<&str>,
        now_ms: u64,
    ) -> bool {
        if Some(from) == self.local_id {
            return false;
        }
        let position = Vec3::from(pos);
        let rotation = Quat::from(rot);
        if !position.is_finite() {
            debug!(from = %from, "Dropping non-finite pose");
            return false;
        }

        let mut spawned = false;
        let factor = self.config.smoothing;
        let entity = self.remotes.entry(from).or_insert_with(|| {
            spawned = true;
            debug!(peer_id = %from, "Spawning remote entity");
            RemoteEntity::spawn(from, position, rotation, texture, now_ms)
        });
        if !spawned && entity.appearance.texture().is_none() {
            if let Some(texture) = texture {
                entity.paint(texture);
            }
        }
        entity.approach(position, rotation, factor, now_ms);
        spawned
    }

    /// Non-authoritative peers pull the shared object toward the snapshot
    /// and take its velocity verbatim
    pub fn apply_object_pose(
        &mut self,
        pos: WireVec3,
        vel: WireVec3,
        physics: &mut dyn PhysicsBackend,
    ) -> bool {
        if self.is_authority() {
            return false;
        }
        let Some(ball) = self.shared_object.filter(|b| physics.contains(*b)) else {
            return false;
        };
        let Some(current) = physics.position(ball) else {
            return false;
        };
        physics.set_position(ball, current.lerp(pos.into(), self.config.smoothing));
        physics.set_linear_velocity(ball, vel.into())
    }

    /// Idempotent
    pub fn remove_peer(&mut self, peer_id: Uuid) -> bool {
        let removed = self.remotes.remove(&peer_id).is_some();
        if removed {
            debug!(peer_id = %peer_id, "Removed remote entity");
        }
        removed
    }

    pub fn clear(&mut self) {
        self.remotes.clear();
        self.shared_object = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::avatar::DEFAULT_AVATAR_COLOR;
    use crate::game::physics::{BodyDesc, SimplePhysics};

    /// Records sends; opens on demand
    #[derive(Default)]
    struct RecordingTransport {
        open: bool,
        sent: Vec<WireMsg>,
    }

    impl Transport for RecordingTransport {
        fn local_id(&self) -> Option<Uuid> {
            None
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn send(&mut self, msg: &WireMsg) -> Result<(), TransportError> {
            self.sent.push(msg.clone());
            Ok(())
        }

        fn poll(&mut self) -> Vec<TransportEvent> {
            Vec::new()
        }

        fn close(&mut self) {
            self.open = false;
        }
    }

    fn pose(x: f32) -> (WireVec3, WireQuat) {
        (Vec3::new(x, 0.0, 0.0).into(), Quat::IDENTITY.into())
    }

    #[test]
    fn pose_creates_once_then_updates() {
        let mut replicator = Replicator::new(ReplicationConfig::default());
        let peer = Uuid::new_v4();

        let (pos, rot) = pose(0.0);
        assert!(replicator.apply_pose(peer, pos, rot, None, 0));
        assert_eq!(replicator.remote_count(), 1);

        let (pos, rot) = pose(10.0);
        assert!(!replicator.apply_pose(peer, pos, rot, None, 100));
        assert_eq!(replicator.remote_count(), 1);

        let entity = replicator.remote(peer).unwrap();
        assert_eq!(entity.target_position.x, 10.0);
        assert!((entity.position.x - 2.0).abs() < 1e-5);
        assert_eq!(entity.last_seen_ms, 100);
    }

    #[test]
    fn removal_is_idempotent_and_late_pose_recreates() {
        let mut replicator = Replicator::new(ReplicationConfig::default());
        let peer = Uuid::new_v4();
        let (pos, rot) = pose(1.0);
        replicator.apply_pose(peer, pos, rot, None, 0);

        assert!(replicator.remove_peer(peer));
        assert!(!replicator.remove_peer(peer));
        assert_eq!(replicator.remote_count(), 0);

        assert!(replicator.apply_pose(peer, pos, rot, None, 200));
        assert_eq!(replicator.remote_count(), 1);
        assert_eq!(replicator.remote(peer).unwrap().position, Vec3::X);
    }

    #[test]
    fn own_pose_is_never_spawned() {
        let mut physics = SimplePhysics::default();
        let mut replicator = Replicator::new(ReplicationConfig::default());
        let me = Uuid::new_v4();
        replicator.handle_event(
            TransportEvent::Welcome {
                peer_id: me,
                authority: false,
            },
            &mut physics,
            0,
        );
        let (pos, rot) = pose(0.0);
        assert!(!replicator.apply_pose(me, pos, rot, None, 0));
        assert_eq!(replicator.remote_count(), 0);
    }

    #[test]
    fn texture_falls_back_to_color() {
        let mut replicator = Replicator::new(ReplicationConfig::default());
        let (pos, rot) = pose(0.0);

        let plain = Uuid::new_v4();
        replicator.apply_pose(plain, pos, rot, Some("not-a-data-url"), 0);
        assert_eq!(
            replicator.remote(plain).unwrap().appearance,
            Appearance::Color(DEFAULT_AVATAR_COLOR.to_string())
        );

        let textured = Uuid::new_v4();
        replicator.apply_pose(textured, pos, rot, Some("data:image/png;base64,iVBORw0KGgo="), 0);
        assert!(replicator.remote(textured).unwrap().appearance.texture().is_some());
    }

    #[test]
    fn texture_on_a_later_pose_replaces_fallback_color() {
        let mut replicator = Replicator::new(ReplicationConfig::default());
        let peer = Uuid::new_v4();
        let (pos, rot) = pose(0.0);

        assert!(replicator.apply_pose(peer, pos, rot, None, 0));
        assert_eq!(replicator.remote(peer).unwrap().appearance, Appearance::default());

        let (pos, rot) = pose(1.0);
        assert!(!replicator.apply_pose(peer, pos, rot, Some("data:image/png;base64,iVBORw0KGgo="), 100));
        let entity = replicator.remote(peer).unwrap();
        assert!(entity.appearance.texture().is_some());
        assert_eq!(entity.last_seen_ms, 100);

        // a later bad texture leaves the applied one alone
        replicator.apply_pose(peer, pos, rot, Some("not-a-data-url"), 200);
        assert!(replicator.remote(peer).unwrap().appearance.texture().is_some());
    }

    #[test]
    fn authority_is_assigned_once() {
        let mut replicator = Replicator::new(ReplicationConfig::default());
        assert!(!replicator.is_authority());
        assert!(replicator.assign_authority(true));
        assert!(!replicator.assign_authority(false));
        assert!(replicator.is_authority());
    }

    #[test]
    fn sends_are_rate_limited_and_ball_is_authority_only() {
        let mut physics = SimplePhysics::default();
        let player = physics
            .create_body(BodyDesc::player_capsule(Vec3::new(0.0, 2.0, 0.0), 1.0))
            .unwrap();
        let ball = physics
            .create_body(BodyDesc::ball(Vec3::new(0.0, 5.0, 0.0), 0.75))
            .unwrap();
        let mut transport = RecordingTransport {
            open: true,
            ..Default::default()
        };

        let mut replicator = Replicator::new(ReplicationConfig::default());
        replicator.set_local_texture(Some("data:image/png;base64,iVBORw0KGgo=".to_string()));
        replicator.set_shared_object(Some(ball));

        assert!(replicator.maybe_send(0, Some(player), &physics, &mut transport).unwrap());
        assert!(!replicator.maybe_send(50, Some(player), &physics, &mut transport).unwrap());
        assert!(replicator.maybe_send(100, Some(player), &physics, &mut transport).unwrap());
        assert_eq!(transport.sent.len(), 2);
        assert!(matches!(&transport.sent[0], WireMsg::Pose { texture: Some(_), .. }));
        assert!(matches!(&transport.sent[1], WireMsg::Pose { texture: None, .. }));

        replicator.assign_authority(true);
        replicator.maybe_send(200, Some(player), &physics, &mut transport).unwrap();
        assert!(matches!(transport.sent.last(), Some(WireMsg::ObjectPose { .. })));

        transport.close();
        assert!(!replicator.maybe_send(1000, Some(player), &physics, &mut transport).unwrap());
    }

    #[test]
    fn object_pose_applies_only_when_not_authority() {
        let mut physics = SimplePhysics::default();
        let ball = physics
            .create_body(BodyDesc::ball(Vec3::ZERO, 0.75))
            .unwrap();
        let mut replicator = Replicator::new(ReplicationConfig::default());
        replicator.set_shared_object(Some(ball));
        replicator.assign_authority(false);

        let pos = Vec3::new(10.0, 0.0, 0.0).into();
        let vel = Vec3::new(0.0, 0.0, 3.0).into();
        assert!(replicator.apply_object_pose(pos, vel, &mut physics));
        assert!((physics.position(ball).unwrap().x - 2.0).abs() < 1e-5);
        assert_eq!(physics.linear_velocity(ball), Some(Vec3::new(0.0, 0.0, 3.0)));

        let mut host = Replicator::new(ReplicationConfig::default());
        host.set_shared_object(Some(ball));
        host.assign_authority(true);
        assert!(!host.apply_object_pose(pos, vel, &mut physics));
    }

    #[test]
    fn peer_left_event_removes_entity() {
        let mut physics = SimplePhysics::default();
        let mut replicator = Replicator::new(ReplicationConfig::default());
        let peer = Uuid::new_v4();
        let (pos, rot) = pose(0.0);

        let spawned = replicator.handle_event(
            TransportEvent::Message {
                from: peer,
                msg: WireMsg::Pose {
                    pos,
                    rot,
                    texture: None,
                },
            },
            &mut physics,
            0,
        );
        assert_eq!(spawned, Some(ReplicationEvent::RemoteSpawned(peer)));

        replicator.handle_event(TransportEvent::PeerLeft(peer), &mut physics, 10);
        replicator.handle_event(TransportEvent::PeerLeft(peer), &mut physics, 20);
        assert_eq!(replicator.remote_count(), 0);
    }
}

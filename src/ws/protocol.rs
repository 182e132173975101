//! Wire types for peer replication and the relay envelope
//!
//! Game messages are transport-agnostic JSON objects tagged by `type`. The
//! relay wraps whatever a peer sends in a `relay` frame without interpreting
//! it, so receivers decode the payload themselves and skip types they do not
//! know.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `{x, y, z}` on the wire
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WireVec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl From<Vec3> for WireVec3 {
    fn from(v: Vec3) -> Self {
        Self {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }
}

impl From<WireVec3> for Vec3 {
    fn from(v: WireVec3) -> Self {
        Vec3::new(v.x, v.y, v.z)
    }
}

/// `{x, y, z, w}` on the wire
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WireQuat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl From<Quat> for WireQuat {
    fn from(q: Quat) -> Self {
        Self {
            x: q.x,
            y: q.y,
            z: q.z,
            w: q.w,
        }
    }
}

impl From<WireQuat> for Quat {
    fn from(q: WireQuat) -> Self {
        // Peers may send slightly denormalized or zero quaternions
        let raw = Quat::from_xyzw(q.x, q.y, q.z, q.w);
        let len = raw.length();
        if len.is_finite() && len > 1e-6 {
            raw * (1.0 / len)
        } else {
            Quat::IDENTITY
        }
    }
}

/// Soccer scoreboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    #[serde(rename = "teamA")]
    pub team_a: u32,
    #[serde(rename = "teamB")]
    pub team_b: u32,
}

/// Peer-to-peer game messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMsg {
    /// Local player pose
    Pose {
        pos: WireVec3,
        rot: WireQuat,
        /// Avatar data URL
        #[serde(default, skip_serializing_if = "Option::is_none")]
        texture: Option<String>,
    },

    /// Shared dynamic object (ball), sent by the authority only
    ObjectPose { pos: WireVec3, vel: WireVec3 },

    Score { score: Score },

    StartGame {
        #[serde(rename = "gameId")]
        game_id: String,
    },

    /// Any type this build does not understand
    #[serde(other)]
    Unknown,
}

impl WireMsg {
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Frames sent from the relay to a connected peer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// First frame after connecting
    Welcome {
        peer_id: Uuid,
        room: String,
        /// Whether this peer simulates shared objects for the room
        authority: bool,
    },

    PeerJoined { peer_id: Uuid },

    PeerLeft { peer_id: Uuid },

    /// A game message from another peer, passed through untouched
    Relay {
        from: Uuid,
        payload: serde_json::Value,
    },

    Error { code: String, message: String },
}

/// Relay accepts any JSON object carrying a string `type`
pub fn is_relayable(value: &serde_json::Value) -> bool {
    value
        .as_object()
        .and_then(|obj| obj.get("type"))
        .is_some_and(serde_json::Value::is_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pose_matches_wire_shape() {
        let msg = WireMsg::Pose {
            pos: Vec3::new(1.0, 2.0, 3.0).into(),
            rot: Quat::IDENTITY.into(),
            texture: None,
        };
        let value = msg.to_value().unwrap();
        assert_eq!(
            value,
            json!({
                "type": "pose",
                "pos": {"x": 1.0, "y": 2.0, "z": 3.0},
                "rot": {"x": 0.0, "y": 0.0, "z": 0.0, "w": 1.0}
            })
        );
    }

    #[test]
    fn score_and_start_game_use_camel_case_fields() {
        let score = WireMsg::decode(r#"{"type":"score","score":{"teamA":2,"teamB":1}}"#).unwrap();
        assert_eq!(
            score,
            WireMsg::Score {
                score: Score { team_a: 2, team_b: 1 }
            }
        );

        let start = WireMsg::decode(r#"{"type":"start_game","gameId":"soccer"}"#).unwrap();
        assert_eq!(
            start,
            WireMsg::StartGame {
                game_id: "soccer".to_string()
            }
        );
    }

    #[test]
    fn unknown_types_decode_to_unknown() {
        let msg = WireMsg::decode(r#"{"type":"emote","name":"wave"}"#).unwrap();
        assert_eq!(msg, WireMsg::Unknown);
    }

    #[test]
    fn malformed_messages_fail_to_decode() {
        assert!(WireMsg::decode(r#"{"type":"pose","pos":{"x":1}}"#).is_err());
        assert!(WireMsg::decode("not json").is_err());
        assert!(WireMsg::decode(r#"{"pos":{"x":1,"y":2,"z":3}}"#).is_err());
    }

    #[test]
    fn zero_quaternion_becomes_identity() {
        let q: Quat = WireQuat {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 0.0,
        }
        .into();
        assert_eq!(q, Quat::IDENTITY);
    }

    #[test]
    fn relayable_requires_string_type() {
        assert!(is_relayable(&json!({"type": "pose"})));
        assert!(!is_relayable(&json!({"type": 3})));
        assert!(!is_relayable(&json!(["pose"])));
    }

    #[test]
    fn relay_frame_shape() {
        let from = Uuid::nil();
        let frame = ServerMsg::Relay {
            from,
            payload: json!({"type": "pose"}),
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "relay");
        assert_eq!(value["payload"]["type"], "pose");
    }
}

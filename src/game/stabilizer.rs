//! Upright stabilization
//!
//! Torque suppression: while the player is alive the pitch and roll
//! components of angular velocity are zeroed every frame and yaw is left to
//! the physics step. Orientation is never pinned directly, so the two
//! correction styles are never mixed on the same body. When the player is
//! dead nothing is touched and the body ragdolls.

use glam::Vec3;

use super::physics::PhysicsBackend;
use super::player::Player;

pub struct UprightStabilizer;

impl UprightStabilizer {
    /// Returns true when a correction was written
    pub fn stabilize(player: &Player, physics: &mut dyn PhysicsBackend) -> bool {
        if !player.alive {
            return false;
        }
        let Some(body) = player.body else {
            return false;
        };
        let Some(angular) = physics.angular_velocity(body) else {
            return false;
        };

        physics.set_angular_velocity(body, Vec3::new(0.0, angular.y, 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::physics::{BodyDesc, SimplePhysics};

    fn spinning_player() -> (SimplePhysics, Player) {
        let mut physics = SimplePhysics::default();
        let body = physics
            .create_body(BodyDesc::player_capsule(Vec3::new(0.0, 5.0, 0.0), 1.0))
            .unwrap();
        physics.set_angular_velocity(body, Vec3::new(2.0, 1.5, -3.0));
        (physics, Player::new(body))
    }

    #[test]
    fn alive_player_keeps_only_yaw_spin() {
        let (mut physics, player) = spinning_player();
        assert!(UprightStabilizer::stabilize(&player, &mut physics));
        assert_eq!(
            physics.angular_velocity(player.body.unwrap()),
            Some(Vec3::new(0.0, 1.5, 0.0))
        );
    }

    #[test]
    fn pitch_and_roll_stay_zero_across_frames() {
        let (mut physics, player) = spinning_player();
        let body = player.body.unwrap();
        for frame in 0..30 {
            // Something knocks the body every few frames
            if frame % 5 == 0 {
                physics.apply_impulse(body, Vec3::X, Vec3::new(0.0, 6.0, 0.0));
            }
            UprightStabilizer::stabilize(&player, &mut physics);
            let w = physics.angular_velocity(body).unwrap();
            assert_eq!((w.x, w.z), (0.0, 0.0));
            physics.step(1.0 / 60.0);
        }
    }

    #[test]
    fn dead_player_is_left_to_tumble() {
        let (mut physics, mut player) = spinning_player();
        player.alive = false;
        let body = player.body.unwrap();
        let before = physics.angular_velocity(body);

        assert!(!UprightStabilizer::stabilize(&player, &mut physics));
        assert!(!UprightStabilizer::stabilize(&player, &mut physics));
        assert_eq!(physics.angular_velocity(body), before);
    }

    #[test]
    fn destroyed_body_is_skipped() {
        let (mut physics, player) = spinning_player();
        physics.destroy_body(player.body.unwrap());
        assert!(!UprightStabilizer::stabilize(&player, &mut physics));
    }
}

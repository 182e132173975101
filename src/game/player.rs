//! Player controller - input to velocity, jumping and facing

use std::f32::consts::{PI, TAU};

use glam::{Vec2, Vec3};

use super::physics::{BodyHandle, PhysicsBackend, RayFilter};

/// Controller tuning
#[derive(Debug, Clone, Copy)]
pub struct ControllerConfig {
    /// Horizontal speed in units per second
    pub player_speed: f32,
    /// Upward impulse applied on jump
    pub jump_impulse: f32,
    /// Fraction of the remaining turn applied per frame
    pub heading_smoothing: f32,
    /// Capsule height, used for the ground ray length
    pub body_height: f32,
    /// Extra ray length beyond half the body height
    pub ground_ray_margin: f32,
    pub body_mass: f32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            player_speed: 7.5,
            jump_impulse: 6.0,
            heading_smoothing: 0.2,
            body_height: 2.0,
            ground_ray_margin: 0.1,
            body_mass: 1.0,
        }
    }
}

/// Discrete directional keys (WASD / arrows)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionKeys {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
}

impl DirectionKeys {
    /// x = right, y = forward
    pub fn axis(&self) -> Vec2 {
        let mut axis = Vec2::ZERO;
        if self.forward {
            axis.y += 1.0;
        }
        if self.back {
            axis.y -= 1.0;
        }
        if self.right {
            axis.x += 1.0;
        }
        if self.left {
            axis.x -= 1.0;
        }
        axis
    }
}

/// Per-frame input sample
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlInput {
    /// On-screen stick, x = right, y = forward
    pub stick: Vec2,
    pub keys: DirectionKeys,
    /// Level state of the jump button
    pub jump_pressed: bool,
}

impl ControlInput {
    /// Stick and keys summed, unclamped
    pub fn combined(&self) -> Vec2 {
        self.stick + self.keys.axis()
    }
}

/// Camera orientation used to map input onto the ground plane
#[derive(Debug, Clone, Copy)]
pub struct CameraBasis {
    pub forward: Vec3,
    pub right: Vec3,
}

impl CameraBasis {
    /// Project both vectors onto XZ and re-normalize.
    ///
    /// A camera looking straight down has no horizontal forward; world axes
    /// are used in that case.
    pub fn flattened(&self) -> (Vec3, Vec3) {
        let flat = |v: Vec3, fallback: Vec3| {
            Vec3::new(v.x, 0.0, v.z).try_normalize().unwrap_or(fallback)
        };
        (flat(self.forward, Vec3::Z), flat(self.right, Vec3::X))
    }
}

impl Default for CameraBasis {
    fn default() -> Self {
        Self {
            forward: Vec3::Z,
            right: Vec3::X,
        }
    }
}

/// Locally controlled player
#[derive(Debug, Clone)]
pub struct Player {
    pub body: Option<BodyHandle>,
    pub alive: bool,
    /// Smoothed facing angle in radians (0 = +Z)
    pub heading: f32,
    /// Last non-zero horizontal heading (XZ as x/y), normalized
    pub move_direction: Vec2,
    jump_requested: bool,
    jump_was_pressed: bool,
}

impl Player {
    pub fn new(body: BodyHandle) -> Self {
        Self {
            body: Some(body),
            alive: true,
            heading: 0.0,
            move_direction: Vec2::ZERO,
            jump_requested: false,
            jump_was_pressed: false,
        }
    }

    pub fn jump_requested(&self) -> bool {
        self.jump_requested
    }

    /// Latch a jump on the rising edge of the button
    pub fn sample_jump(&mut self, pressed: bool) {
        if pressed && !self.jump_was_pressed {
            self.jump_requested = true;
        }
        self.jump_was_pressed = pressed;
    }

    pub fn position(&self, physics: &dyn PhysicsBackend) -> Option<glam::Vec3> {
        self.body.and_then(|b| physics.position(b))
    }

    /// Clear per-life control state after a respawn
    pub fn reset_controls(&mut self) {
        self.heading = 0.0;
        self.move_direction = Vec2::ZERO;
        self.jump_requested = false;
    }
}

/// Stateless controller operating on a [`Player`] and the physics backend
pub struct PlayerController;

impl PlayerController {
    /// Run the per-frame control law: movement, jump, facing
    pub fn update(
        player: &mut Player,
        input: &ControlInput,
        camera: &CameraBasis,
        physics: &mut dyn PhysicsBackend,
        config: &ControllerConfig,
    ) {
        player.sample_jump(input.jump_pressed);

        if !player.alive {
            // Dead players keep their latched jump cleared so nothing fires on respawn
            player.jump_requested = false;
            return;
        }

        Self::apply_movement(player, input, camera, physics, config);
        Self::apply_jump(player, physics, config);
        Self::smooth_heading(player, config.heading_smoothing);
    }

    /// Set horizontal velocity from input, preserving vertical velocity
    pub fn apply_movement(
        player: &mut Player,
        input: &ControlInput,
        camera: &CameraBasis,
        physics: &mut dyn PhysicsBackend,
        config: &ControllerConfig,
    ) {
        let Some(body) = player.body else {
            return;
        };
        let Some(current) = physics.linear_velocity(body) else {
            return;
        };

        let (forward, right) = camera.flattened();
        let combined = input.combined();
        let world = forward * combined.y + right * combined.x;

        let velocity = match world.try_normalize() {
            Some(dir) => {
                player.move_direction = Vec2::new(dir.x, dir.z);
                Vec3::new(dir.x * config.player_speed, current.y, dir.z * config.player_speed)
            }
            None => Vec3::new(0.0, current.y, 0.0),
        };

        physics.set_linear_velocity(body, velocity);
    }

    /// Consume the latched jump; impulse only when grounded
    pub fn apply_jump(
        player: &mut Player,
        physics: &mut dyn PhysicsBackend,
        config: &ControllerConfig,
    ) {
        if !std::mem::take(&mut player.jump_requested) {
            return;
        }
        let Some(body) = player.body else {
            return;
        };
        if !Self::is_grounded(body, physics, config) {
            return;
        }
        if let Some(at) = physics.position(body) {
            physics.apply_impulse(body, Vec3::new(0.0, config.jump_impulse, 0.0), at);
        }
    }

    /// Short downward ray against standing geometry
    pub fn is_grounded(
        body: BodyHandle,
        physics: &dyn PhysicsBackend,
        config: &ControllerConfig,
    ) -> bool {
        let Some(origin) = physics.position(body) else {
            return false;
        };
        let length = config.body_height / 2.0 + config.ground_ray_margin;
        physics
            .raycast(origin, Vec3::NEG_Y, length, RayFilter::standing_geometry(body))
            .is_some()
    }

    /// Exponential smoothing toward the move direction, not time-scaled
    pub fn smooth_heading(player: &mut Player, factor: f32) {
        if player.move_direction == Vec2::ZERO {
            return;
        }
        let target = player.move_direction.x.atan2(player.move_direction.y);
        player.heading = wrap_angle(player.heading + wrap_angle(target - player.heading) * factor);
    }
}

/// Wrap into [-PI, PI)
pub fn wrap_angle(angle: f32) -> f32 {
    (angle + PI).rem_euclid(TAU) - PI
}

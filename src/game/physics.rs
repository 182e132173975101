//! Physics backend seam and a minimal in-process backend
//!
//! The game core only talks to rigid bodies through [`PhysicsBackend`]. Every
//! accessor is existence-checked: reads return `None` and writes return
//! `false` for a handle that has been destroyed, so controllers can skip a
//! frame instead of faulting during a respawn.

use std::collections::BTreeMap;

use glam::{Quat, Vec3};

/// Opaque body identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(u32);

/// Collision shape
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BodyShape {
    Capsule { radius: f32, height: f32 },
    Cuboid { half_extents: Vec3 },
    Sphere { radius: f32 },
}

impl BodyShape {
    /// Axis-aligned half extents (rotation is ignored for contacts)
    pub fn half_extents(&self) -> Vec3 {
        match *self {
            BodyShape::Capsule { radius, height } => Vec3::new(radius, height / 2.0, radius),
            BodyShape::Cuboid { half_extents } => half_extents,
            BodyShape::Sphere { radius } => Vec3::splat(radius),
        }
    }
}

/// How the body takes part in the simulation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BodyKind {
    Dynamic { mass: f32 },
    /// Immovable, collides
    Static,
    /// Immovable, intersection queries only
    Sensor,
}

/// Gameplay role, used by ray filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyTag {
    Player,
    Geometry,
    Ball,
    Trigger,
}

/// Body creation parameters
#[derive(Debug, Clone, Copy)]
pub struct BodyDesc {
    pub shape: BodyShape,
    pub kind: BodyKind,
    pub tag: BodyTag,
    pub position: Vec3,
    pub rotation: Quat,
    pub restitution: f32,
    pub friction: f32,
}

impl BodyDesc {
    /// Player capsule: height 2, radius 0.5
    pub fn player_capsule(position: Vec3, mass: f32) -> Self {
        Self {
            shape: BodyShape::Capsule {
                radius: 0.5,
                height: 2.0,
            },
            kind: BodyKind::Dynamic { mass },
            tag: BodyTag::Player,
            position,
            rotation: Quat::IDENTITY,
            restitution: 0.1,
            friction: 0.5,
        }
    }

    pub fn static_box(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            shape: BodyShape::Cuboid { half_extents },
            kind: BodyKind::Static,
            tag: BodyTag::Geometry,
            position: center,
            rotation: Quat::IDENTITY,
            restitution: 0.0,
            friction: 0.5,
        }
    }

    pub fn trigger_box(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            kind: BodyKind::Sensor,
            tag: BodyTag::Trigger,
            ..Self::static_box(center, half_extents)
        }
    }

    pub fn ball(position: Vec3, radius: f32) -> Self {
        Self {
            shape: BodyShape::Sphere { radius },
            kind: BodyKind::Dynamic { mass: 1.0 },
            tag: BodyTag::Ball,
            position,
            rotation: Quat::IDENTITY,
            restitution: 0.8,
            friction: 0.2,
        }
    }
}

/// Which bodies a ray may hit
#[derive(Debug, Clone, Copy, Default)]
pub struct RayFilter {
    pub exclude: Option<BodyHandle>,
    pub skip_players: bool,
}

impl RayFilter {
    /// Standing geometry only: never self, never any player, never sensors
    pub fn standing_geometry(owner: BodyHandle) -> Self {
        Self {
            exclude: Some(owner),
            skip_players: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub body: BodyHandle,
    pub point: Vec3,
    pub distance: f32,
}

/// Physics errors
#[derive(Debug, thiserror::Error)]
pub enum PhysicsError {
    #[error("Physics backend is not ready")]
    NotReady,

    #[error("Invalid body description: {0}")]
    InvalidBody(&'static str),

    #[error("Physics backend failed to initialize: {0}")]
    Init(String),
}

/// Rigid-body backend consumed by the game core
pub trait PhysicsBackend: Send {
    fn is_ready(&self) -> bool;

    fn create_body(&mut self, desc: BodyDesc) -> Result<BodyHandle, PhysicsError>;
    /// Returns false when the body was already gone
    fn destroy_body(&mut self, body: BodyHandle) -> bool;
    fn contains(&self, body: BodyHandle) -> bool;

    fn position(&self, body: BodyHandle) -> Option<Vec3>;
    fn set_position(&mut self, body: BodyHandle, position: Vec3) -> bool;
    fn rotation(&self, body: BodyHandle) -> Option<Quat>;
    fn set_rotation(&mut self, body: BodyHandle, rotation: Quat) -> bool;

    fn linear_velocity(&self, body: BodyHandle) -> Option<Vec3>;
    fn set_linear_velocity(&mut self, body: BodyHandle, velocity: Vec3) -> bool;
    fn angular_velocity(&self, body: BodyHandle) -> Option<Vec3>;
    fn set_angular_velocity(&mut self, body: BodyHandle, velocity: Vec3) -> bool;

    fn apply_impulse(&mut self, body: BodyHandle, impulse: Vec3, at: Vec3) -> bool;

    fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        filter: RayFilter,
    ) -> Option<RayHit>;

    fn intersects(&self, a: BodyHandle, b: BodyHandle) -> bool;

    /// Advance the simulation by `dt` seconds
    fn step(&mut self, dt: f32);
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn from_center(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.cmplt(other.max).all() && other.min.cmplt(self.max).all()
    }

    /// Slab test; returns distance along the (normalized) direction
    pub fn ray_distance(&self, origin: Vec3, direction: Vec3) -> Option<f32> {
        let mut t_min = 0.0f32;
        let mut t_max = f32::INFINITY;

        for axis in 0..3 {
            let o = origin[axis];
            let d = direction[axis];
            if d.abs() < 1e-8 {
                if o < self.min[axis] || o > self.max[axis] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let mut t0 = (self.min[axis] - o) * inv;
            let mut t1 = (self.max[axis] - o) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }

        Some(t_min)
    }
}

#[derive(Debug, Clone)]
struct SimBody {
    shape: BodyShape,
    kind: BodyKind,
    tag: BodyTag,
    position: Vec3,
    rotation: Quat,
    linear_velocity: Vec3,
    angular_velocity: Vec3,
    restitution: f32,
    friction: f32,
}

impl SimBody {
    fn aabb(&self) -> Aabb {
        Aabb::from_center(self.position, self.shape.half_extents())
    }

    fn inverse_mass(&self) -> f32 {
        match self.kind {
            BodyKind::Dynamic { mass } if mass > 0.0 => 1.0 / mass,
            _ => 0.0,
        }
    }
}

/// Minimal backend: gravity, AABB contacts against static geometry, and
/// rotation driven purely by angular velocity. Dynamic bodies do not collide
/// with each other.
pub struct SimplePhysics {
    gravity: Vec3,
    bodies: BTreeMap<BodyHandle, SimBody>,
    next_id: u32,
    ready: bool,
}

impl SimplePhysics {
    pub fn new(gravity: Vec3) -> Self {
        Self {
            gravity,
            bodies: BTreeMap::new(),
            next_id: 1,
            ready: true,
        }
    }

    /// Backend that refuses body creation until [`SimplePhysics::mark_ready`]
    pub fn uninitialized(gravity: Vec3) -> Self {
        Self {
            ready: false,
            ..Self::new(gravity)
        }
    }

    pub fn mark_ready(&mut self) {
        self.ready = true;
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Contacts bounce along the normal and lose tangential speed to
    /// Coulomb friction, bounded by the normal velocity change
    fn resolve_static_contacts(body: &mut SimBody, statics: &[(Aabb, f32)]) {
        let half = body.shape.half_extents();
        for (solid, solid_friction) in statics {
            let own = Aabb::from_center(body.position, half);
            if !own.overlaps(solid) {
                continue;
            }

            // Push out along the axis of least penetration
            let push_neg = own.max - solid.min;
            let push_pos = solid.max - own.min;
            let mut best_axis = 0;
            let mut best_depth = f32::INFINITY;
            let mut best_sign = 1.0;
            for axis in 0..3 {
                if push_neg[axis] < best_depth {
                    best_depth = push_neg[axis];
                    best_axis = axis;
                    best_sign = -1.0;
                }
                if push_pos[axis] < best_depth {
                    best_depth = push_pos[axis];
                    best_axis = axis;
                    best_sign = 1.0;
                }
            }

            body.position[best_axis] += best_sign * best_depth;
            let v = body.linear_velocity[best_axis];
            if v * best_sign < 0.0 {
                body.linear_velocity[best_axis] = -v * body.restitution;

                let normal_change = v.abs() * (1.0 + body.restitution);
                let mu = (body.friction * solid_friction).sqrt();
                let mut tangent = body.linear_velocity;
                tangent[best_axis] = 0.0;
                let speed = tangent.length();
                if speed > 0.0 {
                    let slowed = (speed - mu * normal_change).max(0.0);
                    let scale = slowed / speed;
                    for axis in (0..3).filter(|a| *a != best_axis) {
                        body.linear_velocity[axis] *= scale;
                    }
                }
            }
        }
    }
}

impl Default for SimplePhysics {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, -9.81, 0.0))
    }
}

impl PhysicsBackend for SimplePhysics {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn create_body(&mut self, desc: BodyDesc) -> Result<BodyHandle, PhysicsError> {
        if !self.ready {
            return Err(PhysicsError::NotReady);
        }
        if !desc.shape.half_extents().cmpgt(Vec3::ZERO).all() {
            return Err(PhysicsError::InvalidBody("shape extents must be positive"));
        }
        if let BodyKind::Dynamic { mass } = desc.kind {
            if mass <= 0.0 {
                return Err(PhysicsError::InvalidBody("dynamic mass must be positive"));
            }
        }

        let handle = BodyHandle(self.next_id);
        self.next_id += 1;
        self.bodies.insert(
            handle,
            SimBody {
                shape: desc.shape,
                kind: desc.kind,
                tag: desc.tag,
                position: desc.position,
                rotation: desc.rotation.normalize(),
                linear_velocity: Vec3::ZERO,
                angular_velocity: Vec3::ZERO,
                restitution: desc.restitution,
                friction: desc.friction.max(0.0),
            },
        );
        Ok(handle)
    }

    fn destroy_body(&mut self, body: BodyHandle) -> bool {
        self.bodies.remove(&body).is_some()
    }

    fn contains(&self, body: BodyHandle) -> bool {
        self.bodies.contains_key(&body)
    }

    fn position(&self, body: BodyHandle) -> Option<Vec3> {
        self.bodies.get(&body).map(|b| b.position)
    }

    fn set_position(&mut self, body: BodyHandle, position: Vec3) -> bool {
        match self.bodies.get_mut(&body) {
            Some(b) => {
                b.position = position;
                true
            }
            None => false,
        }
    }

    fn rotation(&self, body: BodyHandle) -> Option<Quat> {
        self.bodies.get(&body).map(|b| b.rotation)
    }

    fn set_rotation(&mut self, body: BodyHandle, rotation: Quat) -> bool {
        match self.bodies.get_mut(&body) {
            Some(b) => {
                b.rotation = rotation.normalize();
                true
            }
            None => false,
        }
    }

    fn linear_velocity(&self, body: BodyHandle) -> Option<Vec3> {
        self.bodies.get(&body).map(|b| b.linear_velocity)
    }

    fn set_linear_velocity(&mut self, body: BodyHandle, velocity: Vec3) -> bool {
        match self.bodies.get_mut(&body) {
            Some(b) => {
                b.linear_velocity = velocity;
                true
            }
            None => false,
        }
    }

    fn angular_velocity(&self, body: BodyHandle) -> Option<Vec3> {
        self.bodies.get(&body).map(|b| b.angular_velocity)
    }

    fn set_angular_velocity(&mut self, body: BodyHandle, velocity: Vec3) -> bool {
        match self.bodies.get_mut(&body) {
            Some(b) => {
                b.angular_velocity = velocity;
                true
            }
            None => false,
        }
    }

    fn apply_impulse(&mut self, body: BodyHandle, impulse: Vec3, at: Vec3) -> bool {
        match self.bodies.get_mut(&body) {
            Some(b) => {
                let inv_mass = b.inverse_mass();
                b.linear_velocity += impulse * inv_mass;
                // Off-centre impulses spin the body (unit inertia approximation)
                b.angular_velocity += (at - b.position).cross(impulse) * inv_mass;
                true
            }
            None => false,
        }
    }

    fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        filter: RayFilter,
    ) -> Option<RayHit> {
        let direction = direction.try_normalize()?;

        self.bodies
            .iter()
            .filter(|(handle, body)| {
                Some(**handle) != filter.exclude
                    && body.kind != BodyKind::Sensor
                    && !(filter.skip_players && body.tag == BodyTag::Player)
            })
            .filter_map(|(handle, body)| {
                body.aabb()
                    .ray_distance(origin, direction)
                    .filter(|d| *d <= max_distance)
                    .map(|distance| RayHit {
                        body: *handle,
                        point: origin + direction * distance,
                        distance,
                    })
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    fn intersects(&self, a: BodyHandle, b: BodyHandle) -> bool {
        match (self.bodies.get(&a), self.bodies.get(&b)) {
            (Some(a), Some(b)) => a.aabb().overlaps(&b.aabb()),
            _ => false,
        }
    }

    fn step(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }

        let statics: Vec<(Aabb, f32)> = self
            .bodies
            .values()
            .filter(|b| b.kind == BodyKind::Static)
            .map(|b| (b.aabb(), b.friction))
            .collect();

        let gravity = self.gravity;
        for body in self.bodies.values_mut() {
            if !matches!(body.kind, BodyKind::Dynamic { .. }) {
                continue;
            }

            body.linear_velocity += gravity * dt;
            body.position += body.linear_velocity * dt;

            if body.angular_velocity != Vec3::ZERO {
                let spin = Quat::from_scaled_axis(body.angular_velocity * dt);
                body.rotation = (spin * body.rotation).normalize();
            }

            Self::resolve_static_contacts(body, &statics);
        }
    }
}

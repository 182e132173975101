//! Static level geometry for both mini-games

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::physics::{BodyDesc, BodyHandle, PhysicsBackend, PhysicsError};

pub const TOWER_COUNT: usize = 15;

/// Placement of one survival tower
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TowerSpec {
    pub center: Vec3,
    pub width: f32,
    pub depth: f32,
    pub height: f32,
}

/// Deterministic tower layout for a seed
pub fn tower_layout(seed: u64) -> Vec<TowerSpec> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..TOWER_COUNT)
        .map(|_| {
            let height = rng.gen_range(5.0f32..=25.0);
            let width = rng.gen_range(8..=12) as f32;
            let depth = rng.gen_range(8..=12) as f32;
            let x = rng.gen_range(-45..=45) as f32;
            let z = rng.gen_range(-45..=45) as f32;
            TowerSpec {
                center: Vec3::new(x, height / 2.0, z),
                width,
                depth,
                height,
            }
        })
        .collect()
}

/// Gap kept between a tower top and the bottom of a spawning player
pub const SPAWN_CLEARANCE: f32 = 1.0;

/// Lift `spawn` so a body with `half_extents` starts clear of every tower
/// whose footprint it overlaps
pub fn spawn_above_towers(layout: &[TowerSpec], spawn: Vec3, half_extents: Vec3) -> Vec3 {
    let floor = layout
        .iter()
        .filter(|t| {
            (spawn.x - t.center.x).abs() < t.width / 2.0 + half_extents.x
                && (spawn.z - t.center.z).abs() < t.depth / 2.0 + half_extents.z
        })
        .map(|t| t.height + SPAWN_CLEARANCE + half_extents.y)
        .fold(spawn.y, f32::max);
    Vec3::new(spawn.x, floor, spawn.z)
}

/// Ground slab with its top face at y = 0
fn ground(physics: &mut dyn PhysicsBackend, width: f32, depth: f32) -> Result<BodyHandle, PhysicsError> {
    physics.create_body(BodyDesc::static_box(
        Vec3::new(0.0, -0.5, 0.0),
        Vec3::new(width / 2.0, 0.5, depth / 2.0),
    ))
}

/// 100x100 ground plus the towers; returns every created body
pub fn build_disaster_map(
    physics: &mut dyn PhysicsBackend,
    seed: u64,
) -> Result<Vec<BodyHandle>, PhysicsError> {
    let mut bodies = vec![ground(physics, 100.0, 100.0)?];
    for tower in tower_layout(seed) {
        bodies.push(physics.create_body(BodyDesc::static_box(
            tower.center,
            Vec3::new(tower.width / 2.0, tower.height / 2.0, tower.depth / 2.0),
        ))?);
    }
    Ok(bodies)
}

/// Soccer pitch bodies
#[derive(Debug, Clone)]
pub struct SoccerField {
    pub bodies: Vec<BodyHandle>,
    /// Trigger in front of the goal at -Z (team A defends it)
    pub goal_a_trigger: BodyHandle,
    /// Trigger in front of the goal at +Z (team B defends it)
    pub goal_b_trigger: BodyHandle,
}

pub const FIELD_WIDTH: f32 = 40.0;
pub const FIELD_LENGTH: f32 = 60.0;

/// 40x60 pitch, four walls and the two goal triggers
pub fn build_soccer_field(physics: &mut dyn PhysicsBackend) -> Result<SoccerField, PhysicsError> {
    let half_w = FIELD_WIDTH / 2.0;
    let half_l = FIELD_LENGTH / 2.0;
    let mut bodies = vec![ground(physics, FIELD_WIDTH, FIELD_LENGTH)?];

    // End walls sit behind the goal mouths so a scoring ball stays inside the trigger
    let walls = [
        (Vec3::new(0.0, 1.5, half_l + 0.5), Vec3::new(half_w, 1.5, 0.5)),
        (Vec3::new(0.0, 1.5, -half_l - 0.5), Vec3::new(half_w, 1.5, 0.5)),
        (Vec3::new(half_w + 0.5, 1.5, 0.0), Vec3::new(0.5, 1.5, half_l)),
        (Vec3::new(-half_w - 0.5, 1.5, 0.0), Vec3::new(0.5, 1.5, half_l)),
    ];
    for (center, half) in walls {
        bodies.push(physics.create_body(BodyDesc::static_box(center, half))?);
    }

    let trigger_half = Vec3::new(5.0, 2.5, 1.0);
    let goal_a_trigger =
        physics.create_body(BodyDesc::trigger_box(Vec3::new(0.0, 2.5, -half_l + 1.0), trigger_half))?;
    let goal_b_trigger =
        physics.create_body(BodyDesc::trigger_box(Vec3::new(0.0, 2.5, half_l - 1.0), trigger_half))?;
    bodies.push(goal_a_trigger);
    bodies.push(goal_b_trigger);

    Ok(SoccerField {
        bodies,
        goal_a_trigger,
        goal_b_trigger,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::physics::SimplePhysics;

    #[test]
    fn layout_is_deterministic_and_in_bounds() {
        let a = tower_layout(42);
        let b = tower_layout(42);
        assert_eq!(a, b);
        assert_eq!(a.len(), TOWER_COUNT);
        for tower in &a {
            assert!((5.0..=25.0).contains(&tower.height));
            assert!((8.0..=12.0).contains(&tower.width));
            assert!((8.0..=12.0).contains(&tower.depth));
            assert_eq!(tower.width.fract(), 0.0);
            assert!(tower.center.x.abs() <= 45.0 && tower.center.z.abs() <= 45.0);
            assert!((tower.center.y - tower.height / 2.0).abs() < f32::EPSILON);
        }
        assert_ne!(tower_layout(7), a);
    }

    #[test]
    fn spawn_is_lifted_over_a_tower_at_the_origin() {
        let half = Vec3::new(0.5, 1.0, 0.5);
        let tall = TowerSpec {
            center: Vec3::new(2.0, 10.0, -3.0),
            width: 8.0,
            depth: 10.0,
            height: 20.0,
        };
        let short = TowerSpec {
            center: Vec3::new(0.0, 3.0, 0.0),
            width: 8.0,
            depth: 8.0,
            height: 6.0,
        };
        let far = TowerSpec {
            center: Vec3::new(40.0, 12.5, 40.0),
            width: 12.0,
            depth: 12.0,
            height: 25.0,
        };
        let spawn = Vec3::new(0.0, 15.0, 0.0);

        assert_eq!(spawn_above_towers(&[short, far], spawn, half), spawn);
        assert_eq!(
            spawn_above_towers(&[short, tall, far], spawn, half),
            Vec3::new(0.0, 22.0, 0.0)
        );
    }

    #[test]
    fn lifted_spawn_never_overlaps_towers() {
        let half = Vec3::new(0.5, 1.0, 0.5);
        for seed in 0..200 {
            let layout = tower_layout(seed);
            let spawn = spawn_above_towers(&layout, Vec3::new(0.0, 15.0, 0.0), half);
            assert!(spawn.y >= 15.0);
            for tower in &layout {
                let overlaps_footprint = (spawn.x - tower.center.x).abs() < tower.width / 2.0 + half.x
                    && (spawn.z - tower.center.z).abs() < tower.depth / 2.0 + half.z;
                if overlaps_footprint {
                    assert!(spawn.y - half.y >= tower.height + SPAWN_CLEARANCE, "seed {}", seed);
                }
            }
        }
    }

    #[test]
    fn maps_create_expected_bodies() {
        let mut physics = SimplePhysics::default();
        let bodies = build_disaster_map(&mut physics, 1).unwrap();
        assert_eq!(bodies.len(), TOWER_COUNT + 1);

        let field = build_soccer_field(&mut physics).unwrap();
        assert_eq!(field.bodies.len(), 7);
        assert_eq!(physics.body_count(), TOWER_COUNT + 1 + 7);
        assert_eq!(physics.position(field.goal_b_trigger).unwrap().z, 29.0);
    }
}

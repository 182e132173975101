//! 1v1 soccer: ball, goals and score

use glam::Vec3;
use tracing::info;

use crate::ws::protocol::Score;

use super::map::{build_soccer_field, SoccerField};
use super::physics::{BodyDesc, BodyHandle, PhysicsBackend, PhysicsError};

pub const BALL_RADIUS: f32 = 0.75;
pub const BALL_SPAWN: Vec3 = Vec3::new(0.0, 5.0, 0.0);
pub const PLAYER_SPAWN: Vec3 = Vec3::new(0.0, 5.0, -20.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Team {
    /// Blue, attacks +Z
    A,
    /// Red, attacks -Z
    B,
}

pub struct SoccerMatch {
    field: SoccerField,
    ball: BodyHandle,
    score: Score,
}

impl SoccerMatch {
    pub fn setup(physics: &mut dyn PhysicsBackend) -> Result<Self, PhysicsError> {
        let field = build_soccer_field(physics)?;
        let ball = physics.create_body(BodyDesc::ball(BALL_SPAWN, BALL_RADIUS))?;
        Ok(Self {
            field,
            ball,
            score: Score::default(),
        })
    }

    pub fn ball(&self) -> BodyHandle {
        self.ball
    }

    pub fn score(&self) -> Score {
        self.score
    }

    /// Every body owned by the match, ball included
    pub fn bodies(&self) -> impl Iterator<Item = BodyHandle> + '_ {
        self.field.bodies.iter().copied().chain(std::iter::once(self.ball))
    }

    /// Authoritative goal detection. The ball is re-centred after a goal so
    /// one shot is counted once.
    pub fn check_goal(&mut self, physics: &mut dyn PhysicsBackend) -> Option<Team> {
        let team = if physics.intersects(self.ball, self.field.goal_a_trigger) {
            Team::B
        } else if physics.intersects(self.ball, self.field.goal_b_trigger) {
            Team::A
        } else {
            return None;
        };

        match team {
            Team::A => self.score.team_a += 1,
            Team::B => self.score.team_b += 1,
        }
        physics.set_position(self.ball, BALL_SPAWN);
        physics.set_linear_velocity(self.ball, Vec3::ZERO);
        physics.set_angular_velocity(self.ball, Vec3::ZERO);

        info!(team = ?team, team_a = self.score.team_a, team_b = self.score.team_b, "Goal");
        Some(team)
    }

    /// Scoreboard received from the authoritative peer
    pub fn apply_remote_score(&mut self, score: Score) {
        self.score = score;
    }

    pub fn scoreboard(&self) -> String {
        format!("Blue {} - {} Red", self.score.team_a, self.score.team_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::physics::SimplePhysics;

    #[test]
    fn ball_in_goal_scores_once_and_recentres() {
        let mut physics = SimplePhysics::default();
        let mut soccer = SoccerMatch::setup(&mut physics).unwrap();
        let ball = soccer.ball();

        assert_eq!(soccer.check_goal(&mut physics), None);

        physics.set_position(ball, Vec3::new(0.0, 1.0, 29.5));
        physics.set_linear_velocity(ball, Vec3::new(0.0, 0.0, 8.0));
        assert_eq!(soccer.check_goal(&mut physics), Some(Team::A));
        assert_eq!(soccer.check_goal(&mut physics), None);
        assert_eq!(soccer.score(), Score { team_a: 1, team_b: 0 });
        assert_eq!(physics.position(ball), Some(BALL_SPAWN));
        assert_eq!(physics.linear_velocity(ball), Some(Vec3::ZERO));

        physics.set_position(ball, Vec3::new(2.0, 1.0, -29.0));
        assert_eq!(soccer.check_goal(&mut physics), Some(Team::B));
        assert_eq!(soccer.scoreboard(), "Blue 1 - 1 Red");
    }

    #[test]
    fn remote_score_replaces_local() {
        let mut physics = SimplePhysics::default();
        let mut soccer = SoccerMatch::setup(&mut physics).unwrap();
        soccer.apply_remote_score(Score { team_a: 3, team_b: 2 });
        assert_eq!(soccer.score(), Score { team_a: 3, team_b: 2 });
        assert_eq!(soccer.bodies().count(), 8);
    }
}

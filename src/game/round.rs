//! Round state machine: intermission, rising lava, round end, reset

use std::fmt;
use std::str::FromStr;

use glam::{Quat, Vec3};
use tracing::{debug, error, info};

use super::hud::{AudioCues, HudSink, HudValue};
use super::physics::{BodyDesc, PhysicsBackend};
use super::player::Player;
use super::scheduler::{ScheduledTask, Scheduler, TaskId, TaskKind};

pub const MSG_INTERMISSION: &str = "Intermission - get ready!";
pub const MSG_HAZARD: &str = "THE LAVA IS RISING! CLIMB!";
pub const MSG_HAZARD_DETAIL: &str = "SURVIVE!";
pub const MSG_ELIMINATED: &str = "YOU WERE ELIMINATED!";
pub const MSG_ELIMINATED_DETAIL: &str = "Wait for the next round";
pub const MSG_SURVIVED: &str = "You survived!";
pub const MSG_NOT_SURVIVED: &str = "You did not survive...";
pub const MSG_NEXT_ROUND: &str = "Wait for the next round.";

/// What happens to the player body at reset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespawnPolicy {
    /// Destroy the body and build a fresh one at the spawn point
    Recreate,
    /// Keep the body, move it to spawn and zero all motion
    Reposition,
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown respawn policy: {0}")]
pub struct UnknownRespawnPolicy(String);

impl FromStr for RespawnPolicy {
    type Err = UnknownRespawnPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "recreate" => Ok(Self::Recreate),
            "reposition" => Ok(Self::Reposition),
            other => Err(UnknownRespawnPolicy(other.to_string())),
        }
    }
}

/// Round timing and hazard tuning
#[derive(Debug, Clone, Copy)]
pub struct RoundConfig {
    pub intermission_secs: u32,
    pub countdown_interval_ms: u64,
    pub hazard_duration_ms: u64,
    pub round_end_delay_ms: u64,
    pub hazard_start_y: f32,
    /// Delta-time scaled; 1.8/s equals 0.03 per frame at 60 fps
    pub hazard_rise_per_sec: f32,
    pub spawn_point: Vec3,
    pub respawn_policy: RespawnPolicy,
    pub player_mass: f32,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            intermission_secs: 15,
            countdown_interval_ms: 1000,
            hazard_duration_ms: 45_000,
            round_end_delay_ms: 5_000,
            hazard_start_y: -20.0,
            hazard_rise_per_sec: 1.8,
            spawn_point: Vec3::new(0.0, 15.0, 0.0),
            respawn_policy: RespawnPolicy::Recreate,
            player_mass: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    Intermission { seconds_remaining: u32 },
    Hazard { elapsed_ms: u64 },
    RoundEnd,
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundPhase::Intermission { .. } => f.write_str("intermission"),
            RoundPhase::Hazard { .. } => f.write_str("hazard"),
            RoundPhase::RoundEnd => f.write_str("round_end"),
        }
    }
}

/// The rising lava plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hazard {
    pub elevation: f32,
    pub created_at_ms: u64,
}

impl Hazard {
    /// Elevation only ever moves up
    pub fn rise(&mut self, amount: f32) {
        if amount > 0.0 {
            self.elevation += amount;
        }
    }
}

/// Everything a round transition may touch, borrowed from the session
pub struct RoundContext<'a> {
    pub physics: &'a mut dyn PhysicsBackend,
    pub player: &'a mut Player,
    pub scheduler: &'a mut Scheduler,
    pub hud: &'a mut dyn HudSink,
    pub audio: &'a mut dyn AudioCues,
    pub now_ms: u64,
}

pub struct RoundMachine {
    config: RoundConfig,
    phase: RoundPhase,
    hazard: Option<Hazard>,
    countdown_task: Option<TaskId>,
    hazard_end_task: Option<TaskId>,
    reset_task: Option<TaskId>,
    rounds_completed: u32,
    deaths: u32,
}

impl RoundMachine {
    pub fn new(config: RoundConfig) -> Self {
        Self {
            phase: RoundPhase::Intermission {
                seconds_remaining: config.intermission_secs,
            },
            config,
            hazard: None,
            countdown_task: None,
            hazard_end_task: None,
            reset_task: None,
            rounds_completed: 0,
            deaths: 0,
        }
    }

    pub fn config(&self) -> &RoundConfig {
        &self.config
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn hazard(&self) -> Option<&Hazard> {
        self.hazard.as_ref()
    }

    pub fn rounds_completed(&self) -> u32 {
        self.rounds_completed
    }

    /// Number of deaths registered since the machine was created
    pub fn deaths(&self) -> u32 {
        self.deaths
    }

    /// Begin the first intermission
    pub fn start(&mut self, ctx: &mut RoundContext<'_>) {
        self.enter_intermission(ctx);
    }

    /// Per-frame work: death check first, then the hazard rise
    pub fn update_frame(&mut self, dt_secs: f32, dt_ms: u64, ctx: &mut RoundContext<'_>) {
        self.check_death(ctx);

        if let RoundPhase::Hazard { elapsed_ms } = &mut self.phase {
            *elapsed_ms += dt_ms;
            if let Some(hazard) = self.hazard.as_mut() {
                hazard.rise(self.config.hazard_rise_per_sec * dt_secs);
            }
        }
    }

    /// Handle a scheduler wake-up. Tasks that no longer match the phase are
    /// ignored.
    pub fn on_task(&mut self, task: ScheduledTask, ctx: &mut RoundContext<'_>) {
        match (task.kind, self.phase) {
            (TaskKind::CountdownTick, RoundPhase::Intermission { seconds_remaining }) => {
                let seconds_remaining = seconds_remaining.saturating_sub(1);
                self.phase = RoundPhase::Intermission { seconds_remaining };
                ctx.hud.update(MSG_INTERMISSION, seconds_remaining.into());
                if seconds_remaining == 0 {
                    if let Some(id) = self.countdown_task.take() {
                        ctx.scheduler.cancel(id);
                    }
                    self.enter_hazard(ctx);
                }
            }
            (TaskKind::HazardEnd, RoundPhase::Hazard { .. }) => {
                self.hazard_end_task = None;
                self.enter_round_end(ctx);
            }
            (TaskKind::RoundReset, RoundPhase::RoundEnd) => {
                self.reset_task = None;
                self.reset_player(ctx);
                self.rounds_completed += 1;
                self.enter_intermission(ctx);
            }
            (kind, phase) => {
                debug!(task = ?kind, %phase, "Ignoring stale round task");
            }
        }
    }

    /// Kill the local player if below the hazard. Only the first call per
    /// life has any effect.
    pub fn check_death(&mut self, ctx: &mut RoundContext<'_>) -> bool {
        let Some(hazard) = self.hazard else {
            return false;
        };
        if !ctx.player.alive {
            return false;
        }
        let Some(position) = ctx.player.position(&*ctx.physics) else {
            return false;
        };
        if position.y < hazard.elevation {
            self.kill_player(ctx)
        } else {
            false
        }
    }

    /// Idempotent death handler
    pub fn kill_player(&mut self, ctx: &mut RoundContext<'_>) -> bool {
        if !ctx.player.alive {
            return false;
        }
        ctx.player.alive = false;
        self.deaths += 1;
        ctx.audio.player_fall();
        ctx.hud.update(MSG_ELIMINATED, MSG_ELIMINATED_DETAIL.into());
        info!(deaths = self.deaths, "Local player eliminated");
        true
    }

    /// Cancel pending round tasks and drop the hazard
    pub fn stop(&mut self, scheduler: &mut Scheduler) {
        for id in [
            self.countdown_task.take(),
            self.hazard_end_task.take(),
            self.reset_task.take(),
        ]
        .into_iter()
        .flatten()
        {
            scheduler.cancel(id);
        }
        self.hazard = None;
    }

    fn enter_intermission(&mut self, ctx: &mut RoundContext<'_>) {
        let seconds_remaining = self.config.intermission_secs;
        self.phase = RoundPhase::Intermission { seconds_remaining };
        ctx.hud.update(MSG_INTERMISSION, seconds_remaining.into());
        info!(seconds = seconds_remaining, "Intermission started");

        if seconds_remaining == 0 {
            self.enter_hazard(ctx);
            return;
        }
        self.countdown_task = Some(ctx.scheduler.schedule_repeating(
            ctx.now_ms,
            self.config.countdown_interval_ms,
            TaskKind::CountdownTick,
        ));
    }

    fn enter_hazard(&mut self, ctx: &mut RoundContext<'_>) {
        ctx.hud.update(MSG_HAZARD, MSG_HAZARD_DETAIL.into());
        self.hazard = Some(Hazard {
            elevation: self.config.hazard_start_y,
            created_at_ms: ctx.now_ms,
        });
        self.phase = RoundPhase::Hazard { elapsed_ms: 0 };
        self.hazard_end_task = Some(ctx.scheduler.schedule_once(
            ctx.now_ms,
            self.config.hazard_duration_ms,
            TaskKind::HazardEnd,
        ));
        info!(
            start_y = self.config.hazard_start_y,
            duration_ms = self.config.hazard_duration_ms,
            "Hazard started"
        );
    }

    fn enter_round_end(&mut self, ctx: &mut RoundContext<'_>) {
        let survived = ctx.player.alive;
        let headline = if survived {
            MSG_SURVIVED
        } else {
            MSG_NOT_SURVIVED
        };
        ctx.hud.update(headline, HudValue::from(MSG_NEXT_ROUND));

        if let Some(hazard) = self.hazard.take() {
            debug!(final_y = hazard.elevation, "Hazard removed");
        }
        self.phase = RoundPhase::RoundEnd;
        self.reset_task = Some(ctx.scheduler.schedule_once(
            ctx.now_ms,
            self.config.round_end_delay_ms,
            TaskKind::RoundReset,
        ));
        info!(survived, "Round ended");
    }

    /// Put the player back at spawn, alive, per the respawn policy
    pub fn reset_player(&mut self, ctx: &mut RoundContext<'_>) {
        let spawn = self.config.spawn_point;
        let existing = ctx.player.body.filter(|b| ctx.physics.contains(*b));

        match (self.config.respawn_policy, existing) {
            (RespawnPolicy::Reposition, Some(body)) => {
                ctx.physics.set_position(body, spawn);
                ctx.physics.set_rotation(body, Quat::IDENTITY);
                ctx.physics.set_linear_velocity(body, Vec3::ZERO);
                ctx.physics.set_angular_velocity(body, Vec3::ZERO);
            }
            (_, existing) => {
                if let Some(body) = existing {
                    ctx.physics.destroy_body(body);
                }
                ctx.player.body = match ctx
                    .physics
                    .create_body(BodyDesc::player_capsule(spawn, self.config.player_mass))
                {
                    Ok(body) => Some(body),
                    Err(e) => {
                        error!(error = %e, "Failed to recreate player body");
                        None
                    }
                };
            }
        }

        ctx.player.alive = true;
        ctx.player.reset_controls();
    }
}

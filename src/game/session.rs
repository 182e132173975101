//! Game session lifecycle and the per-frame pipeline
//!
//! A session owns everything a running mini-game touches: the physics
//! backend, the local player, the round machine or soccer match, the task
//! scheduler and the replication link. Nothing lives in globals, so several
//! sessions can run side by side.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::net::{
    OfflineTransport, ReplicationConfig, ReplicationEvent, Replicator, Transport,
};
use crate::util::time::SessionClock;
use crate::ws::protocol::WireMsg;

use super::avatar::Appearance;
use super::hud::{AudioCues, HudSink, TracingAudio, TracingHud};
use super::map::{build_disaster_map, spawn_above_towers, tower_layout};
use super::physics::{BodyDesc, BodyHandle, PhysicsBackend, PhysicsError};
use super::player::{CameraBasis, ControlInput, ControllerConfig, Player, PlayerController};
use super::round::{RoundConfig, RoundContext, RoundMachine, RoundPhase};
use super::scheduler::Scheduler;
use super::soccer::{SoccerMatch, PLAYER_SPAWN};
use super::stabilizer::UprightStabilizer;

pub const MSG_SCORE: &str = "Score";

/// Which mini-game to launch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameKind {
    Survival,
    Soccer,
}

impl GameKind {
    /// Id used in `start_game` announcements
    pub fn as_str(&self) -> &'static str {
        match self {
            GameKind::Survival => "disaster",
            GameKind::Soccer => "soccer",
        }
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown game id: {0}")]
pub struct UnknownGame(pub String);

impl FromStr for GameKind {
    type Err = UnknownGame;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disaster" | "survival" => Ok(GameKind::Survival),
            "soccer" => Ok(GameKind::Soccer),
            other => Err(UnknownGame(other.to_string())),
        }
    }
}

pub enum GameMode {
    Survival(RoundMachine),
    Soccer(SoccerMatch),
}

/// Collaborators and tunables handed to [`launch`]
pub struct SessionContext {
    pub hud: Box<dyn HudSink>,
    pub audio: Box<dyn AudioCues>,
    pub transport: Box<dyn Transport>,
    pub appearance: Appearance,
    pub round: RoundConfig,
    pub controller: ControllerConfig,
    pub replication: ReplicationConfig,
    pub map_seed: u64,
}

impl SessionContext {
    /// Single-player context that logs HUD updates
    pub fn offline() -> Self {
        Self {
            hud: Box::new(TracingHud),
            audio: Box::new(TracingAudio),
            transport: Box::new(OfflineTransport),
            appearance: Appearance::default(),
            round: RoundConfig::default(),
            controller: ControllerConfig::default(),
            replication: ReplicationConfig::default(),
            map_seed: 0,
        }
    }
}

/// Result of a launch. The shell validates it before taking the session.
pub struct LaunchedGame {
    pub session: GameSession,
    pub player: Option<BodyHandle>,
}

impl LaunchedGame {
    /// Reject a launch whose player body is missing from the backend
    pub fn validate(self) -> Result<GameSession, LaunchError> {
        match self.player {
            Some(body) if self.session.physics.contains(body) => Ok(self.session),
            _ => Err(LaunchError::MissingPlayer),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Physics backend is not ready")]
    BackendNotReady,

    #[error("Physics error: {0}")]
    Physics(#[from] PhysicsError),

    #[error("Launch returned no player body")]
    MissingPlayer,
}

/// Wait for the physics backend, then build the level and player
pub async fn launch<F>(kind: GameKind, ctx: SessionContext, backend: F) -> Result<LaunchedGame, LaunchError>
where
    F: Future<Output = Result<Box<dyn PhysicsBackend>, PhysicsError>>,
{
    let physics = backend.await?;
    if !physics.is_ready() {
        return Err(LaunchError::BackendNotReady);
    }
    let session = GameSession::build(kind, ctx, physics)?;
    let player = session.player.body;
    info!(kind = %kind, "Game launched");
    Ok(LaunchedGame { session, player })
}

pub struct GameSession {
    kind: GameKind,
    physics: Box<dyn PhysicsBackend>,
    player: Player,
    mode: GameMode,
    scheduler: Scheduler,
    replicator: Replicator,
    transport: Box<dyn Transport>,
    hud: Box<dyn HudSink>,
    audio: Box<dyn AudioCues>,
    clock: SessionClock,
    controller: ControllerConfig,
    camera: CameraBasis,
    static_bodies: Vec<BodyHandle>,
    torn_down: bool,
}

impl GameSession {
    fn build(
        kind: GameKind,
        ctx: SessionContext,
        mut physics: Box<dyn PhysicsBackend>,
    ) -> Result<Self, PhysicsError> {
        let mut replicator = Replicator::new(ctx.replication);
        replicator.set_local_texture(ctx.appearance.texture().map(|t| t.as_str().to_string()));

        let (mode, static_bodies, spawn) = match kind {
            GameKind::Survival => {
                let bodies = build_disaster_map(physics.as_mut(), ctx.map_seed)?;
                let mut round = ctx.round;
                round.spawn_point = spawn_above_towers(
                    &tower_layout(ctx.map_seed),
                    round.spawn_point,
                    BodyDesc::player_capsule(round.spawn_point, round.player_mass).shape.half_extents(),
                );
                let spawn = round.spawn_point;
                (GameMode::Survival(RoundMachine::new(round)), bodies, spawn)
            }
            GameKind::Soccer => {
                let soccer = SoccerMatch::setup(physics.as_mut())?;
                replicator.set_shared_object(Some(soccer.ball()));
                (GameMode::Soccer(soccer), Vec::new(), PLAYER_SPAWN)
            }
        };

        let body = physics.create_body(BodyDesc::player_capsule(spawn, ctx.controller.body_mass))?;

        let mut session = Self {
            kind,
            physics,
            player: Player::new(body),
            mode,
            scheduler: Scheduler::new(),
            replicator,
            transport: ctx.transport,
            hud: ctx.hud,
            audio: ctx.audio,
            clock: SessionClock::new(),
            controller: ctx.controller,
            camera: CameraBasis::default(),
            static_bodies,
            torn_down: false,
        };
        session.start();
        Ok(session)
    }

    fn start(&mut self) {
        let now_ms = self.clock.now_ms();
        match &mut self.mode {
            GameMode::Survival(round) => {
                let mut ctx = RoundContext {
                    physics: self.physics.as_mut(),
                    player: &mut self.player,
                    scheduler: &mut self.scheduler,
                    hud: self.hud.as_mut(),
                    audio: self.audio.as_mut(),
                    now_ms,
                };
                round.start(&mut ctx);
            }
            GameMode::Soccer(soccer) => {
                self.hud.update(MSG_SCORE, soccer.scoreboard().into());
            }
        }
    }

    pub fn kind(&self) -> GameKind {
        self.kind
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn physics(&self) -> &dyn PhysicsBackend {
        self.physics.as_ref()
    }

    pub fn physics_mut(&mut self) -> &mut dyn PhysicsBackend {
        self.physics.as_mut()
    }

    pub fn replicator(&self) -> &Replicator {
        &self.replicator
    }

    pub fn round(&self) -> Option<&RoundMachine> {
        match &self.mode {
            GameMode::Survival(round) => Some(round),
            GameMode::Soccer(_) => None,
        }
    }

    pub fn phase(&self) -> Option<RoundPhase> {
        self.round().map(RoundMachine::phase)
    }

    pub fn soccer(&self) -> Option<&SoccerMatch> {
        match &self.mode {
            GameMode::Soccer(soccer) => Some(soccer),
            GameMode::Survival(_) => None,
        }
    }

    pub fn static_bodies(&self) -> &[BodyHandle] {
        &self.static_bodies
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn set_camera(&mut self, camera: CameraBasis) {
        self.camera = camera;
    }

    /// Goals are decided by the authoritative peer, or locally when offline
    fn owns_shared_state(&self) -> bool {
        self.replicator.is_authority() || !self.transport.is_open()
    }

    /// Advance one frame.
    ///
    /// Order: rules (death check and hazard rise, or goal detection),
    /// movement and jump, upright stabilization, snapshot send, physics step.
    /// Due timers and inbound network events run after the frame.
    pub fn frame(&mut self, dt: Duration, input: &ControlInput) -> Vec<ReplicationEvent> {
        if self.torn_down {
            return Vec::new();
        }
        let before = self.clock.now_ms();
        let dt_secs = self.clock.advance(dt);
        let now_ms = self.clock.now_ms();
        let dt_ms = now_ms - before;

        let owns_shared_state = self.owns_shared_state();
        match &mut self.mode {
            GameMode::Survival(round) => {
                let mut ctx = RoundContext {
                    physics: self.physics.as_mut(),
                    player: &mut self.player,
                    scheduler: &mut self.scheduler,
                    hud: self.hud.as_mut(),
                    audio: self.audio.as_mut(),
                    now_ms,
                };
                round.update_frame(dt_secs, dt_ms, &mut ctx);
            }
            GameMode::Soccer(soccer) => {
                if owns_shared_state && soccer.check_goal(self.physics.as_mut()).is_some() {
                    self.hud.update(MSG_SCORE, soccer.scoreboard().into());
                    if self.transport.is_open() {
                        let msg = WireMsg::Score {
                            score: soccer.score(),
                        };
                        if let Err(e) = self.transport.send(&msg) {
                            warn!(error = %e, "Failed to broadcast score");
                        }
                    }
                }
            }
        }

        PlayerController::update(
            &mut self.player,
            input,
            &self.camera,
            self.physics.as_mut(),
            &self.controller,
        );

        UprightStabilizer::stabilize(&self.player, self.physics.as_mut());

        if let Err(e) = self.replicator.maybe_send(
            now_ms,
            self.player.body,
            self.physics.as_ref(),
            self.transport.as_mut(),
        ) {
            warn!(error = %e, "Snapshot send failed");
        }

        self.physics.step(dt_secs);

        self.run_due_tasks(now_ms);
        self.drain_transport(now_ms)
    }

    fn run_due_tasks(&mut self, now_ms: u64) {
        while let Some(task) = self.scheduler.pop_due(now_ms) {
            match &mut self.mode {
                GameMode::Survival(round) => {
                    let mut ctx = RoundContext {
                        physics: self.physics.as_mut(),
                        player: &mut self.player,
                        scheduler: &mut self.scheduler,
                        hud: self.hud.as_mut(),
                        audio: self.audio.as_mut(),
                        now_ms,
                    };
                    round.on_task(task, &mut ctx);
                }
                GameMode::Soccer(_) => {
                    debug!(task = ?task.kind, "No handler for task in soccer");
                }
            }
        }
    }

    fn drain_transport(&mut self, now_ms: u64) -> Vec<ReplicationEvent> {
        let mut out = Vec::new();
        for event in self.transport.poll() {
            let Some(event) = self
                .replicator
                .handle_event(event, self.physics.as_mut(), now_ms)
            else {
                continue;
            };

            match &event {
                ReplicationEvent::Connected { authority: true, .. } => self.announce_start(),
                ReplicationEvent::Score(score) => {
                    if let GameMode::Soccer(soccer) = &mut self.mode {
                        if !self.replicator.is_authority() {
                            soccer.apply_remote_score(*score);
                            self.hud.update(MSG_SCORE, soccer.scoreboard().into());
                        }
                    }
                }
                _ => {}
            }
            out.push(event);
        }
        out
    }

    /// The host tells the room which game it is running
    fn announce_start(&mut self) {
        let msg = WireMsg::StartGame {
            game_id: self.kind.as_str().to_string(),
        };
        if let Err(e) = self.transport.send(&msg) {
            warn!(error = %e, "Failed to announce game start");
        }
    }

    /// Cancel every pending task, destroy every created body and disconnect.
    /// Safe to call more than once.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        if let GameMode::Survival(round) = &mut self.mode {
            round.stop(&mut self.scheduler);
        }
        self.scheduler.clear();

        let mut bodies: Vec<BodyHandle> = self.static_bodies.drain(..).collect();
        if let GameMode::Soccer(soccer) = &self.mode {
            bodies.extend(soccer.bodies());
        }
        bodies.extend(self.player.body.take());
        for body in &bodies {
            self.physics.destroy_body(*body);
        }

        self.replicator.clear();
        self.transport.close();
        self.torn_down = true;
        info!(kind = %self.kind, bodies = bodies.len(), "Session torn down");
    }
}

//! Menu shell: picks a game, launches it and falls back to the menu on
//! failure

use std::future::Future;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::game::physics::{PhysicsBackend, PhysicsError};
use crate::game::player::ControlInput;
use crate::game::session::{launch, GameKind, GameSession, LaunchedGame, SessionContext};
use crate::net::ReplicationEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Menu,
    Loading(GameKind),
    Playing(GameKind),
}

pub struct MenuShell {
    screen: Screen,
    session: Option<GameSession>,
    /// Game the room host asked everyone to switch to
    requested_game: Option<GameKind>,
    last_error: Option<String>,
}

impl MenuShell {
    pub fn new() -> Self {
        Self {
            screen: Screen::Menu,
            session: None,
            requested_game: None,
            last_error: None,
        }
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn session(&self) -> Option<&GameSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut GameSession> {
        self.session.as_mut()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn take_requested_game(&mut self) -> Option<GameKind> {
        self.requested_game.take()
    }

    /// Launch a game. Any failure is logged and leaves the shell on the menu.
    pub async fn launch_game<F>(&mut self, kind: GameKind, ctx: SessionContext, backend: F) -> bool
    where
        F: Future<Output = Result<Box<dyn PhysicsBackend>, PhysicsError>>,
    {
        self.leave_game();
        self.screen = Screen::Loading(kind);

        match launch(kind, ctx, backend).await.and_then(LaunchedGame::validate) {
            Ok(session) => {
                self.session = Some(session);
                self.screen = Screen::Playing(kind);
                self.last_error = None;
                true
            }
            Err(e) => {
                error!(kind = %kind, error = %e, "Game launch failed, back to menu");
                self.last_error = Some(e.to_string());
                self.screen = Screen::Menu;
                false
            }
        }
    }

    pub fn leave_game(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.teardown();
            info!(kind = %session.kind(), "Left game");
        }
        self.screen = Screen::Menu;
    }

    /// Run one frame of the active game, if any
    pub fn frame(&mut self, dt: Duration, input: &ControlInput) -> Vec<ReplicationEvent> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        let events = session.frame(dt, input);

        for event in &events {
            if let ReplicationEvent::StartGame(game_id) = event {
                match game_id.parse::<GameKind>() {
                    Ok(kind) if kind != session.kind() => {
                        info!(game = %kind, "Host started another game");
                        self.requested_game = Some(kind);
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Ignoring start_game"),
                }
            }
        }
        events
    }
}

impl Default for MenuShell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use glam::Vec3;

    use super::*;
    use crate::game::physics::SimplePhysics;
    use crate::net::ChannelTransport;
    use crate::relay::RoomRegistry;

    async fn ready() -> Result<Box<dyn PhysicsBackend>, PhysicsError> {
        Ok(Box::new(SimplePhysics::default()))
    }

    async fn not_ready() -> Result<Box<dyn PhysicsBackend>, PhysicsError> {
        Ok(Box::new(SimplePhysics::uninitialized(Vec3::new(0.0, -9.81, 0.0))))
    }

    async fn failing() -> Result<Box<dyn PhysicsBackend>, PhysicsError> {
        Err(PhysicsError::Init("wasm module missing".to_string()))
    }

    #[test]
    fn failed_launch_returns_to_menu() {
        let mut shell = MenuShell::new();

        let ok = tokio_test::block_on(shell.launch_game(GameKind::Survival, SessionContext::offline(), not_ready()));
        assert!(!ok);
        assert_eq!(shell.screen(), Screen::Menu);
        assert!(shell.session().is_none());
        assert!(shell.last_error().unwrap().contains("not ready"));

        let ok = tokio_test::block_on(shell.launch_game(GameKind::Soccer, SessionContext::offline(), failing()));
        assert!(!ok);
        assert_eq!(shell.screen(), Screen::Menu);

        // Frames on the menu are harmless
        assert!(shell.frame(Duration::from_millis(16), &ControlInput::default()).is_empty());
    }

    #[test]
    fn launch_play_leave() {
        let mut shell = MenuShell::new();
        assert!(tokio_test::block_on(shell.launch_game(
            GameKind::Survival,
            SessionContext::offline(),
            ready()
        )));
        assert_eq!(shell.screen(), Screen::Playing(GameKind::Survival));
        assert!(shell.last_error().is_none());

        shell.frame(Duration::from_millis(16), &ControlInput::default());
        assert_eq!(shell.session().unwrap().now_ms(), 16);

        // Relaunching replaces the running game
        assert!(tokio_test::block_on(shell.launch_game(
            GameKind::Soccer,
            SessionContext::offline(),
            ready()
        )));
        assert_eq!(shell.screen(), Screen::Playing(GameKind::Soccer));
        assert_eq!(shell.session().unwrap().now_ms(), 0);

        shell.leave_game();
        assert_eq!(shell.screen(), Screen::Menu);
        assert!(shell.session().is_none());
    }

    #[test]
    fn host_start_game_is_surfaced() {
        let registry = Arc::new(RoomRegistry::new());
        let mut host = MenuShell::new();
        let mut guest = MenuShell::new();

        let host_ctx = SessionContext {
            transport: Box::new(ChannelTransport::connect(registry.clone(), "room").unwrap()),
            ..SessionContext::offline()
        };
        let guest_ctx = SessionContext {
            transport: Box::new(ChannelTransport::connect(registry.clone(), "room").unwrap()),
            ..SessionContext::offline()
        };
        tokio_test::block_on(host.launch_game(GameKind::Soccer, host_ctx, ready()));
        tokio_test::block_on(guest.launch_game(GameKind::Survival, guest_ctx, ready()));

        host.frame(Duration::from_millis(16), &ControlInput::default());
        guest.frame(Duration::from_millis(16), &ControlInput::default());

        assert_eq!(guest.take_requested_game(), Some(GameKind::Soccer));
        assert_eq!(guest.take_requested_game(), None);
        assert_eq!(host.take_requested_game(), None);
    }
}

//! Game simulation modules

pub mod avatar;
pub mod hud;
pub mod map;
pub mod physics;
pub mod player;
pub mod round;
pub mod scheduler;
pub mod session;
pub mod soccer;
pub mod stabilizer;

pub use session::{launch, GameKind, GameSession, LaunchError, LaunchedGame, SessionContext};

//! Process-level wiring: shared server state and the game menu shell

pub mod shell;
pub mod state;

pub use shell::{MenuShell, Screen};
pub use state::AppState;

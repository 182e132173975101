//! HUD and audio collaborators
//!
//! The shell renders whatever the game reports here; updates are
//! fire-and-forget.

use std::fmt;

use tracing::{debug, info};

/// Secondary HUD line: a countdown number or free text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HudValue {
    Number(i64),
    Text(String),
}

impl fmt::Display for HudValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HudValue::Number(n) => write!(f, "{}", n),
            HudValue::Text(t) => f.write_str(t),
        }
    }
}

impl From<&str> for HudValue {
    fn from(text: &str) -> Self {
        HudValue::Text(text.to_string())
    }
}

impl From<String> for HudValue {
    fn from(text: String) -> Self {
        HudValue::Text(text)
    }
}

impl From<u32> for HudValue {
    fn from(n: u32) -> Self {
        HudValue::Number(n as i64)
    }
}

pub trait HudSink: Send {
    fn update(&mut self, message: &str, secondary: HudValue);
}

pub trait AudioCues: Send {
    /// Played once when the local player is eliminated
    fn player_fall(&mut self);
}

/// HUD that writes every update to the log
#[derive(Debug, Default)]
pub struct TracingHud;

impl HudSink for TracingHud {
    fn update(&mut self, message: &str, secondary: HudValue) {
        info!(hud = %message, detail = %secondary, "HUD update");
    }
}

/// Audio sink for headless sessions
#[derive(Debug, Default)]
pub struct TracingAudio;

impl AudioCues for TracingAudio {
    fn player_fall(&mut self) {
        debug!(cue = "player_fall", "Audio cue");
    }
}

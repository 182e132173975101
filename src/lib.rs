//! Lava Survival Hub
//!
//! Headless game core for a round-based lava survival game and a soccer
//! mini-game, plus the room relay that peers replicate poses through.
//! The binary in `main.rs` serves the relay and can drive a local session.

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod net;
pub mod relay;
pub mod util;
pub mod ws;

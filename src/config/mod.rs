//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::game::player::ControllerConfig;
use crate::game::round::{RespawnPolicy, RoundConfig};
use crate::net::replication::ReplicationConfig;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Relay server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS (comma separated, `*` for any)
    pub client_origin: String,

    /// Local session frame rate
    pub frame_rate: u32,
    /// Outbound replication interval
    pub snapshot_interval_ms: u64,

    pub intermission_secs: u32,
    pub hazard_duration_ms: u64,
    pub round_end_delay_ms: u64,
    pub lava_start_y: f32,
    pub lava_rise_per_sec: f32,
    pub respawn_policy: RespawnPolicy,

    pub player_speed: f32,
    pub jump_impulse: f32,

    /// Key-value file holding the saved avatar texture
    pub avatar_store_path: PathBuf,
    /// Tower layout seed (random when unset)
    pub map_seed: Option<u64>,

    /// Run a headless local session next to the relay
    pub local_session: bool,
    /// Relay room joined by the local session
    pub local_session_room: String,
}

impl Default for Config {
    fn default() -> Self {
        let round = RoundConfig::default();
        let controller = ControllerConfig::default();
        let replication = ReplicationConfig::default();

        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            client_origin: "*".to_string(),
            frame_rate: 60,
            snapshot_interval_ms: replication.send_interval.as_millis() as u64,
            intermission_secs: round.intermission_secs,
            hazard_duration_ms: round.hazard_duration_ms,
            round_end_delay_ms: round.round_end_delay_ms,
            lava_start_y: round.hazard_start_y,
            lava_rise_per_sec: round.hazard_rise_per_sec,
            respawn_policy: round.respawn_policy,
            player_speed: controller.player_speed,
            jump_impulse: controller.jump_impulse,
            avatar_store_path: PathBuf::from("avatar_store.json"),
            map_seed: None,
            local_session: false,
            local_session_room: "lobby".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        // Render provides PORT env var, fall back to SERVER_ADDR or default
        let server_addr = match (env::var("PORT"), env::var("SERVER_ADDR")) {
            (Ok(port), _) => format!("0.0.0.0:{}", port.trim())
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            (Err(_), Ok(addr)) => addr.trim().parse().map_err(|_| ConfigError::InvalidAddress)?,
            (Err(_), Err(_)) => defaults.server_addr,
        };

        let config = Self {
            server_addr,

            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or(defaults.client_origin),

            frame_rate: parse_or("FRAME_RATE", defaults.frame_rate)?,
            snapshot_interval_ms: parse_or("SNAPSHOT_INTERVAL_MS", defaults.snapshot_interval_ms)?,

            intermission_secs: parse_or("INTERMISSION_SECS", defaults.intermission_secs)?,
            hazard_duration_ms: parse_or("HAZARD_DURATION_MS", defaults.hazard_duration_ms)?,
            round_end_delay_ms: parse_or("ROUND_END_DELAY_MS", defaults.round_end_delay_ms)?,
            lava_start_y: parse_or("LAVA_START_Y", defaults.lava_start_y)?,
            lava_rise_per_sec: parse_or("LAVA_RISE_PER_SEC", defaults.lava_rise_per_sec)?,
            respawn_policy: parse_or("RESPAWN_POLICY", defaults.respawn_policy)?,

            player_speed: parse_or("PLAYER_SPEED", defaults.player_speed)?,
            jump_impulse: parse_or("JUMP_IMPULSE", defaults.jump_impulse)?,

            avatar_store_path: env::var("AVATAR_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.avatar_store_path),
            map_seed: match env::var("MAP_SEED") {
                Ok(raw) => Some(raw.trim().parse().map_err(|_| ConfigError::Invalid("MAP_SEED"))?),
                Err(_) => None,
            },

            local_session: parse_or("LOCAL_SESSION", defaults.local_session)?,
            local_session_room: env::var("LOCAL_SESSION_ROOM").unwrap_or(defaults.local_session_room),
        };

        if config.frame_rate == 0 {
            return Err(ConfigError::Invalid("FRAME_RATE"));
        }
        if config.lava_rise_per_sec < 0.0 {
            return Err(ConfigError::Invalid("LAVA_RISE_PER_SEC"));
        }
        Ok(config)
    }

    pub fn round_config(&self) -> RoundConfig {
        RoundConfig {
            intermission_secs: self.intermission_secs,
            hazard_duration_ms: self.hazard_duration_ms,
            round_end_delay_ms: self.round_end_delay_ms,
            hazard_start_y: self.lava_start_y,
            hazard_rise_per_sec: self.lava_rise_per_sec,
            respawn_policy: self.respawn_policy,
            ..RoundConfig::default()
        }
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            player_speed: self.player_speed,
            jump_impulse: self.jump_impulse,
            ..ControllerConfig::default()
        }
    }

    pub fn replication_config(&self) -> ReplicationConfig {
        ReplicationConfig {
            send_interval: Duration::from_millis(self.snapshot_interval_ms),
            ..ReplicationConfig::default()
        }
    }
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

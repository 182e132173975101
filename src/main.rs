//! Lava Survival Hub
//!
//! Entry point for the relay server. It handles:
//! - WebSocket rooms that relay pose, ball and score messages between peers
//! - A health endpoint
//! - Optionally, a headless local game session joined to one of the rooms

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lava_survival_hub::app::{AppState, MenuShell};
use lava_survival_hub::config::Config;
use lava_survival_hub::game::avatar::AvatarStore;
use lava_survival_hub::game::hud::{TracingAudio, TracingHud};
use lava_survival_hub::game::physics::{PhysicsBackend, PhysicsError, SimplePhysics};
use lava_survival_hub::game::player::ControlInput;
use lava_survival_hub::game::{GameKind, SessionContext};
use lava_survival_hub::http::build_router;
use lava_survival_hub::net::ChannelTransport;
use lava_survival_hub::util::time::{frame_duration, init_server_time};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting Lava Survival Hub");
    info!("Server address: {}", config.server_addr);

    // Create application state
    let state = AppState::new(config.clone());

    if config.local_session {
        let state = state.clone();
        tokio::spawn(async move {
            run_local_session(state).await;
        });
    }

    // Build router
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws?room=<name>", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Headless survival session driven at the configured frame rate
async fn run_local_session(state: AppState) {
    let config = state.config.clone();
    let room = config.local_session_room.clone();

    let transport = match ChannelTransport::connect(state.rooms.clone(), &room) {
        Ok(transport) => transport,
        Err(e) => {
            warn!(room = %room, error = %e, "Local session could not join room");
            return;
        }
    };

    let ctx = SessionContext {
        hud: Box::new(TracingHud),
        audio: Box::new(TracingAudio),
        transport: Box::new(transport),
        appearance: AvatarStore::new(&config.avatar_store_path).load_appearance(),
        round: config.round_config(),
        controller: config.controller_config(),
        replication: config.replication_config(),
        map_seed: config.map_seed.unwrap_or_else(rand::random),
    };

    let mut shell = MenuShell::new();
    let backend = async {
        let physics: Box<dyn PhysicsBackend> = Box::new(SimplePhysics::default());
        Ok::<_, PhysicsError>(physics)
    };
    if !shell.launch_game(GameKind::Survival, ctx, backend).await {
        return;
    }
    info!(room = %room, frame_rate = config.frame_rate, "Local session running");

    let dt = frame_duration(config.frame_rate);
    let mut ticker = interval(dt);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let input = ControlInput::default();

    loop {
        ticker.tick().await;
        shell.frame(dt, &input);
        if let Some(kind) = shell.take_requested_game() {
            info!(game = %kind, "Room host switched games; local session stays on survival");
        }
    }
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}

//! WebSocket upgrade handler for the pose relay

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::relay::Membership;
use crate::util::rate_limit::PeerRateLimiter;
use crate::ws::protocol::{is_relayable, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub room: String,
    /// Stable id for reconnecting peers; a fresh one is assigned otherwise
    pub peer: Option<Uuid>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    info!(room = %query.room, "WebSocket upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, query, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, query: WsQuery, state: AppState) {
    let (mut ws_sink, ws_stream) = socket.split();

    let membership = match state.rooms.join(&query.room, query.peer) {
        Ok(membership) => membership,
        Err(e) => {
            warn!(room = %query.room, error = %e, "Join rejected");
            let _ = send_msg(
                &mut ws_sink,
                &ServerMsg::Error {
                    code: "join_rejected".to_string(),
                    message: e.to_string(),
                },
            )
            .await;
            return;
        }
    };
    let peer_id = membership.peer_id;

    if let Err(e) = send_msg(&mut ws_sink, &membership.welcome()).await {
        error!(peer_id = %peer_id, error = %e, "Failed to send welcome");
        state.rooms.leave(&query.room, peer_id);
        return;
    }

    run_session(&state, &query.room, membership, ws_sink, ws_stream).await;

    // Cleanup on disconnect
    state.rooms.leave(&query.room, peer_id);
    info!(peer_id = %peer_id, room = %query.room, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    state: &AppState,
    room: &str,
    membership: Membership,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
) {
    let peer_id = membership.peer_id;
    let rate_limiter = PeerRateLimiter::new();

    // Spawn writer task: room broadcast -> WebSocket
    let writer_handle = tokio::spawn(async move {
        let mut membership = membership;
        loop {
            match membership.rx.recv().await {
                Ok(msg) => {
                    if !membership.accepts(&msg) {
                        continue;
                    }
                    if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                        debug!(peer_id = %peer_id, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        peer_id = %peer_id,
                        lagged_count = n,
                        "Peer lagged, skipping {} frames", n
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(peer_id = %peer_id, "Room channel closed");
                    break;
                }
            }
        }
    });

    // Reader loop: WebSocket -> room
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_relay() {
                    warn!(peer_id = %peer_id, "Rate limited relay message");
                    continue;
                }

                let payload = match serde_json::from_str::<serde_json::Value>(&text) {
                    Ok(value) if is_relayable(&value) => value,
                    Ok(_) => {
                        debug!(peer_id = %peer_id, "Dropping message without a string type");
                        continue;
                    }
                    Err(e) => {
                        debug!(peer_id = %peer_id, error = %e, "Dropping malformed message");
                        continue;
                    }
                };

                if let Err(e) = state.rooms.publish(room, peer_id, payload) {
                    warn!(peer_id = %peer_id, error = %e, "Relay publish failed");
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(peer_id = %peer_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(peer_id = %peer_id, "Peer initiated close");
                break;
            }
            Err(e) => {
                error!(peer_id = %peer_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}

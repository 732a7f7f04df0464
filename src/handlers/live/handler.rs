//! Live WebSocket handler
//!
//! Accepts a client connection, reads the initial configuration message,
//! opens the upstream session and hands both over to a [`LiveRelay`].

use axum::{
    extract::{
        ConnectInfo, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::AppResult;
use crate::state::AppState;

use super::messages::{CloseReason, LiveMessageRoute};
use super::relay::LiveRelay;

/// Channel buffer between the pumps and the socket writer
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Close code sent when the upstream session cannot be established
pub const CLOSE_UPSTREAM_FAILED: u16 = 1011;

/// How long the writer gets to flush the close frame
const WRITER_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Live WebSocket handler
///
/// Upgrades the HTTP connection to a WebSocket relayed to the upstream
/// conversational session.
///
/// A session slot is reserved for the caller's address before upgrading and
/// held for the lifetime of the socket. Without a free slot the upgrade is
/// refused with 503 (gateway full) or 429 (address over its limit).
///
/// # Arguments
/// * `ws` - The WebSocket upgrade request from Axum
/// * `state` - Application state
/// * `addr` - Peer address, used for the per-address session limit
pub async fn live_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> AppResult<Response> {
    let ip = addr.ip();
    let slot = state.try_acquire_connection(ip).inspect_err(|e| {
        warn!(ip = %ip, active = state.ws_connection_count(), "Refusing live session: {}", e);
    })?;
    info!(ip = %ip, "Live WebSocket connection upgrade requested");

    Ok(ws
        .max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| async move {
            handle_live_socket(socket, state).await;
            drop(slot);
        }))
}

/// Drive one live connection to completion.
async fn handle_live_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let session_id = Uuid::new_v4().to_string();
    info!(session_id = %session_id, "Live WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();
    let (message_tx, mut message_rx) = mpsc::channel::<LiveMessageRoute>(CHANNEL_BUFFER_SIZE);

    // Sender task for outgoing messages
    let mut sender_task = tokio::spawn(async move {
        while let Some(route) = message_rx.recv().await {
            let should_close = matches!(route, LiveMessageRoute::Close(_));

            let result = match route {
                LiveMessageRoute::Outgoing(message) => match serde_json::to_string(&message) {
                    Ok(json_str) => sender.send(Message::Text(json_str.into())).await,
                    Err(e) => {
                        error!("Failed to serialize outgoing message: {}", e);
                        continue;
                    }
                },
                LiveMessageRoute::Close(reason) => {
                    debug!("Closing live WebSocket connection");
                    let frame = reason.map(|r| CloseFrame {
                        code: r.code,
                        reason: r.reason.into(),
                    });
                    sender.send(Message::Close(frame)).await
                }
            };

            if let Err(e) = result {
                warn!("Failed to send WebSocket message: {}", e);
                break;
            }

            if should_close {
                break;
            }
        }
    });

    // The first message carries client configuration that is not used yet
    match receiver.next().await {
        Some(Ok(Message::Close(_))) | None => {
            info!(session_id = %session_id, "Client left before the session started");
            sender_task.abort();
            return;
        }
        Some(Err(e)) => {
            warn!(session_id = %session_id, "Client WebSocket error during handshake: {}", e);
            sender_task.abort();
            return;
        }
        Some(Ok(_)) => debug!(session_id = %session_id, "Discarded initial client message"),
    }

    let setup = app_state
        .config
        .session_setup(app_state.resumption.current());
    let resuming = setup.resumption_handle.is_some();

    let upstream = match app_state.connector.connect(setup).await {
        Ok(upstream) => upstream,
        Err(e) => {
            error!(session_id = %session_id, "Failed to establish upstream session: {}", e);
            let _ = message_tx
                .send(LiveMessageRoute::Close(Some(CloseReason {
                    code: CLOSE_UPSTREAM_FAILED,
                    reason: "Upstream session unavailable".to_string(),
                })))
                .await;
            finish_writer(&mut sender_task).await;
            return;
        }
    };
    info!(session_id = %session_id, resuming, "Upstream session established");

    let mut relay = LiveRelay::new(
        session_id.clone(),
        app_state.tools.clone(),
        app_state.resumption.clone(),
    );
    relay.run(receiver, message_tx.clone(), upstream).await;

    // Cleanup
    let _ = message_tx.send(LiveMessageRoute::Close(None)).await;
    finish_writer(&mut sender_task).await;

    info!(session_id = %session_id, state = %relay.state(), "Live WebSocket connection terminated");
}

/// Give the writer a moment to flush its close frame, then stop it.
async fn finish_writer(task: &mut tokio::task::JoinHandle<()>) {
    if timeout(WRITER_SHUTDOWN_GRACE, &mut *task).await.is_err() {
        task.abort();
    }
}

//! WebSocket stream handlers.
//!
//! The token travels as a query parameter because browser WebSocket
//! clients cannot set an Authorization header. Resolution happens
//! before the upgrade completes; a bad token never registers a client
//! with the hub.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::app::AppState;
use crate::error::ApiError;
use crate::fanout::ClientHandle;
use shared::jwt::ClientIdentity;

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: String,
}

/// Commands an alert-stream client may send.
#[derive(Debug, Deserialize)]
struct ClientCommand {
    action: String,
}

/// Periodic batched device status stream.
///
/// GET /ws/monitor?token=
pub async fn monitor_stream(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsAuthQuery>,
) -> Result<Response, ApiError> {
    let identity = state.identity.resolve(&query.token)?;
    Ok(ws.on_upgrade(move |socket| serve_monitor(socket, state, identity)))
}

/// Alert stream with acknowledgment support.
///
/// GET /ws/alerts?token=
pub async fn alert_stream(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsAuthQuery>,
) -> Result<Response, ApiError> {
    let identity = state.identity.resolve(&query.token)?;
    Ok(ws.on_upgrade(move |socket| serve_alerts(socket, state, identity)))
}

async fn serve_monitor(mut socket: WebSocket, state: AppState, identity: ClientIdentity) {
    let mut handle = state.hub.register_monitor(&identity).await;

    loop {
        tokio::select! {
            outbound = handle.rx.recv() => {
                match outbound {
                    Some(text) => {
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = socket.recv() => {
                if !handle_inbound(&mut socket, inbound, None).await {
                    break;
                }
            }
        }
    }

    state.hub.disconnect_monitor(handle.conn_id).await;
    debug!(client_id = %identity.client_id, "monitor stream closed");
}

async fn serve_alerts(mut socket: WebSocket, state: AppState, identity: ClientIdentity) {
    let mut handle = state.hub.register_alerts(&identity).await;

    loop {
        tokio::select! {
            outbound = handle.rx.recv() => {
                match outbound {
                    Some(text) => {
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = socket.recv() => {
                if !handle_inbound(&mut socket, inbound, Some((&state, &handle))).await {
                    break;
                }
            }
        }
    }

    state.hub.disconnect_alerts(handle.conn_id).await;
    debug!(client_id = %identity.client_id, "alert stream closed");
}

/// Process one inbound frame. Returns false when the connection should
/// close. `commands` is set only for the alert stream, which accepts
/// `{"action":"ack"}`.
async fn handle_inbound(
    socket: &mut WebSocket,
    inbound: Option<Result<Message, axum::Error>>,
    commands: Option<(&AppState, &ClientHandle)>,
) -> bool {
    let message = match inbound {
        Some(Ok(message)) => message,
        Some(Err(_)) | None => return false,
    };

    match message {
        Message::Text(text) => {
            let Some((state, handle)) = commands else {
                return true;
            };
            match serde_json::from_str::<ClientCommand>(&text) {
                Ok(cmd) if cmd.action == "ack" => {
                    state.hub.acknowledge(handle.conn_id).await;
                }
                Ok(cmd) => {
                    warn!(action = %cmd.action, "unknown websocket command");
                    let _ = socket
                        .send(Message::Text("{\"error\":\"unknown action\"}".into()))
                        .await;
                }
                Err(err) => {
                    debug!(error = %err, "invalid websocket command payload");
                    let _ = socket
                        .send(Message::Text("{\"error\":\"invalid command\"}".into()))
                        .await;
                }
            }
            true
        }
        Message::Ping(payload) => socket.send(Message::Pong(payload)).await.is_ok(),
        Message::Pong(_) | Message::Binary(_) => true,
        Message::Close(_) => false,
    }
}

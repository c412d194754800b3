use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::crossword::events::CALENDAR_ROOM;
use crate::crossword::room::HUMAN_PALETTE;
use crate::shared::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub device_id: Option<String>,
    pub name: Option<String>,
}

/// WebSocket upgrade endpoint. Identity is a self-asserted device id;
/// a user record is created on first sight.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(app_state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_websocket_connection(socket, params, app_state))
}

async fn handle_websocket_connection(socket: WebSocket, params: WsQuery, app_state: AppState) {
    let socket_id = Uuid::new_v4().to_string();
    info!(socket_id = %socket_id, "WebSocket connection established");

    if let Some(device_id) = params.device_id.as_deref() {
        ensure_user(&app_state, device_id, params.name.as_deref()).await;
    }

    // Outbound channel: engines write here, the write pump drains it.
    let (outbound_sender, mut outbound_receiver) = mpsc::unbounded_channel::<String>();
    app_state
        .transport
        .register(&socket_id, outbound_sender)
        .await;
    // Everyone hears cross-date progress summaries.
    app_state.transport.join(CALENDAR_ROOM, &socket_id).await;

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let write_pump = tokio::spawn(async move {
        while let Some(message) = outbound_receiver.recv().await {
            if ws_sender.send(Message::Text(message)).await.is_err() {
                break;
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                app_state.router.handle_message(&socket_id, &text).await;
            }
            Ok(Message::Close(_)) => {
                debug!(socket_id = %socket_id, "Client closed connection");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(socket_id = %socket_id, error = %e, "WebSocket read error");
                break;
            }
        }
    }

    app_state.router.handle_disconnect(&socket_id).await;
    app_state.transport.unregister(&socket_id).await;
    write_pump.abort();
    info!(socket_id = %socket_id, "WebSocket cleanup completed");
}

async fn ensure_user(app_state: &AppState, device_id: &str, name: Option<&str>) {
    match app_state.store.get_user(device_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            let name = name
                .map(|n| n.trim().chars().take(20).collect::<String>())
                .filter(|n| !n.is_empty())
                .or_else(|| petname::petname(2, " "))
                .unwrap_or_else(|| "Guest".to_string());
            if let Err(e) = app_state
                .store
                .create_user("unknown", &name, HUMAN_PALETTE[0], device_id)
                .await
            {
                warn!(device_id = %device_id, error = %e, "Failed to create user record");
            }
        }
        Err(e) => {
            warn!(device_id = %device_id, error = %e, "Failed to look up user record");
        }
    }
}

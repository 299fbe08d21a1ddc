//! WebSocket handler for Axum
//!
//! Handles WebSocket upgrades, identifies the participant and pumps events
//! between the socket and the hub.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use chatdesk_shared::{ClientEvent, Participant, ServerEvent};
use futures::{stream::StreamExt, SinkExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

use super::{connection::Connection, dispatch::handle_client_event};

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    /// Bearer token for admins and signed-in customers
    token: Option<String>,
    /// Display name for anonymous customers
    name: Option<String>,
    /// Browsing context id for anonymous customers
    visitor_id: Option<String>,
}

/// Upgrades the HTTP connection. A token that fails validation is rejected
/// outright; only a missing token means an anonymous customer.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
    Query(params): Query<WebSocketQuery>,
) -> Result<Response, ApiError> {
    let participant = match params.token.as_deref() {
        Some(token) => {
            let claims = app_state.jwt.validate_token(token).map_err(|e| {
                tracing::warn!(error = %e, "WebSocket auth failed: invalid token");
                ApiError::from(e)
            })?;
            claims.participant()
        }
        None => {
            let visitor = params
                .visitor_id
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            let name = params
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "Guest".to_string());
            Participant::customer(format!("visitor:{visitor}"), name)
        }
    };

    tracing::info!(
        participant_id = %participant.id,
        role = ?participant.role,
        "WebSocket connection upgrade requested"
    );

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, participant, app_state)))
}

async fn handle_socket(socket: WebSocket, participant: Participant, app_state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let role = participant.role;
    let ws_state = app_state.ws_state.clone();
    let conn = ws_state.add_connection(Connection::new(participant, tx)).await;
    let connection_id = conn.connection_id;

    let _ = conn.send(ServerEvent::Connected {
        connection_id,
        role,
    });

    // Writer task drains the connection's outbox
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to serialize WebSocket event");
                }
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        let Ok(msg) = msg else {
            break;
        };
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => {
                    handle_client_event(event, &conn, &ws_state, app_state.chat.as_ref()).await;
                }
                Err(e) => {
                    tracing::warn!(
                        connection_id = %connection_id,
                        error = ?e,
                        "Failed to parse client event"
                    );
                    let _ = conn.send(ServerEvent::Error {
                        code: "BAD_REQUEST".to_string(),
                        message: "Invalid event format".to_string(),
                    });
                }
            },
            Message::Close(_) => {
                tracing::info!(connection_id = %connection_id, "WebSocket close frame received");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                // Axum handles ping/pong automatically
            }
            Message::Binary(_) => {}
        }
    }

    tracing::info!(connection_id = %connection_id, "WebSocket connection closing");
    ws_state.remove_connection(&connection_id).await;
    send_task.abort();
}

//! Admin fan-out notifier
//!
//! Publishes session and message changes to the realtime channel after the
//! Session Store write has succeeded. Read-side convenience only; a dropped
//! event is repaired by the dashboard's polling refresh.

use chatdesk_shared::{ChatSession, Message, RoomId, ServerEvent};

use crate::websocket::WebSocketState;

#[derive(Clone)]
pub struct AdminNotifier {
    ws_state: WebSocketState,
}

impl AdminNotifier {
    pub fn new(ws_state: WebSocketState) -> Self {
        Self { ws_state }
    }

    /// A brand-new session is waiting for an admin
    pub async fn session_created(&self, session: &ChatSession) {
        let recipients = self
            .ws_state
            .rooms
            .broadcast(
                &RoomId::Dashboard,
                ServerEvent::SessionCreated {
                    session: session.clone(),
                },
            )
            .await;

        tracing::debug!(
            chat_id = %session.chat_id,
            recipients,
            "Announced new chat session"
        );
    }

    /// Row-level change: conversation room and dashboard both get it
    pub async fn session_updated(&self, session: &ChatSession) {
        let event = ServerEvent::SessionUpdated {
            session: session.clone(),
        };
        self.ws_state
            .rooms
            .broadcast(&RoomId::chat(&session.chat_id), event.clone())
            .await;
        self.ws_state.rooms.broadcast(&RoomId::Dashboard, event).await;
    }

    /// Durable message, delivered to the whole conversation room
    pub async fn message(&self, message: &Message) {
        let recipients = self
            .ws_state
            .rooms
            .broadcast(
                &RoomId::chat(&message.chat_id),
                ServerEvent::Message {
                    chat_id: message.chat_id.clone(),
                    message: message.clone(),
                },
            )
            .await;

        tracing::debug!(
            chat_id = %message.chat_id,
            message_id = %message.id,
            recipients,
            "Delivered message to room"
        );
    }
}

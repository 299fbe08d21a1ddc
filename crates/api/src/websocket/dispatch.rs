//! Client event dispatch
//!
//! Shared by the socket handler and the in-process transport so both speak
//! exactly the same protocol.

use chatdesk_shared::{
    ChatError, ChatId, ClientEvent, ParticipantRole, RoomId, ServerEvent, SessionStore,
    TypingSignal,
};
use std::sync::Arc;

use super::connection::Connection;
use super::state::WebSocketState;

pub async fn handle_client_event(
    event: ClientEvent,
    conn: &Arc<Connection>,
    ws_state: &WebSocketState,
    store: &dyn SessionStore,
) {
    match event {
        ClientEvent::JoinRoom { room } => match authorize_join(conn, &room, store).await {
            Ok(()) => {
                ws_state.join(conn, room.clone()).await;
                let _ = conn.send(ServerEvent::Joined { room });
            }
            Err(e) => {
                tracing::warn!(
                    connection_id = %conn.connection_id,
                    room = %room,
                    error = %e,
                    "Rejected room join"
                );
                let _ = conn.send(ServerEvent::error(&e));
            }
        },

        ClientEvent::LeaveRoom { room } => {
            ws_state.leave(conn, &room).await;
        }

        ClientEvent::Typing {
            chat_id,
            sender_name,
        } => {
            let Some(room) = member_room(conn, &chat_id).await else {
                let _ = conn.send(ServerEvent::error(&not_joined(&chat_id)));
                return;
            };
            let signal = TypingSignal {
                chat_id,
                sender_type: conn.participant.sender_type(),
                sender_name,
            };
            ws_state
                .rooms
                .broadcast_except(&room, ServerEvent::Typing(signal), &conn.connection_id)
                .await;
        }

        ClientEvent::StopTyping { chat_id } => {
            let Some(room) = member_room(conn, &chat_id).await else {
                let _ = conn.send(ServerEvent::error(&not_joined(&chat_id)));
                return;
            };
            let event = ServerEvent::StopTyping {
                chat_id,
                sender_type: conn.participant.sender_type(),
            };
            ws_state
                .rooms
                .broadcast_except(&room, event, &conn.connection_id)
                .await;
        }

        ClientEvent::Ping => {
            let _ = conn.send(ServerEvent::Pong);
        }
    }
}

/// Customers may join the room of an existing session only; the dashboard
/// room is reserved for admins.
async fn authorize_join(
    conn: &Connection,
    room: &RoomId,
    store: &dyn SessionStore,
) -> Result<(), ChatError> {
    match room {
        RoomId::Dashboard => match conn.participant.role {
            ParticipantRole::Admin => Ok(()),
            ParticipantRole::Customer => Err(ChatError::Unauthorized(
                "the dashboard room is reserved for admins".into(),
            )),
        },
        RoomId::Chat(chat_id) => store.get_session(chat_id).await.map(|_| ()),
    }
}

async fn member_room(conn: &Connection, chat_id: &ChatId) -> Option<RoomId> {
    let room = RoomId::chat(chat_id);
    conn.is_member(&room).await.then_some(room)
}

fn not_joined(chat_id: &ChatId) -> ChatError {
    ChatError::Unauthorized(format!("join chat:{chat_id} before signalling typing"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chatdesk_shared::{CustomerIdentity, MemorySessionStore, Participant, StartSession};
    use tokio::sync::mpsc;

    async fn connect(
        state: &WebSocketState,
        participant: Participant,
    ) -> (Arc<Connection>, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = state.add_connection(Connection::new(participant, tx)).await;
        (conn, rx)
    }

    async fn new_chat(store: &MemorySessionStore) -> ChatId {
        store
            .create_or_get_session(&StartSession {
                identity: CustomerIdentity::Anonymous,
                visitor_id: "tab-1".into(),
            })
            .await
            .unwrap()
            .session
            .chat_id
    }

    #[tokio::test]
    async fn test_join_unknown_chat_is_rejected() {
        let state = WebSocketState::new();
        let store = MemorySessionStore::new();
        let (conn, mut rx) = connect(&state, Participant::customer("v", "Guest")).await;

        let room = RoomId::chat(&ChatId::from("chat_missing"));
        handle_client_event(ClientEvent::JoinRoom { room: room.clone() }, &conn, &state, &store)
            .await;

        match rx.try_recv().unwrap() {
            ServerEvent::Error { code, .. } => assert_eq!(code, "NOT_FOUND"),
            other => panic!("expected error, got {other:?}"),
        }
        assert_eq!(state.rooms.get_room_size(&room).await, 0);
    }

    #[tokio::test]
    async fn test_customer_cannot_join_dashboard() {
        let state = WebSocketState::new();
        let store = MemorySessionStore::new();
        let (conn, mut rx) = connect(&state, Participant::customer("v", "Guest")).await;

        handle_client_event(
            ClientEvent::JoinRoom {
                room: RoomId::Dashboard,
            },
            &conn,
            &state,
            &store,
        )
        .await;

        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerEvent::Error { ref code, .. } if code == "UNAUTHORIZED"
        ));
    }

    #[tokio::test]
    async fn test_typing_is_relayed_to_the_other_side_only() {
        let state = WebSocketState::new();
        let store = MemorySessionStore::new();
        let chat_id = new_chat(&store).await;
        let room = RoomId::chat(&chat_id);

        let (customer, mut customer_rx) = connect(&state, Participant::customer("v", "Guest")).await;
        let (admin, mut admin_rx) = connect(&state, Participant::admin("A1", "Alice")).await;

        for conn in [&customer, &admin] {
            handle_client_event(ClientEvent::JoinRoom { room: room.clone() }, conn, &state, &store)
                .await;
        }
        while customer_rx.try_recv().is_ok() {}
        while admin_rx.try_recv().is_ok() {}

        handle_client_event(
            ClientEvent::Typing {
                chat_id: chat_id.clone(),
                sender_name: "Guest".into(),
            },
            &customer,
            &state,
            &store,
        )
        .await;

        match admin_rx.try_recv().unwrap() {
            ServerEvent::Typing(signal) => {
                assert_eq!(signal.chat_id, chat_id);
                assert_eq!(signal.sender_type, chatdesk_shared::SenderType::User);
            }
            other => panic!("expected typing, got {other:?}"),
        }
        assert!(customer_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let state = WebSocketState::new();
        let store = MemorySessionStore::new();
        let (conn, mut rx) = connect(&state, Participant::admin("A1", "Alice")).await;

        handle_client_event(ClientEvent::Ping, &conn, &state, &store).await;
        assert_eq!(rx.try_recv().unwrap(), ServerEvent::Pong);
    }
}

//! WebSocket connection management
//!
//! Represents an active realtime connection with room membership tracking.

use chatdesk_shared::{Participant, RoomId, ServerEvent};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Represents an active realtime connection
#[derive(Debug)]
pub struct Connection {
    /// Unique id for this physical connection
    pub connection_id: Uuid,

    /// Who opened the connection
    pub participant: Participant,

    /// Outbox drained by the connection's writer task
    pub sender: mpsc::UnboundedSender<ServerEvent>,

    /// Rooms this connection has joined
    pub rooms: Arc<RwLock<HashSet<RoomId>>>,
}

impl Connection {
    pub fn new(participant: Participant, sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            participant,
            sender,
            rooms: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Send an event to this connection
    ///
    /// Returns Ok(()) if queued, Err if the connection is gone
    #[allow(clippy::result_large_err)] // Error type is from tokio mpsc, containing the failed event
    pub fn send(&self, event: ServerEvent) -> Result<(), mpsc::error::SendError<ServerEvent>> {
        self.sender.send(event)
    }

    /// Record room membership. Returns false if already a member.
    pub async fn track_join(&self, room: &RoomId) -> bool {
        let inserted = self.rooms.write().await.insert(room.clone());
        if inserted {
            tracing::debug!(
                connection_id = %self.connection_id,
                room = %room,
                "Joined room"
            );
        }
        inserted
    }

    pub async fn track_leave(&self, room: &RoomId) -> bool {
        let removed = self.rooms.write().await.remove(room);
        if removed {
            tracing::debug!(
                connection_id = %self.connection_id,
                room = %room,
                "Left room"
            );
        }
        removed
    }

    pub async fn is_member(&self, room: &RoomId) -> bool {
        self.rooms.read().await.contains(room)
    }

    pub async fn joined_rooms(&self) -> HashSet<RoomId> {
        self.rooms.read().await.clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chatdesk_shared::ChatId;

    #[tokio::test]
    async fn test_room_membership_is_idempotent() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = Connection::new(Participant::customer("v-1", "Guest"), tx);
        let room = RoomId::chat(&ChatId::from("chat_1"));

        assert!(!conn.is_member(&room).await);
        assert!(conn.track_join(&room).await);
        assert!(!conn.track_join(&room).await);
        assert!(conn.is_member(&room).await);

        assert!(conn.track_leave(&room).await);
        assert!(!conn.is_member(&room).await);
    }

    #[tokio::test]
    async fn test_multiple_rooms() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = Connection::new(Participant::admin("A1", "Alice"), tx);

        conn.track_join(&RoomId::Dashboard).await;
        conn.track_join(&RoomId::chat(&ChatId::from("chat_1"))).await;

        let rooms = conn.joined_rooms().await;
        assert_eq!(rooms.len(), 2);
        assert!(rooms.contains(&RoomId::Dashboard));
    }
}

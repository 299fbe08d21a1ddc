//! Room management for pub/sub
//!
//! Conversation rooms (`chat:<id>`) and the admin dashboard room share one
//! registry. Delivery is best-effort: a closed outbox is skipped and cleaned
//! up when its connection is removed.

use chatdesk_shared::{RoomId, ServerEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::connection::Connection;

/// Manages rooms for broadcasting events
pub struct RoomManager {
    /// Map of room -> member connections
    rooms: Arc<RwLock<HashMap<RoomId, Vec<Arc<Connection>>>>>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Add a connection to a room. Joining twice is a no-op.
    pub async fn join(&self, room: RoomId, conn: Arc<Connection>) {
        let mut rooms = self.rooms.write().await;
        let members = rooms.entry(room.clone()).or_default();
        if members.iter().any(|c| c.connection_id == conn.connection_id) {
            return;
        }
        members.push(Arc::clone(&conn));

        tracing::debug!(
            room = %room,
            connection_id = %conn.connection_id,
            room_size = members.len(),
            "Connection joined room"
        );
    }

    /// Remove a connection from a room
    pub async fn leave(&self, room: &RoomId, connection_id: &Uuid) {
        let mut rooms = self.rooms.write().await;
        if let Some(conns) = rooms.get_mut(room) {
            conns.retain(|c| c.connection_id != *connection_id);

            // Clean up empty rooms
            if conns.is_empty() {
                rooms.remove(room);
                tracing::debug!(room = %room, "Removed empty room");
            } else {
                tracing::debug!(
                    room = %room,
                    connection_id = %connection_id,
                    room_size = conns.len(),
                    "Connection left room"
                );
            }
        }
    }

    /// Broadcast an event to every connection in a room.
    /// Returns the number of connections the event was queued for.
    pub async fn broadcast(&self, room: &RoomId, event: ServerEvent) -> usize {
        self.deliver(room, event, None).await
    }

    /// Broadcast to a room, skipping the originating connection
    pub async fn broadcast_except(
        &self,
        room: &RoomId,
        event: ServerEvent,
        exclude: &Uuid,
    ) -> usize {
        self.deliver(room, event, Some(exclude)).await
    }

    async fn deliver(&self, room: &RoomId, event: ServerEvent, exclude: Option<&Uuid>) -> usize {
        let rooms = self.rooms.read().await;
        let Some(conns) = rooms.get(room) else {
            tracing::debug!(room = %room, event_type = event.kind(), "No subscribers for room");
            return 0;
        };

        let mut success_count = 0;
        let mut failed_count = 0;

        for conn in conns {
            if exclude == Some(&conn.connection_id) {
                continue;
            }
            match conn.send(event.clone()) {
                Ok(()) => success_count += 1,
                Err(_) => {
                    failed_count += 1;
                    tracing::warn!(
                        connection_id = %conn.connection_id,
                        "Failed to send event to connection (likely closed)"
                    );
                }
            }
        }

        tracing::debug!(
            room = %room,
            event_type = event.kind(),
            recipients = success_count,
            failed = failed_count,
            "Broadcast event to room"
        );
        success_count
    }

    /// Remove a connection from all rooms
    pub async fn remove_connection(&self, connection_id: &Uuid) {
        let mut rooms = self.rooms.write().await;
        let mut removed_from = 0usize;

        for conns in rooms.values_mut() {
            let before_len = conns.len();
            conns.retain(|c| c.connection_id != *connection_id);
            if conns.len() < before_len {
                removed_from += 1;
            }
        }

        // Clean up empty rooms
        rooms.retain(|_, conns| !conns.is_empty());

        if removed_from > 0 {
            tracing::debug!(
                connection_id = %connection_id,
                room_count = removed_from,
                "Removed connection from rooms"
            );
        }
    }

    pub async fn get_room_size(&self, room: &RoomId) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(room).map(|v| v.len()).unwrap_or(0)
    }

    /// Get total number of active rooms
    pub async fn get_room_count(&self) -> usize {
        let rooms = self.rooms.read().await;
        rooms.len()
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chatdesk_shared::{ChatId, Participant};
    use tokio::sync::mpsc;

    fn chat_room() -> RoomId {
        RoomId::chat(&ChatId::from("chat_room_test"))
    }

    #[tokio::test]
    async fn test_room_join_and_leave() {
        let room_manager = RoomManager::new();
        let room = chat_room();

        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = Arc::new(Connection::new(Participant::customer("v", "Guest"), tx));

        assert_eq!(room_manager.get_room_size(&room).await, 0);

        room_manager.join(room.clone(), Arc::clone(&conn)).await;
        room_manager.join(room.clone(), Arc::clone(&conn)).await;
        assert_eq!(room_manager.get_room_size(&room).await, 1);

        room_manager.leave(&room, &conn.connection_id).await;
        assert_eq!(room_manager.get_room_size(&room).await, 0);
        assert_eq!(room_manager.get_room_count().await, 0);
    }

    #[tokio::test]
    async fn test_broadcast_to_room() {
        let room_manager = RoomManager::new();
        let room = chat_room();

        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        let conn1 = Arc::new(Connection::new(Participant::customer("v", "Guest"), tx1));
        let conn2 = Arc::new(Connection::new(Participant::admin("A1", "Alice"), tx2));

        room_manager.join(room.clone(), conn1).await;
        room_manager.join(room.clone(), conn2).await;

        assert_eq!(room_manager.broadcast(&room, ServerEvent::Pong).await, 2);

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_broadcast_except_skips_sender() {
        let room_manager = RoomManager::new();
        let room = chat_room();

        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let conn1 = Arc::new(Connection::new(Participant::customer("v", "Guest"), tx1));
        let conn2 = Arc::new(Connection::new(Participant::admin("A1", "Alice"), tx2));

        room_manager.join(room.clone(), Arc::clone(&conn1)).await;
        room_manager.join(room.clone(), conn2).await;

        let delivered = room_manager
            .broadcast_except(&room, ServerEvent::Pong, &conn1.connection_id)
            .await;
        assert_eq!(delivered, 1);
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_remove_connection_from_all_rooms() {
        let room_manager = RoomManager::new();

        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = Arc::new(Connection::new(Participant::admin("A1", "Alice"), tx));

        room_manager.join(chat_room(), Arc::clone(&conn)).await;
        room_manager.join(RoomId::Dashboard, Arc::clone(&conn)).await;

        assert_eq!(room_manager.get_room_count().await, 2);

        room_manager.remove_connection(&conn.connection_id).await;

        assert_eq!(room_manager.get_room_count().await, 0);
    }
}

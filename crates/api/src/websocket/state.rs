//! Global WebSocket state management
//!
//! Maintains the connection registry and the room map shared by every
//! realtime connection, whether it arrives over a socket or in-process.

use chatdesk_shared::{ParticipantRole, RoomId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::connection::Connection;
use super::room::RoomManager;

/// Global WebSocket state shared across all connections
#[derive(Clone)]
pub struct WebSocketState {
    /// All active connections indexed by connection_id
    pub connections: Arc<RwLock<HashMap<Uuid, Arc<Connection>>>>,

    /// Room manager for conversation and dashboard rooms
    pub rooms: Arc<RoomManager>,
}

impl WebSocketState {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            rooms: Arc::new(RoomManager::new()),
        }
    }

    /// Register a connection. Admin connections join the dashboard room here.
    pub async fn add_connection(&self, conn: Connection) -> Arc<Connection> {
        let conn = Arc::new(conn);
        let total_connections = {
            let mut connections = self.connections.write().await;
            connections.insert(conn.connection_id, Arc::clone(&conn));
            connections.len()
        };

        if conn.participant.role == ParticipantRole::Admin {
            self.join(&conn, RoomId::Dashboard).await;
        }

        tracing::info!(
            connection_id = %conn.connection_id,
            participant_id = %conn.participant.id,
            role = ?conn.participant.role,
            total_connections,
            "Realtime connection added"
        );

        conn
    }

    /// Remove a connection and its room memberships
    pub async fn remove_connection(&self, connection_id: &Uuid) {
        let mut connections = self.connections.write().await;
        if let Some(conn) = connections.remove(connection_id) {
            self.rooms.remove_connection(connection_id).await;

            tracing::info!(
                connection_id = %connection_id,
                participant_id = %conn.participant.id,
                remaining_connections = connections.len(),
                "Realtime connection removed"
            );
        }
    }

    pub async fn join(&self, conn: &Arc<Connection>, room: RoomId) {
        conn.track_join(&room).await;
        self.rooms.join(room, Arc::clone(conn)).await;
    }

    pub async fn leave(&self, conn: &Connection, room: &RoomId) {
        conn.track_leave(room).await;
        self.rooms.leave(room, &conn.connection_id).await;
    }

    pub async fn get_connection(&self, connection_id: &Uuid) -> Option<Arc<Connection>> {
        let connections = self.connections.read().await;
        connections.get(connection_id).cloned()
    }

    pub async fn connection_count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }

    pub async fn get_stats(&self) -> WebSocketStats {
        let connection_count = self.connection_count().await;
        let room_count = self.rooms.get_room_count().await;

        WebSocketStats {
            active_connections: connection_count,
            active_rooms: room_count,
        }
    }
}

impl Default for WebSocketState {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about realtime connections
#[derive(Debug, Clone, serde::Serialize)]
pub struct WebSocketStats {
    pub active_connections: usize,
    pub active_rooms: usize,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chatdesk_shared::Participant;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_add_and_remove_connection() {
        let state = WebSocketState::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let conn = Connection::new(Participant::customer("v-1", "Guest"), tx);
        let connection_id = conn.connection_id;

        let added = state.add_connection(conn).await;
        assert_eq!(state.connection_count().await, 1);
        assert_eq!(added.participant.id, "v-1");
        assert!(state.get_connection(&connection_id).await.is_some());

        state.remove_connection(&connection_id).await;
        assert_eq!(state.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_admins_join_dashboard_on_connect() {
        let state = WebSocketState::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();

        let admin = state
            .add_connection(Connection::new(Participant::admin("A1", "Alice"), tx1))
            .await;
        let customer = state
            .add_connection(Connection::new(Participant::customer("v-1", "Guest"), tx2))
            .await;

        assert_eq!(state.rooms.get_room_size(&RoomId::Dashboard).await, 1);
        assert!(admin.is_member(&RoomId::Dashboard).await);
        assert!(!customer.is_member(&RoomId::Dashboard).await);

        let stats = state.get_stats().await;
        assert_eq!(stats.active_connections, 2);
        assert_eq!(stats.active_rooms, 1);

        state.remove_connection(&admin.connection_id).await;
        assert_eq!(state.rooms.get_room_count().await, 0);
    }
}

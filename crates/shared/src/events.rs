//! Realtime event types and serialization
//!
//! Defines all client-to-server and server-to-client events carried by the
//! realtime channel, with type-safe serde serialization.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

use crate::error::ChatError;
use crate::types::{ChatId, ChatSession, Message, ParticipantRole, SenderType, TypingSignal};

const DASHBOARD_ROOM: &str = "admin-dashboard";
const CHAT_ROOM_PREFIX: &str = "chat:";

// =============================================================================
// Rooms
// =============================================================================

/// Named scope on the realtime channel
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoomId {
    /// Conversation-scoped events for one session
    Chat(ChatId),
    /// Cross-session alerts, joined by every admin on connect
    Dashboard,
}

impl RoomId {
    pub fn chat(chat_id: &ChatId) -> Self {
        Self::Chat(chat_id.clone())
    }

    pub fn chat_id(&self) -> Option<&ChatId> {
        match self {
            Self::Chat(id) => Some(id),
            Self::Dashboard => None,
        }
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chat(id) => write!(f, "{CHAT_ROOM_PREFIX}{id}"),
            Self::Dashboard => f.write_str(DASHBOARD_ROOM),
        }
    }
}

impl std::str::FromStr for RoomId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == DASHBOARD_ROOM {
            return Ok(Self::Dashboard);
        }
        match s.strip_prefix(CHAT_ROOM_PREFIX) {
            Some(id) if !id.is_empty() => Ok(Self::Chat(ChatId::from(id))),
            _ => Err(format!("invalid room id: {s}")),
        }
    }
}

impl Serialize for RoomId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RoomId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Events sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Join a room. Idempotent.
    JoinRoom { room: RoomId },

    /// Leave a room
    LeaveRoom { room: RoomId },

    /// Sender started (or keeps) typing
    Typing { chat_id: ChatId, sender_name: String },

    /// Sender stopped typing
    StopTyping { chat_id: ChatId },

    /// Heartbeat ping to keep connection alive
    Ping,
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Connection acknowledged
    Connected {
        connection_id: Uuid,
        role: ParticipantRole,
    },

    /// Room join acknowledged
    Joined { room: RoomId },

    /// Durably recorded message, delivered to the conversation room
    Message { chat_id: ChatId, message: Message },

    /// The other party is typing
    Typing(TypingSignal),

    /// The other party stopped typing
    StopTyping {
        chat_id: ChatId,
        sender_type: SenderType,
    },

    /// A brand-new session is waiting (dashboard room)
    SessionCreated { session: ChatSession },

    /// A session row changed: status, assignment, last message or unread counts
    SessionUpdated { session: ChatSession },

    /// Heartbeat response
    Pong,

    /// Error message
    Error { code: String, message: String },
}

impl ServerEvent {
    pub fn error(err: &ChatError) -> Self {
        Self::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    /// Conversation this event belongs to, if any
    pub fn chat_id(&self) -> Option<&ChatId> {
        match self {
            Self::Message { chat_id, .. } | Self::StopTyping { chat_id, .. } => Some(chat_id),
            Self::Typing(signal) => Some(&signal.chat_id),
            Self::SessionCreated { session } | Self::SessionUpdated { session } => {
                Some(&session.chat_id)
            }
            Self::Joined { room } => room.chat_id(),
            Self::Connected { .. } | Self::Pong | Self::Error { .. } => None,
        }
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Joined { .. } => "joined",
            Self::Message { .. } => "message",
            Self::Typing(_) => "typing",
            Self::StopTyping { .. } => "stop_typing",
            Self::SessionCreated { .. } => "session_created",
            Self::SessionUpdated { .. } => "session_updated",
            Self::Pong => "pong",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_round_trip() {
        let room: RoomId = "chat:chat_abc".parse().unwrap();
        assert_eq!(room, RoomId::Chat(ChatId::from("chat_abc")));
        assert_eq!(room.to_string(), "chat:chat_abc");
        assert_eq!("admin-dashboard".parse::<RoomId>().unwrap(), RoomId::Dashboard);
        assert!("chat:".parse::<RoomId>().is_err());
        assert!("lobby".parse::<RoomId>().is_err());
    }

    #[test]
    fn test_client_event_deserialization() {
        let json = r#"{"type":"join_room","room":"chat:chat_123"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::JoinRoom { room } => {
                assert_eq!(room.chat_id().unwrap().as_str(), "chat_123");
            }
            _ => panic!("Expected JoinRoom event"),
        }
    }

    #[test]
    fn test_typing_event_shape() {
        let event = ServerEvent::Typing(TypingSignal {
            chat_id: ChatId::from("chat_1"),
            sender_type: SenderType::Admin,
            sender_name: "Alice".into(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "typing");
        assert_eq!(json["chat_id"], "chat_1");
        assert_eq!(json["sender_type"], "admin");
    }

    #[test]
    fn test_server_event_serialization() {
        let event = ServerEvent::Pong;
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);
    }

    #[test]
    fn test_error_event_carries_code() {
        let event = ServerEvent::error(&ChatError::NotFound(ChatId::from("chat_9")));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "NOT_FOUND");
    }
}

//! Session Store contract
//!
//! Sessions and messages are persisted behind this trait. The chat core only
//! talks to it through request/response calls; each backend (in-memory,
//! PostgreSQL, REST client) must honor the same guarantees:
//!
//! - assignment is a compare-and-swap on `waiting -> active`
//! - unread increments are atomic per audience
//! - message timestamps are non-decreasing within a session

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, ChatResult};
use crate::types::{
    AdminId, AssignedAdmin, AttachmentKind, ChatId, ChatSession, Customer, CustomerIdentity,
    Message, SenderType, SessionStatus,
};

/// Request to find or create the open session for an identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartSession {
    pub identity: CustomerIdentity,
    /// Opaque id of the browsing context (customer tab/device)
    pub visitor_id: String,
}

impl StartSession {
    pub fn identity_key(&self) -> String {
        self.identity.identity_key(&self.visitor_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartedSession {
    pub session: ChatSession,
    /// false when an existing open session was returned
    pub created: bool,
}

/// Partial update of a session.
///
/// `expected_status` makes the update a compare-and-swap: it is rejected
/// unless the stored status matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<Customer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SessionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_admin: Option<AssignedAdmin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_status: Option<SessionStatus>,
}

impl SessionPatch {
    pub fn close() -> Self {
        Self {
            status: Some(SessionStatus::Closed),
            expected_status: Some(SessionStatus::Active),
            ..Default::default()
        }
    }

    pub fn archive() -> Self {
        Self {
            status: Some(SessionStatus::Archived),
            expected_status: Some(SessionStatus::Closed),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<SessionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<AdminId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl SessionFilter {
    pub fn matches(&self, session: &ChatSession) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&session.status) {
            return false;
        }
        match &self.assigned_to {
            Some(admin) => session.is_assigned_to(admin),
            None => true,
        }
    }
}

/// Attachment content as submitted by a sender. The store decides the final URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentUpload {
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    pub filename: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl AttachmentUpload {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// A message as submitted for a durable write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub sender_id: String,
    pub sender_name: String,
    pub sender_type: SenderType,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachment: Option<AttachmentUpload>,
}

impl NewMessage {
    pub fn validate(&self) -> ChatResult<()> {
        let has_text = self
            .text
            .as_deref()
            .map(|t| !t.trim().is_empty())
            .unwrap_or(false);
        if !has_text && self.attachment.is_none() {
            return Err(ChatError::Validation(
                "Message needs text or an attachment".into(),
            ));
        }
        if let Some(attachment) = &self.attachment {
            if attachment.filename.trim().is_empty() {
                return Err(ChatError::Validation("Attachment filename is required".into()));
            }
        }
        Ok(())
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Return the open session for the identity, or create a `waiting` one
    async fn create_or_get_session(&self, request: &StartSession) -> ChatResult<StartedSession>;

    async fn get_session(&self, chat_id: &ChatId) -> ChatResult<ChatSession>;

    async fn update_session(&self, chat_id: &ChatId, patch: &SessionPatch) -> ChatResult<ChatSession>;

    /// Compare-and-swap `waiting -> active`. Losers get `AlreadyAssigned`.
    async fn assign_session(&self, chat_id: &ChatId, admin: &AssignedAdmin) -> ChatResult<ChatSession>;

    /// Messages ordered by server timestamp
    async fn list_messages(&self, chat_id: &ChatId) -> ChatResult<Vec<Message>>;

    async fn send_message(&self, chat_id: &ChatId, message: &NewMessage) -> ChatResult<Message>;

    async fn list_sessions(&self, filter: &SessionFilter) -> ChatResult<Vec<ChatSession>>;

    /// Reset the unread count of `audience` and flag the other side's messages as read
    async fn mark_read(&self, chat_id: &ChatId, audience: SenderType) -> ChatResult<ChatSession>;

    async fn health_check(&self) -> ChatResult<()> {
        Ok(())
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn text_message(text: Option<&str>) -> NewMessage {
        NewMessage {
            sender_id: "visitor".into(),
            sender_name: "Guest".into(),
            sender_type: SenderType::User,
            text: text.map(String::from),
            attachment: None,
        }
    }

    #[test]
    fn test_new_message_requires_content() {
        assert!(text_message(None).validate().is_err());
        assert!(text_message(Some("   ")).validate().is_err());
        assert!(text_message(Some("Hello")).validate().is_ok());

        let mut with_file = text_message(None);
        with_file.attachment = Some(AttachmentUpload {
            kind: AttachmentKind::Document,
            filename: "invoice.pdf".into(),
            data: vec![1, 2, 3],
        });
        assert!(with_file.validate().is_ok());
    }

    #[test]
    fn test_attachment_upload_is_base64_on_the_wire() {
        let upload = AttachmentUpload {
            kind: AttachmentKind::Image,
            filename: "a.png".into(),
            data: b"hi".to_vec(),
        };
        let json = serde_json::to_value(&upload).unwrap();
        assert_eq!(json["data"], "aGk=");
        assert_eq!(json["type"], "image");
        let back: AttachmentUpload = serde_json::from_value(json).unwrap();
        assert_eq!(back.data, b"hi");
    }

    #[test]
    fn test_filter_matching() {
        let mut session = ChatSession::new(Customer::anonymous());
        let waiting_only = SessionFilter {
            statuses: vec![SessionStatus::Waiting],
            ..Default::default()
        };
        assert!(waiting_only.matches(&session));

        session.assign(AssignedAdmin::new("A1", "Alice")).unwrap();
        assert!(!waiting_only.matches(&session));

        let mine = SessionFilter {
            assigned_to: Some(AdminId::from("A1")),
            ..Default::default()
        };
        assert!(mine.matches(&session));
    }
}

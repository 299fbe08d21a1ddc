//! In-memory Session Store
//!
//! Used by tests, local development (`STORE_BACKEND=memory`) and the
//! in-process client scenarios. One write lock guards every mutation, which
//! gives the compare-and-swap and atomic-increment guarantees for free.

use async_trait::async_trait;
use std::collections::HashMap;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;

use crate::error::{ChatError, ChatResult};
use crate::store::{NewMessage, SessionFilter, SessionPatch, SessionStore, StartSession, StartedSession};
use crate::types::{
    AssignedAdmin, Attachment, ChatId, ChatSession, Message, MessageId, SenderType,
};

#[derive(Default)]
struct MemoryState {
    sessions: HashMap<ChatId, ChatSession>,
    /// identity key -> most recent session started for it
    by_identity: HashMap<String, ChatId>,
    /// chat -> identity key it was started for
    identity_of: HashMap<ChatId, String>,
    messages: HashMap<ChatId, Vec<Message>>,
}

impl MemoryState {
    fn session_mut(&mut self, chat_id: &ChatId) -> ChatResult<&mut ChatSession> {
        self.sessions
            .get_mut(chat_id)
            .ok_or_else(|| ChatError::NotFound(chat_id.clone()))
    }

    /// Whether the identity behind `chat_id` has a different open session
    fn other_open_session(&self, chat_id: &ChatId) -> bool {
        self.identity_of
            .get(chat_id)
            .and_then(|key| self.by_identity.get(key))
            .filter(|latest| *latest != chat_id)
            .and_then(|latest| self.sessions.get(latest))
            .is_some_and(|session| session.status.is_open())
    }
}

pub struct MemorySessionStore {
    state: RwLock<MemoryState>,
    reopen_on_customer_message: bool,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::with_reopen(true)
    }

    pub fn with_reopen(reopen_on_customer_message: bool) -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            reopen_on_customer_message,
        }
    }

    /// Number of stored sessions, open or not
    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_or_get_session(&self, request: &StartSession) -> ChatResult<StartedSession> {
        if let crate::types::CustomerIdentity::Guest(guest) = &request.identity {
            guest.validate().map_err(ChatError::Validation)?;
        }

        let key = request.identity_key();
        let mut state = self.state.write().await;

        if let Some(existing) = state
            .by_identity
            .get(&key)
            .and_then(|chat_id| state.sessions.get(chat_id))
            .filter(|session| session.status.is_open())
        {
            return Ok(StartedSession {
                session: existing.clone(),
                created: false,
            });
        }

        let session = ChatSession::new(request.identity.to_customer());
        state.by_identity.insert(key.clone(), session.chat_id.clone());
        state.identity_of.insert(session.chat_id.clone(), key);
        state.messages.insert(session.chat_id.clone(), Vec::new());
        state.sessions.insert(session.chat_id.clone(), session.clone());

        tracing::info!(
            chat_id = %session.chat_id,
            identity_kind = session.customer.identity_kind.as_str(),
            "Chat session created"
        );

        Ok(StartedSession {
            session,
            created: true,
        })
    }

    async fn get_session(&self, chat_id: &ChatId) -> ChatResult<ChatSession> {
        self.state
            .read()
            .await
            .sessions
            .get(chat_id)
            .cloned()
            .ok_or_else(|| ChatError::NotFound(chat_id.clone()))
    }

    async fn update_session(&self, chat_id: &ChatId, patch: &SessionPatch) -> ChatResult<ChatSession> {
        let mut state = self.state.write().await;
        let session = state.session_mut(chat_id)?;
        session.apply_patch(patch)?;
        Ok(session.clone())
    }

    async fn assign_session(&self, chat_id: &ChatId, admin: &AssignedAdmin) -> ChatResult<ChatSession> {
        let mut state = self.state.write().await;
        let session = state.session_mut(chat_id)?;
        session.assign(admin.clone())?;
        Ok(session.clone())
    }

    async fn list_messages(&self, chat_id: &ChatId) -> ChatResult<Vec<Message>> {
        let state = self.state.read().await;
        if !state.sessions.contains_key(chat_id) {
            return Err(ChatError::NotFound(chat_id.clone()));
        }
        let mut messages = state.messages.get(chat_id).cloned().unwrap_or_default();
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }

    async fn send_message(&self, chat_id: &ChatId, message: &NewMessage) -> ChatResult<Message> {
        message.validate()?;

        let mut state = self.state.write().await;
        let last_timestamp = state
            .messages
            .get(chat_id)
            .and_then(|messages| messages.last())
            .map(|m| m.timestamp);

        let mut timestamp = OffsetDateTime::now_utc();
        if let Some(last) = last_timestamp {
            if timestamp < last {
                timestamp = last + Duration::microseconds(1);
            }
        }

        let id = MessageId::durable();
        let attachments = message
            .attachment
            .iter()
            .map(|upload| Attachment {
                kind: upload.kind,
                url: format!("memory://attachments/{chat_id}/{id}/{}", upload.filename),
                filename: upload.filename.clone(),
                size: Some(upload.size()),
            })
            .collect();

        let stored = Message {
            id,
            chat_id: chat_id.clone(),
            sender_id: message.sender_id.clone(),
            sender_name: message.sender_name.clone(),
            sender_type: message.sender_type,
            message: message.text.clone().unwrap_or_default(),
            attachments,
            timestamp,
            is_read: false,
        };

        // A newer open session for the same identity keeps this one closed
        let reopen = self.reopen_on_customer_message && !state.other_open_session(chat_id);
        let session = state.session_mut(chat_id)?;
        session.record_message(&stored, reopen)?;
        if session.status.is_open() {
            if let Some(key) = state.identity_of.get(chat_id).cloned() {
                state.by_identity.insert(key, chat_id.clone());
            }
        }

        state
            .messages
            .entry(chat_id.clone())
            .or_default()
            .push(stored.clone());

        Ok(stored)
    }

    async fn list_sessions(&self, filter: &SessionFilter) -> ChatResult<Vec<ChatSession>> {
        let state = self.state.read().await;
        let mut sessions: Vec<ChatSession> = state
            .sessions
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        if let Some(limit) = filter.limit {
            sessions.truncate(limit as usize);
        }
        Ok(sessions)
    }

    async fn mark_read(&self, chat_id: &ChatId, audience: SenderType) -> ChatResult<ChatSession> {
        let mut state = self.state.write().await;
        let session = state.session_mut(chat_id)?;
        session.mark_read(audience);
        let session = session.clone();

        if let Some(messages) = state.messages.get_mut(chat_id) {
            for m in messages.iter_mut().filter(|m| m.sender_type == audience.other()) {
                m.is_read = true;
            }
        }
        Ok(session)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::{AuthenticatedUser, CustomerIdentity, SessionStatus};
    use std::sync::Arc;

    fn anonymous(visitor: &str) -> StartSession {
        StartSession {
            identity: CustomerIdentity::Anonymous,
            visitor_id: visitor.to_string(),
        }
    }

    fn text(sender_type: SenderType, sender_id: &str, text: &str) -> NewMessage {
        NewMessage {
            sender_id: sender_id.to_string(),
            sender_name: sender_id.to_string(),
            sender_type,
            text: Some(text.to_string()),
            attachment: None,
        }
    }

    #[tokio::test]
    async fn test_start_is_idempotent_per_identity() {
        let store = MemorySessionStore::new();
        let request = StartSession {
            identity: CustomerIdentity::Authenticated(AuthenticatedUser {
                id: "u-1".into(),
                name: "Ada".into(),
                phone: None,
                email: None,
            }),
            visitor_id: "tab-1".into(),
        };

        let first = store.create_or_get_session(&request).await.unwrap();
        let second = store.create_or_get_session(&request).await.unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.session.chat_id, second.session.chat_id);
        assert_eq!(store.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_closed_session_is_not_returned_by_start() {
        let store = MemorySessionStore::new();
        let started = store.create_or_get_session(&anonymous("tab")).await.unwrap();
        let chat_id = started.session.chat_id;
        store
            .assign_session(&chat_id, &AssignedAdmin::new("A1", "Alice"))
            .await
            .unwrap();
        store.update_session(&chat_id, &SessionPatch::close()).await.unwrap();

        let next = store.create_or_get_session(&anonymous("tab")).await.unwrap();
        assert!(next.created);
        assert_ne!(next.session.chat_id, chat_id);
    }

    #[tokio::test]
    async fn test_late_message_keeps_one_open_session_per_identity() {
        let store = MemorySessionStore::new();
        let old = store.create_or_get_session(&anonymous("tab")).await.unwrap().session.chat_id;
        store
            .assign_session(&old, &AssignedAdmin::new("A1", "Alice"))
            .await
            .unwrap();
        store.update_session(&old, &SessionPatch::close()).await.unwrap();
        let newer = store.create_or_get_session(&anonymous("tab")).await.unwrap().session.chat_id;

        store
            .send_message(&old, &text(SenderType::User, "visitor", "One more thing"))
            .await
            .unwrap();

        let old_session = store.get_session(&old).await.unwrap();
        assert_eq!(old_session.status, SessionStatus::Closed);
        assert_eq!(old_session.unread_count.admin, 1);
        assert_eq!(store.list_messages(&old).await.unwrap().len(), 1);

        let open = store
            .list_sessions(&SessionFilter {
                statuses: vec![SessionStatus::Waiting, SessionStatus::Active],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].chat_id, newer);
    }

    #[tokio::test]
    async fn test_late_message_reopens_latest_closed_session() {
        let store = MemorySessionStore::new();
        let chat_id = store.create_or_get_session(&anonymous("tab")).await.unwrap().session.chat_id;
        store
            .assign_session(&chat_id, &AssignedAdmin::new("A1", "Alice"))
            .await
            .unwrap();
        store.update_session(&chat_id, &SessionPatch::close()).await.unwrap();

        store
            .send_message(&chat_id, &text(SenderType::User, "visitor", "Wait"))
            .await
            .unwrap();
        assert_eq!(
            store.get_session(&chat_id).await.unwrap().status,
            SessionStatus::Waiting
        );

        // start resumes the reopened chat
        let resumed = store.create_or_get_session(&anonymous("tab")).await.unwrap();
        assert!(!resumed.created);
        assert_eq!(resumed.session.chat_id, chat_id);
    }

    #[tokio::test]
    async fn test_unknown_chat_is_not_found() {
        let store = MemorySessionStore::new();
        let missing = ChatId::from("chat_missing");
        assert!(matches!(
            store.get_session(&missing).await,
            Err(ChatError::NotFound(_))
        ));
        assert!(matches!(
            store.list_messages(&missing).await,
            Err(ChatError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_assignment_has_one_winner() {
        let store = Arc::new(MemorySessionStore::new());
        let chat_id = store
            .create_or_get_session(&anonymous("tab"))
            .await
            .unwrap()
            .session
            .chat_id;

        let mut handles = Vec::new();
        for admin in ["AX", "AY"] {
            let store = Arc::clone(&store);
            let chat_id = chat_id.clone();
            handles.push(tokio::spawn(async move {
                store
                    .assign_session(&chat_id, &AssignedAdmin::new(admin, admin))
                    .await
            }));
        }

        let mut wins = 0;
        let mut losses = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(session) => {
                    wins += 1;
                    assert_eq!(session.status, SessionStatus::Active);
                }
                Err(ChatError::AlreadyAssigned { .. }) => losses += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!((wins, losses), (1, 1));
    }

    #[tokio::test]
    async fn test_messages_update_unread_and_last_message() {
        let store = MemorySessionStore::new();
        let chat_id = store
            .create_or_get_session(&anonymous("tab"))
            .await
            .unwrap()
            .session
            .chat_id;

        store
            .send_message(&chat_id, &text(SenderType::User, "visitor", "Hello"))
            .await
            .unwrap();
        store
            .send_message(&chat_id, &text(SenderType::User, "visitor", "Anyone?"))
            .await
            .unwrap();

        let session = store.get_session(&chat_id).await.unwrap();
        assert_eq!(session.unread_count.admin, 2);
        assert_eq!(session.unread_count.customer, 0);
        assert_eq!(session.last_message.unwrap().content, "Anyone?");

        let session = store.mark_read(&chat_id, SenderType::Admin).await.unwrap();
        assert_eq!(session.unread_count.admin, 0);
        let messages = store.list_messages(&chat_id).await.unwrap();
        assert!(messages.iter().all(|m| m.is_read));
    }

    #[tokio::test]
    async fn test_timestamps_are_monotonic() {
        let store = MemorySessionStore::new();
        let chat_id = store
            .create_or_get_session(&anonymous("tab"))
            .await
            .unwrap()
            .session
            .chat_id;

        for i in 0..20 {
            store
                .send_message(&chat_id, &text(SenderType::User, "visitor", &format!("m{i}")))
                .await
                .unwrap();
        }

        let messages = store.list_messages(&chat_id).await.unwrap();
        assert!(messages.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        let texts: Vec<_> = messages.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(texts.first(), Some(&"m0"));
        assert_eq!(texts.last(), Some(&"m19"));
    }

    #[tokio::test]
    async fn test_attachment_gets_store_url() {
        let store = MemorySessionStore::new();
        let chat_id = store
            .create_or_get_session(&anonymous("tab"))
            .await
            .unwrap()
            .session
            .chat_id;

        let mut msg = text(SenderType::User, "visitor", "");
        msg.text = None;
        msg.attachment = Some(crate::store::AttachmentUpload {
            kind: crate::types::AttachmentKind::Image,
            filename: "receipt.png".into(),
            data: vec![0u8; 16],
        });

        let stored = store.send_message(&chat_id, &msg).await.unwrap();
        assert_eq!(stored.message, "");
        assert_eq!(stored.attachments.len(), 1);
        assert!(stored.attachments[0].url.starts_with("memory://attachments/"));
        assert_eq!(stored.attachments[0].size, Some(16));
    }
}

//! Chat service
//!
//! The Session Store the routes and realtime hub talk to: every call goes to
//! the configured backend, and successful writes are then fanned out through
//! the [`AdminNotifier`].

use async_trait::async_trait;
use chatdesk_shared::{
    AssignedAdmin, ChatId, ChatResult, ChatSession, Message, NewMessage, SenderType,
    SessionFilter, SessionPatch, SessionStore, StartSession, StartedSession,
};
use std::sync::Arc;

use crate::notifier::AdminNotifier;
use crate::websocket::WebSocketState;

#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn SessionStore>,
    notifier: AdminNotifier,
}

impl ChatService {
    pub fn new(store: Arc<dyn SessionStore>, ws_state: WebSocketState) -> Self {
        Self {
            store,
            notifier: AdminNotifier::new(ws_state),
        }
    }

    /// Refresh the row after a message write and publish it. The message is
    /// already durable, so a failed refresh is only logged.
    async fn publish_row(&self, chat_id: &ChatId) {
        match self.store.get_session(chat_id).await {
            Ok(session) => self.notifier.session_updated(&session).await,
            Err(e) => tracing::warn!(
                chat_id = %chat_id,
                error = %e,
                "Could not refresh session after message write"
            ),
        }
    }
}

#[async_trait]
impl SessionStore for ChatService {
    async fn create_or_get_session(&self, request: &StartSession) -> ChatResult<StartedSession> {
        let started = self.store.create_or_get_session(request).await?;
        if started.created {
            self.notifier.session_created(&started.session).await;
        }
        Ok(started)
    }

    async fn get_session(&self, chat_id: &ChatId) -> ChatResult<ChatSession> {
        self.store.get_session(chat_id).await
    }

    async fn update_session(&self, chat_id: &ChatId, patch: &SessionPatch) -> ChatResult<ChatSession> {
        let session = self.store.update_session(chat_id, patch).await?;
        tracing::info!(
            chat_id = %chat_id,
            status = %session.status,
            "Chat session updated"
        );
        self.notifier.session_updated(&session).await;
        Ok(session)
    }

    async fn assign_session(&self, chat_id: &ChatId, admin: &AssignedAdmin) -> ChatResult<ChatSession> {
        let session = match self.store.assign_session(chat_id, admin).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(chat_id = %chat_id, admin_id = %admin.id, error = %e, "Assignment rejected");
                return Err(e);
            }
        };
        tracing::info!(chat_id = %chat_id, admin_id = %admin.id, "Chat session assigned");
        self.notifier.session_updated(&session).await;
        Ok(session)
    }

    async fn list_messages(&self, chat_id: &ChatId) -> ChatResult<Vec<Message>> {
        self.store.list_messages(chat_id).await
    }

    async fn send_message(&self, chat_id: &ChatId, message: &NewMessage) -> ChatResult<Message> {
        let stored = self.store.send_message(chat_id, message).await?;
        self.notifier.message(&stored).await;
        self.publish_row(chat_id).await;
        Ok(stored)
    }

    async fn list_sessions(&self, filter: &SessionFilter) -> ChatResult<Vec<ChatSession>> {
        self.store.list_sessions(filter).await
    }

    async fn mark_read(&self, chat_id: &ChatId, audience: SenderType) -> ChatResult<ChatSession> {
        let session = self.store.mark_read(chat_id, audience).await?;
        self.notifier.session_updated(&session).await;
        Ok(session)
    }

    async fn health_check(&self) -> ChatResult<()> {
        self.store.health_check().await
    }
}

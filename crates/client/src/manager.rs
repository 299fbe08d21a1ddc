//! Chat Session Manager
//!
//! Resolves who the customer is and obtains the session before any messaging
//! happens. Sessions are cached per identity key, and concurrent `start`
//! calls are serialized, so one browsing context never opens two sessions
//! for the same identity.

use async_trait::async_trait;
use chatdesk_shared::{
    AssignedAdmin, AuthenticatedUser, ChatError, ChatId, ChatResult, ChatSession, Customer,
    CustomerIdentity, GuestDetails, SessionFilter, SessionPatch, SessionStatus, SessionStore,
    StartSession,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Source of the signed-in storefront user
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `Ok(None)` means nobody is signed in. Errors are surfaced, never
    /// treated as anonymous.
    async fn current_user(&self) -> ChatResult<Option<AuthenticatedUser>>;
}

/// Fixed identity, for embedders that already know the user
pub struct StaticIdentity(pub Option<AuthenticatedUser>);

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user(&self) -> ChatResult<Option<AuthenticatedUser>> {
        Ok(self.0.clone())
    }
}

pub struct ChatSessionManager {
    store: Arc<dyn SessionStore>,
    identity_provider: Option<Arc<dyn IdentityProvider>>,
    visitor_id: String,
    /// identity key -> last known session; the lock also serializes `start`
    sessions: Mutex<HashMap<String, ChatSession>>,
}

impl ChatSessionManager {
    pub fn new(store: Arc<dyn SessionStore>, visitor_id: impl Into<String>) -> Self {
        Self {
            store,
            identity_provider: None,
            visitor_id: visitor_id.into(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity_provider = Some(provider);
        self
    }

    pub fn store(&self) -> Arc<dyn SessionStore> {
        Arc::clone(&self.store)
    }

    pub fn visitor_id(&self) -> &str {
        &self.visitor_id
    }

    /// Return the open session for `identity`, creating a `waiting` one if
    /// there is none
    pub async fn start(&self, identity: CustomerIdentity) -> ChatResult<ChatSession> {
        if let CustomerIdentity::Guest(guest) = &identity {
            guest.validate().map_err(ChatError::Validation)?;
        }

        let request = StartSession {
            identity,
            visitor_id: self.visitor_id.clone(),
        };
        let key = request.identity_key();

        let mut sessions = self.sessions.lock().await;
        if let Some(cached) = sessions.get(&key) {
            match self.store.get_session(&cached.chat_id).await {
                Ok(session) if session.status.is_open() => {
                    sessions.insert(key, session.clone());
                    return Ok(session);
                }
                Ok(_) | Err(ChatError::NotFound(_)) => {
                    sessions.remove(&key);
                }
                Err(e) => return Err(e),
            }
        }

        let started = self.store.create_or_get_session(&request).await?;
        if started.created {
            tracing::info!(
                chat_id = %started.session.chat_id,
                identity_kind = request.identity.kind().as_str(),
                "Chat session started"
            );
        }
        sessions.insert(key, started.session.clone());
        Ok(started.session)
    }

    /// Start with whoever the identity provider says is signed in, else the
    /// guest details, else anonymously
    pub async fn start_resolved(&self, guest: Option<GuestDetails>) -> ChatResult<ChatSession> {
        let user = match &self.identity_provider {
            Some(provider) => provider.current_user().await?,
            None => None,
        };
        let identity = match (user, guest) {
            (Some(user), _) => CustomerIdentity::Authenticated(user),
            (None, Some(guest)) => CustomerIdentity::Guest(guest),
            (None, None) => CustomerIdentity::Anonymous,
        };
        self.start(identity).await
    }

    pub async fn upgrade_identity(
        &self,
        chat_id: &ChatId,
        guest: &GuestDetails,
    ) -> ChatResult<ChatSession> {
        guest.validate().map_err(ChatError::Validation)?;
        let patch = SessionPatch {
            customer: Some(Customer::from_guest(guest)),
            ..Default::default()
        };
        let session = self.store.update_session(chat_id, &patch).await?;
        self.remember(&session).await;
        Ok(session)
    }

    /// First assignment wins
    pub async fn assign(&self, chat_id: &ChatId, admin: &AssignedAdmin) -> ChatResult<ChatSession> {
        match self.store.assign_session(chat_id, admin).await {
            Ok(session) => Ok(session),
            Err(e) => {
                tracing::warn!(chat_id = %chat_id, admin_id = %admin.id, error = %e, "Assignment failed");
                Err(e)
            }
        }
    }

    /// Closing an already closed session is a no-op
    pub async fn close(&self, chat_id: &ChatId) -> ChatResult<ChatSession> {
        match self.store.update_session(chat_id, &SessionPatch::close()).await {
            Err(ChatError::InvalidTransition {
                from: SessionStatus::Closed,
                ..
            }) => self.store.get_session(chat_id).await,
            result => result,
        }
    }

    pub async fn archive(&self, chat_id: &ChatId) -> ChatResult<ChatSession> {
        self.store
            .update_session(chat_id, &SessionPatch::archive())
            .await
    }

    pub async fn get(&self, chat_id: &ChatId) -> ChatResult<ChatSession> {
        self.store.get_session(chat_id).await
    }

    pub async fn refresh_sessions(&self, filter: &SessionFilter) -> ChatResult<Vec<ChatSession>> {
        self.store.list_sessions(filter).await
    }

    async fn remember(&self, session: &ChatSession) {
        let mut sessions = self.sessions.lock().await;
        for cached in sessions.values_mut() {
            if cached.chat_id == session.chat_id {
                *cached = session.clone();
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chatdesk_shared::{IdentityKind, MemorySessionStore};

    fn manager() -> ChatSessionManager {
        ChatSessionManager::new(Arc::new(MemorySessionStore::new()), "tab-1")
    }

    fn ada() -> AuthenticatedUser {
        AuthenticatedUser {
            id: "u-7".into(),
            name: "Ada".into(),
            phone: None,
            email: Some("ada@shop.test".into()),
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl IdentityProvider for FailingProvider {
        async fn current_user(&self) -> ChatResult<Option<AuthenticatedUser>> {
            Err(ChatError::Unauthorized("token expired".into()))
        }
    }

    #[tokio::test]
    async fn test_start_twice_returns_same_chat() {
        let manager = manager();
        let first = manager
            .start(CustomerIdentity::Authenticated(ada()))
            .await
            .unwrap();
        let second = manager
            .start(CustomerIdentity::Authenticated(ada()))
            .await
            .unwrap();
        assert_eq!(first.chat_id, second.chat_id);
    }

    #[tokio::test]
    async fn test_concurrent_starts_share_one_session() {
        let manager = Arc::new(manager());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.start(CustomerIdentity::Anonymous).await })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().chat_id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn test_closed_session_is_not_resumed() {
        let manager = manager();
        let first = manager.start(CustomerIdentity::Anonymous).await.unwrap();
        manager
            .assign(&first.chat_id, &AssignedAdmin::new("A1", "Alice"))
            .await
            .unwrap();
        manager.close(&first.chat_id).await.unwrap();
        // Closing twice is fine
        manager.close(&first.chat_id).await.unwrap();

        let second = manager.start(CustomerIdentity::Anonymous).await.unwrap();
        assert_ne!(first.chat_id, second.chat_id);
        assert_eq!(second.status, SessionStatus::Waiting);
    }

    #[tokio::test]
    async fn test_provider_user_wins_over_guest() {
        let manager = manager().with_identity_provider(Arc::new(StaticIdentity(Some(ada()))));
        let session = manager
            .start_resolved(Some(GuestDetails {
                name: "Someone".into(),
                email: None,
                phone: None,
                subject: None,
            }))
            .await
            .unwrap();
        assert_eq!(session.customer.identity_kind, IdentityKind::Authenticated);
        assert_eq!(session.customer.name, "Ada");
    }

    #[tokio::test]
    async fn test_provider_error_is_not_anonymous() {
        let manager = manager().with_identity_provider(Arc::new(FailingProvider));
        let err = manager.start_resolved(None).await.unwrap_err();
        assert!(matches!(err, ChatError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_upgrade_keeps_chat_id() {
        let manager = manager();
        let session = manager.start(CustomerIdentity::Anonymous).await.unwrap();

        let guest = GuestDetails {
            name: "Grace".into(),
            email: Some("grace@shop.test".into()),
            phone: None,
            subject: Some("Refund".into()),
        };
        let upgraded = manager.upgrade_identity(&session.chat_id, &guest).await.unwrap();
        assert_eq!(upgraded.chat_id, session.chat_id);
        assert_eq!(upgraded.customer.identity_kind, IdentityKind::NamedGuest);

        let bad = GuestDetails {
            name: "Grace".into(),
            email: Some("not-an-email".into()),
            phone: None,
            subject: None,
        };
        assert!(matches!(
            manager.upgrade_identity(&session.chat_id, &bad).await,
            Err(ChatError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_chat_is_not_found() {
        let manager = manager();
        assert!(matches!(
            manager.get(&ChatId::from("chat_missing")).await,
            Err(ChatError::NotFound(_))
        ));
        assert!(matches!(
            manager
                .assign(&ChatId::from("chat_missing"), &AssignedAdmin::new("A1", "Alice"))
                .await,
            Err(ChatError::NotFound(_))
        ));
    }
}

//! Message Sync Engine
//!
//! One engine per open conversation, parameterized by which side is local.
//! Sends are optimistic: the message is shown under a temporary id at once,
//! then swapped for the stored message or rolled back with the draft
//! restored. Pushed messages from the other side are appended; our own are
//! never echoed back.

use chatdesk_shared::{
    AssignedAdmin, Attachment, AttachmentUpload, ChatError, ChatId, ChatResult, ChatSession,
    CustomerIdentity, GuestDetails, Message, MessageId, NewMessage, Participant, RoomId,
    SenderType, ServerEvent, SessionStatus, SessionStore,
};
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;

use crate::channel::{ChannelHandle, ChannelUpdate};
use crate::config::ClientConfig;
use crate::manager::ChatSessionManager;
use crate::outbound::{Draft, Outbound, OutboundState};
use crate::timeline::Timeline;
use crate::typing::{TypingIndicator, TypingSignaler};

const SEND_FAILED_NOTICE: &str = "Your message could not be sent. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Reconnecting,
    Disconnected,
}

struct EngineState {
    session: ChatSession,
    timeline: Timeline,
    outbound: HashMap<MessageId, Outbound>,
    draft: Draft,
    other_typing: TypingIndicator,
    /// Fires a change once the indicator goes stale
    typing_expiry: Option<JoinHandle<()>>,
    connection: ConnectionState,
    notice: Option<String>,
}

impl EngineState {
    /// Row updates can arrive out of order; keep the newest
    fn apply_session(&mut self, session: ChatSession) {
        if session.updated_at >= self.session.updated_at {
            self.session = session;
        }
    }
}

/// Everything the event task needs; it deliberately holds no channel handle
#[derive(Clone)]
struct EngineCore {
    chat_id: ChatId,
    local_type: SenderType,
    store: Arc<dyn SessionStore>,
    state: Arc<Mutex<EngineState>>,
    changed: Arc<watch::Sender<u64>>,
}

impl EngineCore {
    fn bump(&self) {
        self.changed.send_modify(|version| *version = version.wrapping_add(1));
    }

    fn bump_after(&self, delay: std::time::Duration) -> JoinHandle<()> {
        let core = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            core.bump();
        })
    }

    async fn apply(&self, update: ChannelUpdate) {
        match update {
            ChannelUpdate::Event(event) => self.apply_event(event).await,
            ChannelUpdate::Reconnecting => {
                self.state.lock().await.connection = ConnectionState::Reconnecting;
                self.bump();
            }
            ChannelUpdate::Reconnected => {
                self.state.lock().await.connection = ConnectionState::Connected;
                self.refetch().await;
            }
            ChannelUpdate::Closed => {
                self.state.lock().await.connection = ConnectionState::Disconnected;
                self.bump();
            }
        }
    }

    async fn apply_event(&self, event: ServerEvent) {
        if event.chat_id() != Some(&self.chat_id) {
            return;
        }

        let mut state = self.state.lock().await;
        match event {
            ServerEvent::Message { message, .. } => {
                if message.sender_type == self.local_type {
                    return;
                }
                state.other_typing.clear();
                state.timeline.append_remote(message);
            }
            ServerEvent::Typing(signal) => {
                if signal.sender_type == self.local_type {
                    return;
                }
                state.other_typing.on_typing(&signal);
                let expiry = self.bump_after(state.other_typing.stale_after());
                if let Some(previous) = state.typing_expiry.replace(expiry) {
                    previous.abort();
                }
            }
            ServerEvent::StopTyping { sender_type, .. } => {
                if sender_type == self.local_type {
                    return;
                }
                state.other_typing.clear();
            }
            ServerEvent::SessionCreated { session } | ServerEvent::SessionUpdated { session } => {
                state.apply_session(session);
            }
            ServerEvent::Joined { .. } => return,
            ServerEvent::Connected { .. } | ServerEvent::Pong | ServerEvent::Error { .. } => return,
        }
        drop(state);
        self.bump();
    }

    /// Re-read the authoritative history and row, e.g. after a reconnect
    async fn refetch(&self) {
        let history = self.store.list_messages(&self.chat_id).await;
        let session = self.store.get_session(&self.chat_id).await;

        let mut state = self.state.lock().await;
        match history {
            Ok(history) => state.timeline.replace_history(history),
            Err(e) => tracing::warn!(chat_id = %self.chat_id, error = %e, "History refetch failed"),
        }
        match session {
            Ok(session) => state.apply_session(session),
            Err(e) => tracing::warn!(chat_id = %self.chat_id, error = %e, "Session refetch failed"),
        }
        drop(state);
        self.bump();
    }
}

async fn run_events(core: EngineCore, mut updates: broadcast::Receiver<ChannelUpdate>) {
    loop {
        match updates.recv().await {
            Ok(update) => core.apply(update).await,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(chat_id = %core.chat_id, skipped, "Realtime updates lagged, refetching");
                core.refetch().await;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

pub struct MessageSyncEngine {
    core: EngineCore,
    local: Participant,
    channel: ChannelHandle,
    typing: TypingSignaler,
    changes: watch::Receiver<u64>,
    events: JoinHandle<()>,
}

impl Drop for MessageSyncEngine {
    fn drop(&mut self) {
        self.events.abort();
        if let Ok(mut state) = self.core.state.try_lock() {
            if let Some(expiry) = state.typing_expiry.take() {
                expiry.abort();
            }
        }
    }
}

impl MessageSyncEngine {
    /// Join the conversation room and load the authoritative history.
    /// `local` decides which side this engine speaks for.
    pub async fn open(
        chat_id: ChatId,
        local: Participant,
        store: Arc<dyn SessionStore>,
        channel: ChannelHandle,
        config: &ClientConfig,
    ) -> ChatResult<Self> {
        // Subscribe before joining so nothing pushed in between is missed
        let updates = channel.subscribe();
        channel.join(RoomId::chat(&chat_id)).await?;

        let session = store.get_session(&chat_id).await?;
        let history = store.list_messages(&chat_id).await?;

        let mut timeline = Timeline::new();
        timeline.replace_history(history);

        let typing_name = match local.sender_type() {
            SenderType::User => session.customer.name.clone(),
            SenderType::Admin => local.name.clone(),
        };
        let typing = TypingSignaler::new(
            chat_id.clone(),
            typing_name,
            channel.clone(),
            config.typing_timeout,
        );

        let (changed, changes) = watch::channel(0u64);
        let core = EngineCore {
            chat_id: chat_id.clone(),
            local_type: local.sender_type(),
            store,
            state: Arc::new(Mutex::new(EngineState {
                session,
                timeline,
                outbound: HashMap::new(),
                draft: Draft::default(),
                other_typing: TypingIndicator::new(config.typing_stale_timeout()),
                typing_expiry: None,
                connection: ConnectionState::Connected,
                notice: None,
            })),
            changed: Arc::new(changed),
        };
        let events = tokio::spawn(run_events(core.clone(), updates));

        tracing::debug!(chat_id = %chat_id, sender_type = %local.sender_type(), "Conversation opened");

        Ok(Self {
            core,
            local,
            channel,
            typing,
            changes,
            events,
        })
    }

    pub fn chat_id(&self) -> &ChatId {
        &self.core.chat_id
    }

    pub fn local_sender_type(&self) -> SenderType {
        self.core.local_type
    }

    pub fn channel(&self) -> &ChannelHandle {
        &self.channel
    }

    /// Bumped after every visible state change
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.changes.clone()
    }

    // -------------------------------------------------------------------------
    // Input
    // -------------------------------------------------------------------------

    /// Update the input text. Non-empty input counts as a keystroke.
    pub async fn set_draft(&self, text: impl Into<String>) {
        let text = text.into();
        let typing = !text.trim().is_empty();
        self.core.state.lock().await.draft.text = text;
        self.core.bump();

        if typing {
            if let Err(e) = self.typing.notify_typing().await {
                tracing::debug!(chat_id = %self.core.chat_id, error = %e, "Typing signal not sent");
            }
        }
    }

    pub async fn attach(&self, upload: Option<AttachmentUpload>) {
        self.core.state.lock().await.draft.attachment = upload;
        self.core.bump();
    }

    pub async fn draft(&self) -> Draft {
        self.core.state.lock().await.draft.clone()
    }

    // -------------------------------------------------------------------------
    // Send path
    // -------------------------------------------------------------------------

    /// Send whatever is in the input
    pub async fn send_draft(&self) -> ChatResult<Message> {
        let draft = self.draft().await;
        self.send(draft).await
    }

    pub async fn send_text(&self, text: impl Into<String>) -> ChatResult<Message> {
        self.send(Draft::text(text)).await
    }

    pub async fn send(&self, draft: Draft) -> ChatResult<Message> {
        if draft.is_empty() {
            return Err(ChatError::Validation(
                "Message needs text or an attachment".into(),
            ));
        }

        let temp_id = MessageId::temporary();
        let request = {
            let mut state = self.core.state.lock().await;
            if matches!(
                state.session.status,
                SessionStatus::Closed | SessionStatus::Archived
            ) {
                return Err(ChatError::SessionClosed(self.core.chat_id.clone()));
            }

            let sender_name = self.sender_name(&state.session);
            state
                .timeline
                .push_optimistic(self.optimistic(&temp_id, &sender_name, &draft));
            state
                .outbound
                .insert(temp_id.clone(), Outbound::new(temp_id.clone(), draft.clone()));
            state.draft = Draft::default();
            state.notice = None;

            NewMessage {
                sender_id: self.local.id.clone(),
                sender_name,
                sender_type: self.core.local_type,
                text: (!draft.text.trim().is_empty()).then(|| draft.text.clone()),
                attachment: draft.attachment.clone(),
            }
        };
        self.core.bump();

        if let Err(e) = self.typing.notify_stop_typing().await {
            tracing::debug!(chat_id = %self.core.chat_id, error = %e, "Stop typing not sent");
        }

        let result = self.core.store.send_message(&self.core.chat_id, &request).await;

        let mut state = self.core.state.lock().await;
        let mut outbound = state
            .outbound
            .remove(&temp_id)
            .unwrap_or_else(|| Outbound::new(temp_id.clone(), draft.clone()));

        let result = match result {
            Ok(stored) => {
                outbound.confirm(stored.id.clone())?;
                state.timeline.confirm(&temp_id, stored.clone());
                Ok(stored)
            }
            Err(e) => {
                outbound.fail()?;
                state.timeline.remove(&temp_id);
                let current = std::mem::take(&mut state.draft);
                state.draft = Draft::restore(outbound.draft, current);
                state.notice = Some(SEND_FAILED_NOTICE.to_string());
                tracing::warn!(
                    chat_id = %self.core.chat_id,
                    error = %e,
                    "Send failed, draft restored"
                );
                Err(e)
            }
        };
        drop(state);
        self.core.bump();
        result
    }

    fn sender_name(&self, session: &ChatSession) -> String {
        match self.core.local_type {
            SenderType::User => session.customer.name.clone(),
            SenderType::Admin => self.local.name.clone(),
        }
    }

    fn optimistic(&self, temp_id: &MessageId, sender_name: &str, draft: &Draft) -> Message {
        let attachments = draft
            .attachment
            .iter()
            .map(|upload| Attachment {
                kind: upload.kind,
                url: format!("local-preview:{temp_id}/{}", upload.filename),
                filename: upload.filename.clone(),
                size: Some(upload.size()),
            })
            .collect();

        Message {
            id: temp_id.clone(),
            chat_id: self.core.chat_id.clone(),
            sender_id: self.local.id.clone(),
            sender_name: sender_name.to_string(),
            sender_type: self.core.local_type,
            message: draft.text.clone(),
            attachments,
            timestamp: OffsetDateTime::now_utc(),
            is_read: false,
        }
    }

    // -------------------------------------------------------------------------
    // Read side
    // -------------------------------------------------------------------------

    pub async fn messages(&self) -> Vec<Message> {
        self.core.state.lock().await.timeline.messages().to_vec()
    }

    pub async fn texts(&self) -> Vec<String> {
        self.core.state.lock().await.timeline.texts()
    }

    pub async fn session(&self) -> ChatSession {
        self.core.state.lock().await.session.clone()
    }

    pub async fn status(&self) -> SessionStatus {
        self.core.state.lock().await.session.status
    }

    pub async fn is_other_typing(&self) -> bool {
        self.core.state.lock().await.other_typing.is_active()
    }

    pub async fn typist(&self) -> Option<String> {
        self.core
            .state
            .lock()
            .await
            .other_typing
            .typist()
            .map(str::to_string)
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.core.state.lock().await.connection
    }

    /// Retryable user-visible notice left by the last failed send
    pub async fn notice(&self) -> Option<String> {
        self.core.state.lock().await.notice.clone()
    }

    pub async fn dismiss_notice(&self) {
        self.core.state.lock().await.notice = None;
        self.core.bump();
    }

    /// Sends still waiting for the store
    pub async fn pending_sends(&self) -> usize {
        self.core
            .state
            .lock()
            .await
            .outbound
            .values()
            .filter(|o| o.state() == OutboundState::Pending)
            .count()
    }

    /// Optimistically zero the local side's unread count, then take the
    /// store's value
    pub async fn mark_read(&self) -> ChatResult<ChatSession> {
        let audience = self.core.local_type;
        self.core
            .state
            .lock()
            .await
            .session
            .unread_count
            .reset_for(audience);
        self.core.bump();

        match self.core.store.mark_read(&self.core.chat_id, audience).await {
            Ok(session) => {
                self.apply_session(session.clone()).await;
                Ok(session)
            }
            Err(e) => {
                tracing::warn!(chat_id = %self.core.chat_id, error = %e, "Mark read failed");
                self.core.refetch().await;
                Err(e)
            }
        }
    }

    pub async fn refresh(&self) {
        self.core.refetch().await;
    }

    pub(crate) async fn apply_session(&self, session: ChatSession) {
        self.core.state.lock().await.apply_session(session);
        self.core.bump();
    }
}

// =============================================================================
// Adapters
// =============================================================================

/// Customer widget side of a conversation
pub struct CustomerChat {
    engine: MessageSyncEngine,
}

impl CustomerChat {
    /// Start (or resume) the customer's session and open it
    pub async fn start(
        manager: &ChatSessionManager,
        identity: CustomerIdentity,
        channel: ChannelHandle,
        config: &ClientConfig,
    ) -> ChatResult<Self> {
        let sender_id = match &identity {
            CustomerIdentity::Authenticated(user) => user.id.clone(),
            CustomerIdentity::Anonymous | CustomerIdentity::Guest(_) => {
                format!("visitor:{}", manager.visitor_id())
            }
        };
        let session = manager.start(identity).await?;
        let local = Participant::customer(sender_id, session.customer.name.clone());
        let engine =
            MessageSyncEngine::open(session.chat_id, local, manager.store(), channel, config)
                .await?;
        Ok(Self { engine })
    }

    pub fn engine(&self) -> &MessageSyncEngine {
        &self.engine
    }

    pub async fn send_text(&self, text: impl Into<String>) -> ChatResult<Message> {
        self.engine.send_text(text).await
    }

    pub async fn texts(&self) -> Vec<String> {
        self.engine.texts().await
    }

    /// Anonymous to named guest. History stays with the same chat.
    pub async fn upgrade_identity(
        &self,
        manager: &ChatSessionManager,
        guest: &GuestDetails,
    ) -> ChatResult<ChatSession> {
        let session = manager.upgrade_identity(self.engine.chat_id(), guest).await?;
        self.engine.apply_session(session.clone()).await;
        Ok(session)
    }
}

/// Admin console side of a conversation
pub struct AdminChat {
    engine: MessageSyncEngine,
    admin: AssignedAdmin,
}

impl AdminChat {
    pub async fn open(
        manager: &ChatSessionManager,
        chat_id: ChatId,
        admin: Participant,
        channel: ChannelHandle,
        config: &ClientConfig,
    ) -> ChatResult<Self> {
        let assigned = AssignedAdmin::new(admin.id.as_str(), admin.name.as_str());
        let engine = MessageSyncEngine::open(chat_id, admin, manager.store(), channel, config).await?;
        Ok(Self {
            engine,
            admin: assigned,
        })
    }

    pub fn engine(&self) -> &MessageSyncEngine {
        &self.engine
    }

    pub async fn send_text(&self, text: impl Into<String>) -> ChatResult<Message> {
        self.engine.send_text(text).await
    }

    pub async fn texts(&self) -> Vec<String> {
        self.engine.texts().await
    }

    /// Take the conversation. A lost race refreshes the row and surfaces
    /// `AlreadyAssigned`; it is never retried.
    pub async fn assign(&self, manager: &ChatSessionManager) -> ChatResult<ChatSession> {
        match manager.assign(self.engine.chat_id(), &self.admin).await {
            Ok(session) => {
                self.engine.apply_session(session.clone()).await;
                Ok(session)
            }
            Err(e) => {
                self.engine.refresh().await;
                Err(e)
            }
        }
    }

    pub async fn close(&self, manager: &ChatSessionManager) -> ChatResult<ChatSession> {
        let session = manager.close(self.engine.chat_id()).await?;
        self.engine.apply_session(session.clone()).await;
        Ok(session)
    }
}

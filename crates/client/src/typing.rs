//! Presence/typing signals
//!
//! [`TypingSignaler`] coalesces keystrokes into one `typing` announcement per
//! burst and sends `stop_typing` after a period of inactivity.
//! [`TypingIndicator`] is the receiving side's "other party is typing" flag.

use chatdesk_shared::{ChatId, ChatResult, ClientEvent, TypingSignal};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::channel::ChannelHandle;

#[derive(Default)]
struct SignalerState {
    active: bool,
    /// Bumped on every keystroke so a superseded timer does nothing
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct TypingSignaler {
    chat_id: ChatId,
    sender_name: String,
    channel: ChannelHandle,
    timeout: Duration,
    state: Arc<Mutex<SignalerState>>,
}

impl TypingSignaler {
    pub fn new(
        chat_id: ChatId,
        sender_name: impl Into<String>,
        channel: ChannelHandle,
        timeout: Duration,
    ) -> Self {
        Self {
            chat_id,
            sender_name: sender_name.into(),
            channel,
            timeout,
            state: Arc::new(Mutex::new(SignalerState::default())),
        }
    }

    /// Called per keystroke. Announces only when no announcement is active,
    /// and restarts the inactivity timer.
    pub async fn notify_typing(&self) -> ChatResult<()> {
        let mut state = self.state.lock().await;
        if !state.active {
            self.channel
                .emit(ClientEvent::Typing {
                    chat_id: self.chat_id.clone(),
                    sender_name: self.sender_name.clone(),
                })
                .await?;
            state.active = true;
        }

        state.generation += 1;
        let generation = state.generation;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        let signaler = self.clone();
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(signaler.timeout).await;
            signaler.expire(generation).await;
        }));
        Ok(())
    }

    /// End the announcement now, e.g. because the message was sent
    pub async fn notify_stop_typing(&self) -> ChatResult<()> {
        let mut state = self.state.lock().await;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        self.stop_locked(&mut state).await
    }

    pub async fn is_active(&self) -> bool {
        self.state.lock().await.active
    }

    async fn expire(&self, generation: u64) {
        let mut state = self.state.lock().await;
        if state.generation != generation {
            return;
        }
        state.timer = None;
        if let Err(e) = self.stop_locked(&mut state).await {
            tracing::debug!(chat_id = %self.chat_id, error = %e, "Could not send stop_typing");
        }
    }

    async fn stop_locked(&self, state: &mut SignalerState) -> ChatResult<()> {
        if !state.active {
            return Ok(());
        }
        state.active = false;
        self.channel
            .emit(ClientEvent::StopTyping {
                chat_id: self.chat_id.clone(),
            })
            .await
    }
}

/// Receiver side. Expires on its own after `stale_after` in case the
/// `stop_typing` event was lost.
#[derive(Debug, Clone)]
pub struct TypingIndicator {
    stale_after: Duration,
    current: Option<(String, Instant)>,
}

impl TypingIndicator {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            stale_after,
            current: None,
        }
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    pub fn on_typing(&mut self, signal: &TypingSignal) {
        self.current = Some((signal.sender_name.clone(), Instant::now()));
    }

    /// `stop_typing` received, or a real message from that side arrived
    pub fn clear(&mut self) {
        self.current = None;
    }

    pub fn is_active(&self) -> bool {
        self.typist().is_some()
    }

    /// Name of whoever is typing, if the signal is still fresh
    pub fn typist(&self) -> Option<&str> {
        match &self.current {
            Some((name, since)) if since.elapsed() < self.stale_after => Some(name.as_str()),
            _ => None,
        }
    }
}

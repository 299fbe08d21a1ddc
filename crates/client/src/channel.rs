//! Explicitly owned realtime channel handle
//!
//! A `ChannelHandle` wraps one [`ChannelTransport`] and is passed to whoever
//! needs the realtime channel. Clones share the connection; when the last
//! clone drops, the connection is torn down.
//!
//! The handle tracks joined rooms. When the transport's receiver closes
//! without a local close, it reconnects with backoff, re-joins every room and
//! announces [`ChannelUpdate::Reconnected`] so consumers re-fetch history.

use chatdesk_shared::{
    ChannelTransport, ChatError, ChatResult, ClientEvent, EventReceiver, RoomId, ServerEvent,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_retry::strategy::{jitter, ExponentialBackoff};

use crate::config::ClientConfig;

/// Buffered updates per subscriber before it starts lagging
const UPDATE_BUFFER: usize = 256;

const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(10);

/// What subscribers of a channel see
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelUpdate {
    Event(ServerEvent),
    /// The connection dropped; reconnect attempts are under way
    Reconnecting,
    /// Reconnected and re-joined all rooms. Anything pushed meanwhile was lost.
    Reconnected,
    /// Closed locally or reconnect attempts exhausted
    Closed,
}

#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub attempts: usize,
    pub base_delay: Duration,
}

impl From<&ClientConfig> for ReconnectPolicy {
    fn from(config: &ClientConfig) -> Self {
        Self {
            attempts: config.reconnect_attempts,
            base_delay: config.reconnect_base_delay,
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

struct Shared {
    transport: Arc<dyn ChannelTransport>,
    rooms: Mutex<HashSet<RoomId>>,
    updates: broadcast::Sender<ChannelUpdate>,
    closing: AtomicBool,
}

impl Shared {
    fn rooms(&self) -> Vec<RoomId> {
        self.rooms
            .lock()
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn publish(&self, update: ChannelUpdate) {
        // No subscribers is fine
        let _ = self.updates.send(update);
    }
}

struct ChannelInner {
    shared: Arc<Shared>,
    pump: JoinHandle<()>,
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        self.shared.closing.store(true, Ordering::SeqCst);
        self.pump.abort();
        self.shared.transport.disconnect();
        tracing::debug!("Realtime channel released");
    }
}

#[derive(Clone)]
pub struct ChannelHandle {
    inner: Arc<ChannelInner>,
}

impl ChannelHandle {
    /// Connect and start delivering updates
    pub async fn open(
        transport: Arc<dyn ChannelTransport>,
        policy: ReconnectPolicy,
    ) -> ChatResult<Self> {
        let receiver = transport.connect().await?;
        let (updates, _) = broadcast::channel(UPDATE_BUFFER);

        let shared = Arc::new(Shared {
            transport,
            rooms: Mutex::new(HashSet::new()),
            updates,
            closing: AtomicBool::new(false),
        });
        let pump = tokio::spawn(pump(Arc::clone(&shared), receiver, policy));

        Ok(Self {
            inner: Arc::new(ChannelInner { shared, pump }),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelUpdate> {
        self.inner.shared.updates.subscribe()
    }

    /// Join a room and remember it for re-joins. Idempotent.
    pub async fn join(&self, room: RoomId) -> ChatResult<()> {
        if let Ok(mut rooms) = self.inner.shared.rooms.lock() {
            rooms.insert(room.clone());
        }
        self.inner.shared.transport.join_room(&room).await
    }

    pub async fn leave(&self, room: &RoomId) -> ChatResult<()> {
        if let Ok(mut rooms) = self.inner.shared.rooms.lock() {
            rooms.remove(room);
        }
        self.inner
            .shared
            .transport
            .emit(ClientEvent::LeaveRoom { room: room.clone() })
            .await
    }

    pub async fn emit(&self, event: ClientEvent) -> ChatResult<()> {
        if self.is_closed() {
            return Err(ChatError::ChannelDisconnected);
        }
        self.inner.shared.transport.emit(event).await
    }

    pub fn rooms(&self) -> Vec<RoomId> {
        self.inner.shared.rooms()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shared.closing.load(Ordering::SeqCst)
    }

    /// Close for every clone. No reconnect follows.
    pub fn close(&self) {
        self.inner.shared.closing.store(true, Ordering::SeqCst);
        self.inner.shared.transport.disconnect();
    }
}

async fn pump(shared: Arc<Shared>, mut receiver: EventReceiver, policy: ReconnectPolicy) {
    loop {
        while let Some(event) = receiver.recv().await {
            shared.publish(ChannelUpdate::Event(event));
        }

        if shared.closing.load(Ordering::SeqCst) {
            break;
        }

        tracing::warn!("Realtime connection lost, reconnecting");
        shared.publish(ChannelUpdate::Reconnecting);

        match reconnect(&shared, policy).await {
            Some(next) => {
                receiver = next;
                shared.publish(ChannelUpdate::Reconnected);
            }
            None => break,
        }
    }

    shared.publish(ChannelUpdate::Closed);
}

async fn reconnect(shared: &Shared, policy: ReconnectPolicy) -> Option<EventReceiver> {
    let delays = ExponentialBackoff::from_millis(policy.base_delay.as_millis().max(1) as u64)
        .max_delay(RECONNECT_MAX_DELAY)
        .map(jitter)
        .take(policy.attempts);

    for (attempt, delay) in delays.enumerate() {
        tokio::time::sleep(delay).await;
        if shared.closing.load(Ordering::SeqCst) {
            return None;
        }

        let receiver = match shared.transport.connect().await {
            Ok(receiver) => receiver,
            Err(e) => {
                tracing::debug!(attempt = attempt + 1, error = %e, "Reconnect attempt failed");
                continue;
            }
        };

        let rooms = shared.rooms();
        let mut rejoined = true;
        for room in &rooms {
            if let Err(e) = shared.transport.join_room(room).await {
                tracing::debug!(room = %room, error = %e, "Re-join failed");
                rejoined = false;
                break;
            }
        }
        if rejoined {
            tracing::info!(attempt = attempt + 1, rooms = rooms.len(), "Realtime connection restored");
            return Some(receiver);
        }
    }

    tracing::error!(attempts = policy.attempts, "Giving up on realtime reconnect");
    None
}

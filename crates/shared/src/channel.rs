//! Realtime Channel transport contract
//!
//! A transport is one physical connection for one participant. Inbound events
//! arrive on the receiver returned by [`ChannelTransport::connect`]; the
//! receiver yielding `None` means the connection dropped. Delivery is
//! best-effort and at-most-once: anything in flight when the connection drops
//! is lost.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ChatResult;
use crate::events::{ClientEvent, RoomId, ServerEvent};

pub type EventReceiver = mpsc::UnboundedReceiver<ServerEvent>;

#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Open a fresh connection, replacing any previous one
    async fn connect(&self) -> ChatResult<EventReceiver>;

    /// Send an event over the current connection.
    /// Fails with `ChannelDisconnected` when there is none.
    async fn emit(&self, event: ClientEvent) -> ChatResult<()>;

    async fn join_room(&self, room: &RoomId) -> ChatResult<()> {
        self.emit(ClientEvent::JoinRoom { room: room.clone() }).await
    }

    /// Tear down the current connection. Safe to call when already closed.
    fn disconnect(&self);
}

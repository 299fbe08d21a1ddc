//! In-process realtime transport
//!
//! Connects a participant to the hub without a socket: events go straight
//! through [`handle_client_event`] and inbound events arrive on the
//! connection's outbox. Used by embedded deployments and the scenario tests.

use async_trait::async_trait;
use chatdesk_shared::{
    ChannelTransport, ChatError, ChatResult, ClientEvent, EventReceiver, Participant,
    ServerEvent, SessionStore,
};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::connection::Connection;
use super::dispatch::handle_client_event;
use super::state::WebSocketState;

pub struct LocalTransport {
    participant: Participant,
    ws_state: WebSocketState,
    store: Arc<dyn SessionStore>,
    current: Mutex<Option<Arc<Connection>>>,
}

impl LocalTransport {
    pub fn new(
        participant: Participant,
        ws_state: WebSocketState,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            participant,
            ws_state,
            store,
            current: Mutex::new(None),
        }
    }

    fn current(&self) -> Option<Arc<Connection>> {
        self.current.lock().ok().and_then(|guard| guard.clone())
    }

    fn take_current(&self) -> Option<Arc<Connection>> {
        self.current.lock().ok().and_then(|mut guard| guard.take())
    }

    /// Drop the connection on the server side, as a network failure would.
    /// The receiver returned by `connect` yields `None` afterwards.
    pub async fn sever(&self) {
        if let Some(conn) = self.take_current() {
            self.ws_state.remove_connection(&conn.connection_id).await;
            tracing::debug!(connection_id = %conn.connection_id, "Local connection severed");
        }
    }
}

#[async_trait]
impl ChannelTransport for LocalTransport {
    async fn connect(&self) -> ChatResult<EventReceiver> {
        self.sever().await;

        let (tx, rx) = mpsc::unbounded_channel();
        let conn = self
            .ws_state
            .add_connection(Connection::new(self.participant.clone(), tx))
            .await;
        conn.send(ServerEvent::Connected {
            connection_id: conn.connection_id,
            role: self.participant.role,
        })
        .map_err(|_| ChatError::ChannelDisconnected)?;

        let mut current = self
            .current
            .lock()
            .map_err(|_| ChatError::Internal("transport state poisoned".into()))?;
        *current = Some(conn);
        Ok(rx)
    }

    async fn emit(&self, event: ClientEvent) -> ChatResult<()> {
        let conn = self.current().ok_or(ChatError::ChannelDisconnected)?;
        if self.ws_state.get_connection(&conn.connection_id).await.is_none() {
            return Err(ChatError::ChannelDisconnected);
        }
        handle_client_event(event, &conn, &self.ws_state, self.store.as_ref()).await;
        Ok(())
    }

    fn disconnect(&self) {
        let Some(conn) = self.take_current() else {
            return;
        };
        let ws_state = self.ws_state.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    ws_state.remove_connection(&conn.connection_id).await;
                });
            }
            Err(_) => {
                tracing::warn!(
                    connection_id = %conn.connection_id,
                    "No runtime to release local connection"
                );
            }
        }
    }
}

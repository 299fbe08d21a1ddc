//! Realtime transport over the server's WebSocket endpoint

use async_trait::async_trait;
use chatdesk_shared::{
    ChannelTransport, ChatError, ChatResult, ClientEvent, EventReceiver, ServerEvent,
};
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

/// How the connection identifies itself to the server
#[derive(Debug, Clone)]
pub enum WsIdentity {
    /// Admins and signed-in customers
    Token(String),
    /// Anonymous customer of one browsing context
    Visitor { name: String, visitor_id: String },
}

struct Connection {
    outbound: mpsc::UnboundedSender<WsMessage>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Connection {
    fn shutdown(self) {
        let _ = self.outbound.send(WsMessage::Close(None));
        self.reader.abort();
        self.writer.abort();
    }
}

pub struct WsTransport {
    url: String,
    identity: WsIdentity,
    current: Mutex<Option<Connection>>,
}

impl WsTransport {
    pub fn new(ws_url: impl Into<String>, identity: WsIdentity) -> Self {
        Self {
            url: ws_url.into(),
            identity,
            current: Mutex::new(None),
        }
    }

    fn endpoint(&self) -> ChatResult<Url> {
        let params: Vec<(&str, &str)> = match &self.identity {
            WsIdentity::Token(token) => vec![("token", token.as_str())],
            WsIdentity::Visitor { name, visitor_id } => {
                vec![("name", name.as_str()), ("visitor_id", visitor_id.as_str())]
            }
        };
        Url::parse_with_params(&self.url, params)
            .map_err(|e| ChatError::Internal(format!("invalid WebSocket URL: {e}")))
    }

    fn replace(&self, next: Option<Connection>) {
        let previous = match self.current.lock() {
            Ok(mut current) => std::mem::replace(&mut *current, next),
            Err(_) => None,
        };
        if let Some(previous) = previous {
            previous.shutdown();
        }
    }
}

#[async_trait]
impl ChannelTransport for WsTransport {
    async fn connect(&self) -> ChatResult<EventReceiver> {
        self.replace(None);

        let url = self.endpoint()?;
        let (socket, _) = connect_async(url.as_str()).await.map_err(|e| {
            tracing::warn!(error = %e, "WebSocket connect failed");
            ChatError::ChannelDisconnected
        })?;
        let (mut sink, mut stream) = socket.split();

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<ServerEvent>();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<WsMessage>();

        let writer = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let closing = matches!(frame, WsMessage::Close(_));
                if sink.send(frame).await.is_err() || closing {
                    break;
                }
            }
        });

        let pong_tx = outbound_tx.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            if inbound_tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "Ignoring malformed server event"),
                    },
                    Ok(WsMessage::Ping(data)) => {
                        let _ = pong_tx.send(WsMessage::Pong(data));
                    }
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(error = %e, "WebSocket read error");
                        break;
                    }
                }
            }
            // Dropping inbound_tx closes the receiver, which signals the disconnect
        });

        self.replace(Some(Connection {
            outbound: outbound_tx,
            reader,
            writer,
        }));
        tracing::debug!(url = %self.url, "WebSocket connected");
        Ok(inbound_rx)
    }

    async fn emit(&self, event: ClientEvent) -> ChatResult<()> {
        let payload = serde_json::to_string(&event)
            .map_err(|e| ChatError::Internal(format!("failed to encode event: {e}")))?;

        let current = self
            .current
            .lock()
            .map_err(|_| ChatError::Internal("transport state poisoned".into()))?;
        let connection = current.as_ref().ok_or(ChatError::ChannelDisconnected)?;
        if connection.writer.is_finished() {
            return Err(ChatError::ChannelDisconnected);
        }
        connection
            .outbound
            .send(WsMessage::Text(payload))
            .map_err(|_| ChatError::ChannelDisconnected)
    }

    fn disconnect(&self) {
        self.replace(None);
    }
}

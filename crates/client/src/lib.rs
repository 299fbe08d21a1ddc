//! chatdesk client core
//!
//! Everything the customer widget and the admin console share: session
//! resolution, the optimistic message sync engine, typing signals, the
//! dashboard feed, and the REST and WebSocket adapters that connect them to
//! a chat server.

pub mod channel;
pub mod config;
pub mod dashboard;
pub mod manager;
pub mod outbound;
pub mod rest;
pub mod sync;
pub mod timeline;
pub mod typing;
pub mod ws;

pub use channel::{ChannelHandle, ChannelUpdate, ReconnectPolicy};
pub use config::ClientConfig;
pub use dashboard::{Dashboard, DashboardModel};
pub use manager::{ChatSessionManager, IdentityProvider, StaticIdentity};
pub use outbound::{Draft, OutboundState};
pub use rest::RestSessionStore;
pub use sync::{AdminChat, ConnectionState, CustomerChat, MessageSyncEngine};
pub use typing::{TypingIndicator, TypingSignaler};
pub use ws::{WsIdentity, WsTransport};

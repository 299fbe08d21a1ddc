//! chatdesk shared types and contracts
//!
//! Data model, session lifecycle rules, error taxonomy, realtime wire events
//! and the Session Store / Realtime Channel contracts shared by the server
//! and the client core.

pub mod channel;
pub mod db;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod memory;
pub mod store;
pub mod types;

pub use channel::{ChannelTransport, EventReceiver};
pub use error::{ChatError, ChatResult};
pub use events::{ClientEvent, RoomId, ServerEvent};
pub use memory::MemorySessionStore;
pub use store::{
    AttachmentUpload, NewMessage, SessionFilter, SessionPatch, SessionStore, StartSession,
    StartedSession,
};
pub use types::*;

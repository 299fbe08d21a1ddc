//! Realtime hub
//!
//! - **Connection**: one participant's physical connection and its rooms
//! - **Room**: conversation rooms plus the admin dashboard room
//! - **State**: connection registry shared by every transport
//! - **Dispatch**: client event handling (join, typing relay, ping)
//! - **Handler**: Axum WebSocket route
//! - **Local**: in-process transport over the same hub

pub mod connection;
pub mod dispatch;
pub mod handler;
pub mod local;
pub mod room;
pub mod state;

pub use connection::Connection;
pub use handler::ws_handler;
pub use local::LocalTransport;
pub use state::WebSocketState;

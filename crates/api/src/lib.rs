//! chatdesk API library
//!
//! Chat server components: configuration, identity verification, the
//! PostgreSQL Session Store, the chat service with realtime fan-out, REST
//! routes and the realtime hub.

pub mod auth;
pub mod config;
pub mod error;
pub mod notifier;
pub mod routes;
pub mod service;
pub mod state;
pub mod store;
pub mod websocket;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use service::ChatService;
pub use state::AppState;
pub use websocket::{LocalTransport, WebSocketState};

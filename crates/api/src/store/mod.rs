//! Server-side Session Store backends

pub mod pg;

pub use pg::{AttachmentBlob, PgSessionStore, ATTACHMENT_ROUTE_PREFIX};

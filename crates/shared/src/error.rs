//! Error types for the chat core

use thiserror::Error;

use crate::types::{AdminId, ChatId, SessionStatus};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("Chat session not found: {0}")]
    NotFound(ChatId),

    #[error("Chat session {chat_id} is already assigned to {holder}")]
    AlreadyAssigned { chat_id: ChatId, holder: AdminId },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Delivery failed: {0}")]
    TransientDeliveryFailure(String),

    #[error("Realtime channel disconnected")]
    ChannelDisconnected,

    #[error("Invalid session transition from {from} to {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("Chat session {0} is closed")]
    SessionClosed(ChatId),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChatError {
    /// Stable machine-readable code, shared by the HTTP and WebSocket surfaces
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlreadyAssigned { .. } => "ALREADY_ASSIGNED",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::TransientDeliveryFailure(_) => "SERVICE_UNAVAILABLE",
            Self::ChannelDisconnected => "CHANNEL_DISCONNECTED",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::SessionClosed(_) => "SESSION_CLOSED",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Transient failures may succeed when the user retries.
    /// They are never retried automatically for writes.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TransientDeliveryFailure(_) | Self::ChannelDisconnected
        )
    }
}

pub type ChatResult<T> = Result<T, ChatError>;

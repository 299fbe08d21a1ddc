//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chatdesk_shared::{ChatError, SessionStatus};
use serde_json::{json, Value};

use crate::auth::JwtError;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Authentication errors
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Authentication required")]
    Unauthorized,
    #[error("Not allowed: {0}")]
    NotAllowed(String),
    #[error("Insufficient permissions")]
    Forbidden,

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    // Resource errors
    #[error("Resource not found")]
    NotFound,
    #[error("Chat session is already assigned to {0}")]
    AlreadyAssigned(String),
    #[error("Invalid session transition from {from} to {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },
    #[error("Chat session is closed")]
    SessionClosed,

    // Internal errors
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal server error")]
    Internal,
    #[error("Service unavailable")]
    ServiceUnavailable,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // Authentication
            ApiError::InvalidToken => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),
            ApiError::NotAllowed(msg) => (StatusCode::FORBIDDEN, "UNAUTHORIZED", msg.clone()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN", self.to_string()),

            // Validation
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, "VALIDATION_ERROR", msg.clone()),

            // Resources
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            ApiError::AlreadyAssigned(_) => (StatusCode::CONFLICT, "ALREADY_ASSIGNED", self.to_string()),
            ApiError::InvalidTransition { .. } => (StatusCode::CONFLICT, "INVALID_TRANSITION", self.to_string()),
            ApiError::SessionClosed => (StatusCode::CONFLICT, "SESSION_CLOSED", self.to_string()),

            // Internal
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR", "Database error".to_string()),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", self.to_string()),
            ApiError::ServiceUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", self.to_string()),
        };

        let mut error = json!({
            "code": code,
            "message": message,
        });
        if let Some(details) = self.details() {
            error["details"] = details;
        }
        let body = Json(json!({ "error": error }));

        (status, body).into_response()
    }
}

impl ApiError {
    /// Machine-readable context that lets clients rebuild the original `ChatError`
    fn details(&self) -> Option<Value> {
        match self {
            ApiError::AlreadyAssigned(holder) => Some(json!({ "holder": holder })),
            ApiError::InvalidTransition { from, to } => Some(json!({ "from": from, "to": to })),
            _ => None,
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::NotFound(_) => ApiError::NotFound,
            ChatError::AlreadyAssigned { holder, .. } => ApiError::AlreadyAssigned(holder.0),
            ChatError::Unauthorized(msg) => ApiError::NotAllowed(msg),
            ChatError::InvalidTransition { from, to } => ApiError::InvalidTransition { from, to },
            ChatError::SessionClosed(_) => ApiError::SessionClosed,
            ChatError::Validation(msg) => ApiError::Validation(msg),
            ChatError::TransientDeliveryFailure(_) | ChatError::ChannelDisconnected => {
                ApiError::ServiceUnavailable
            }
            ChatError::Internal(msg) => {
                tracing::error!(error = %msg, "Chat core internal error");
                ApiError::Internal
            }
        }
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        tracing::debug!(error = %err, "Rejected bearer token");
        ApiError::InvalidToken
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound,
            _ => ApiError::Database(err.to_string()),
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chatdesk_shared::{AdminId, ChatId};

    #[test]
    fn test_chat_errors_map_to_status_codes() {
        let cases = [
            (ChatError::NotFound(ChatId::from("chat_x")), StatusCode::NOT_FOUND),
            (
                ChatError::AlreadyAssigned {
                    chat_id: ChatId::from("chat_x"),
                    holder: AdminId::from("A1"),
                },
                StatusCode::CONFLICT,
            ),
            (ChatError::Unauthorized("nope".into()), StatusCode::FORBIDDEN),
            (
                ChatError::InvalidTransition {
                    from: SessionStatus::Waiting,
                    to: SessionStatus::Closed,
                },
                StatusCode::CONFLICT,
            ),
            (ChatError::Validation("empty".into()), StatusCode::BAD_REQUEST),
            (
                ChatError::TransientDeliveryFailure("down".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn test_conflicts_carry_details() {
        let assigned = ApiError::from(ChatError::AlreadyAssigned {
            chat_id: ChatId::from("chat_x"),
            holder: AdminId::from("A1"),
        });
        assert_eq!(assigned.details().unwrap()["holder"], "A1");

        let transition = ApiError::InvalidTransition {
            from: SessionStatus::Waiting,
            to: SessionStatus::Archived,
        };
        let details = transition.details().unwrap();
        assert_eq!(details["from"], "waiting");
        assert_eq!(details["to"], "archived");
        assert!(ApiError::NotFound.details().is_none());
    }
}

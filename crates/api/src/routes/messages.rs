//! Chat message routes

use axum::{
    body::Body,
    extract::{Extension, Path, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use chatdesk_shared::{ChatId, Message, NewMessage, SenderType, SessionStore};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

/// Messages ordered by server timestamp
pub async fn list_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> ApiResult<Json<Vec<Message>>> {
    let messages = state.chat.list_messages(&ChatId::from(chat_id)).await?;
    Ok(Json(messages))
}

/// Durable write of one message. The stored message comes back with its
/// server id and timestamp so the sender can replace its optimistic entry.
pub async fn send_message(
    State(state): State<AppState>,
    auth: Option<Extension<AuthUser>>,
    Path(chat_id): Path<String>,
    Json(req): Json<NewMessage>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let auth = auth.map(|Extension(user)| user);
    match req.sender_type {
        SenderType::Admin => {
            let admin = auth.ok_or(ApiError::Unauthorized)?;
            admin.require_admin()?;
            if admin.claims.sub != req.sender_id {
                return Err(ApiError::Forbidden);
            }
        }
        SenderType::User => {
            if let Some(user) = &auth {
                if user.is_admin() || user.claims.sub != req.sender_id {
                    return Err(ApiError::Forbidden);
                }
            }
        }
    }

    if let Some(attachment) = &req.attachment {
        let limit = state.config.max_attachment_bytes;
        if attachment.data.len() > limit {
            return Err(ApiError::PayloadTooLarge(format!(
                "attachment exceeds {limit} bytes"
            )));
        }
    }

    let chat_id = ChatId::from(chat_id);
    let message = state.chat.send_message(&chat_id, &req).await?;

    tracing::info!(
        chat_id = %chat_id,
        message_id = %message.id,
        sender_type = %message.sender_type,
        "Chat message sent"
    );

    Ok((StatusCode::CREATED, Json(message)))
}

/// Download a stored attachment body
pub async fn get_attachment(
    State(state): State<AppState>,
    Path(attachment_id): Path<Uuid>,
) -> ApiResult<Response> {
    let store = state.pg_store.as_ref().ok_or(ApiError::NotFound)?;
    let blob = store
        .fetch_attachment(attachment_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        blob.filename.replace('"', "")
    );
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from(blob.data))
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to build attachment response");
            ApiError::Internal
        })
}

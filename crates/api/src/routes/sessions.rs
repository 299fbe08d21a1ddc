//! Chat session routes
//!
//! Start, look up, upgrade and move sessions through their lifecycle.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use chatdesk_shared::{
    AssignedAdmin, ChatId, ChatSession, Customer, CustomerIdentity, GuestDetails, SenderType,
    SessionFilter, SessionPatch, SessionStatus, SessionStore, StartSession, StartedSession,
};
use serde::Deserialize;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    /// Comma-separated statuses, e.g. `waiting,active`
    pub status: Option<String>,
    pub assigned_to: Option<String>,
    pub limit: Option<u32>,
}

impl ListSessionsQuery {
    fn into_filter(self) -> ApiResult<SessionFilter> {
        let statuses = match self.status.as_deref() {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<SessionStatus>().map_err(ApiError::BadRequest))
                .collect::<ApiResult<Vec<_>>>()?,
            None => Vec::new(),
        };
        Ok(SessionFilter {
            statuses,
            assigned_to: self.assigned_to.map(Into::into),
            limit: self.limit,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    pub audience: SenderType,
}

// =============================================================================
// Helpers
// =============================================================================

pub(crate) fn admin_caller(auth: Option<Extension<AuthUser>>) -> ApiResult<AuthUser> {
    let Extension(user) = auth.ok_or(ApiError::Unauthorized)?;
    user.require_admin()?;
    Ok(user)
}

/// Resolve the identity to start a chat for. A signed-in customer is always
/// started as authenticated, whatever the body claims.
fn resolve_identity(auth: Option<&AuthUser>, requested: &CustomerIdentity) -> ApiResult<CustomerIdentity> {
    match auth {
        Some(user) if user.is_admin() => Err(ApiError::Forbidden),
        Some(user) => {
            let authenticated = user
                .claims
                .authenticated_user()
                .ok_or(ApiError::Forbidden)?;
            if let CustomerIdentity::Authenticated(claimed) = requested {
                if claimed.id != authenticated.id {
                    return Err(ApiError::Forbidden);
                }
            }
            Ok(CustomerIdentity::Authenticated(authenticated))
        }
        None => match requested {
            CustomerIdentity::Authenticated(_) => Err(ApiError::Unauthorized),
            other => Ok(other.clone()),
        },
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Return the caller's open session or create a waiting one
pub async fn start_session(
    State(state): State<AppState>,
    auth: Option<Extension<AuthUser>>,
    Json(req): Json<StartSession>,
) -> ApiResult<(StatusCode, Json<StartedSession>)> {
    if req.visitor_id.trim().is_empty() {
        return Err(ApiError::Validation("visitor_id is required".into()));
    }

    let identity = resolve_identity(auth.as_ref().map(|Extension(u)| u), &req.identity)?;
    let started = state
        .chat
        .create_or_get_session(&StartSession {
            identity,
            visitor_id: req.visitor_id,
        })
        .await?;

    let status = if started.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(started)))
}

/// List sessions for the admin console (admin only)
pub async fn list_sessions(
    State(state): State<AppState>,
    auth: Option<Extension<AuthUser>>,
    Query(query): Query<ListSessionsQuery>,
) -> ApiResult<Json<Vec<ChatSession>>> {
    admin_caller(auth)?;
    let filter = query.into_filter()?;
    let sessions = state.chat.list_sessions(&filter).await?;
    Ok(Json(sessions))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> ApiResult<Json<ChatSession>> {
    let session = state.chat.get_session(&ChatId::from(chat_id)).await?;
    Ok(Json(session))
}

/// Generic patch. Status and assignment changes are admin-only; a bare
/// customer profile change is open to the session's customer.
pub async fn update_session(
    State(state): State<AppState>,
    auth: Option<Extension<AuthUser>>,
    Path(chat_id): Path<String>,
    Json(patch): Json<SessionPatch>,
) -> ApiResult<Json<ChatSession>> {
    let chat_id = ChatId::from(chat_id);
    if patch.status.is_some() || patch.assigned_admin.is_some() {
        let admin = admin_caller(auth)?;
        if let Some(assigned) = &patch.assigned_admin {
            if assigned.id != admin.admin_id() {
                return Err(ApiError::Forbidden);
            }
        }
        if patch.status == Some(SessionStatus::Closed) {
            state
                .chat
                .get_session(&chat_id)
                .await?
                .authorize_admin(&admin.admin_id())?;
        }
    }

    let session = state.chat.update_session(&chat_id, &patch).await?;
    Ok(Json(session))
}

/// Turn an anonymous customer into a named guest, keeping history
pub async fn upgrade_identity(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(guest): Json<GuestDetails>,
) -> ApiResult<Json<ChatSession>> {
    guest.validate().map_err(ApiError::Validation)?;
    let patch = SessionPatch {
        customer: Some(Customer::from_guest(&guest)),
        ..Default::default()
    };
    let session = state
        .chat
        .update_session(&ChatId::from(chat_id), &patch)
        .await?;
    tracing::info!(chat_id = %session.chat_id, "Customer identity upgraded to named guest");
    Ok(Json(session))
}

/// First assignment wins; the loser gets 409 ALREADY_ASSIGNED
pub async fn assign_session(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(chat_id): Path<String>,
    body: Option<Json<AssignedAdmin>>,
) -> ApiResult<Json<ChatSession>> {
    if let Some(Json(requested)) = body {
        if requested.id != auth_user.admin_id() {
            return Err(ApiError::Forbidden);
        }
    }

    let session = state
        .chat
        .assign_session(&ChatId::from(chat_id), &auth_user.as_assigned_admin())
        .await?;
    Ok(Json(session))
}

/// Close an active session. Only the holder may close it; closing twice is a no-op.
pub async fn close_session(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(chat_id): Path<String>,
) -> ApiResult<Json<ChatSession>> {
    let chat_id = ChatId::from(chat_id);
    let current = state.chat.get_session(&chat_id).await?;
    current.authorize_admin(&auth_user.admin_id())?;
    if current.status == SessionStatus::Closed {
        return Ok(Json(current));
    }

    let session = state
        .chat
        .update_session(&chat_id, &SessionPatch::close())
        .await?;
    Ok(Json(session))
}

pub async fn archive_session(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(chat_id): Path<String>,
) -> ApiResult<Json<ChatSession>> {
    let session = state
        .chat
        .update_session(&ChatId::from(chat_id), &SessionPatch::archive())
        .await?;
    tracing::info!(
        chat_id = %session.chat_id,
        admin_id = %auth_user.claims.sub,
        "Chat session archived"
    );
    Ok(Json(session))
}

/// Reset one side's unread count
pub async fn mark_read(
    State(state): State<AppState>,
    auth: Option<Extension<AuthUser>>,
    Path(chat_id): Path<String>,
    Json(req): Json<MarkReadRequest>,
) -> ApiResult<Json<ChatSession>> {
    if req.audience == SenderType::Admin {
        admin_caller(auth)?;
    }
    let session = state
        .chat
        .mark_read(&ChatId::from(chat_id), req.audience)
        .await?;
    Ok(Json(session))
}

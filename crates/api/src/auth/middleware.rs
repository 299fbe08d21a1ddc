//! Bearer token middleware
//!
//! `optional_auth` lets anonymous customers through but rejects a token that
//! fails validation; a bad token never silently becomes an anonymous caller.
//! `require_admin` gates the admin console routes.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use chatdesk_shared::{AdminId, AssignedAdmin, Participant, ParticipantRole};

use super::jwt::Claims;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Authenticated caller, inserted as a request extension
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub claims: Claims,
}

impl AuthUser {
    pub fn participant(&self) -> Participant {
        self.claims.participant()
    }

    pub fn is_admin(&self) -> bool {
        self.claims.role == ParticipantRole::Admin
    }

    pub fn admin_id(&self) -> AdminId {
        AdminId::from(self.claims.sub.as_str())
    }

    pub fn as_assigned_admin(&self) -> AssignedAdmin {
        AssignedAdmin::new(self.claims.sub.as_str(), self.claims.name.as_str())
    }

    /// Admin callers only
    pub fn require_admin(&self) -> ApiResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

fn bearer_token(req: &Request) -> ApiResult<Option<&str>> {
    let Some(value) = req.headers().get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| ApiError::InvalidToken)?;
    match value.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(Some(token.trim())),
        _ => Err(ApiError::InvalidToken),
    }
}

fn authenticate(state: &AppState, req: &Request) -> ApiResult<Option<AuthUser>> {
    match bearer_token(req)? {
        Some(token) => {
            let claims = state.jwt.validate_token(token)?;
            Ok(Some(AuthUser { claims }))
        }
        None => Ok(None),
    }
}

pub async fn optional_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(user) = authenticate(&state, &req)? {
        req.extensions_mut().insert(user);
    }
    Ok(next.run(req).await)
}

pub async fn require_admin(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = authenticate(&state, &req)?.ok_or(ApiError::Unauthorized)?;
    if !user.is_admin() {
        tracing::warn!(user_id = %user.claims.sub, "Non-admin caller on admin route");
        return Err(ApiError::Forbidden);
    }
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

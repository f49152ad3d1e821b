//! Session resolution for `/api` routes. Tokens arrive either as
//! `Authorization: Bearer` or in the cookie written by `/auth/login`.

use axum::{
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, COOKIE},
        HeaderMap,
    },
    middleware::Next,
    response::Response,
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

use crate::error::AppError;
use crate::middleware::permissions::permission_granted;
use crate::models::prelude::*;
use crate::models::user;
use crate::services::accounts::get_user_permissions;
use crate::services::security::decode_token;
use crate::state::AppState;

pub const SESSION_COOKIE_NAME: &str = "backoffice_session";

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: user::Model,
    pub permissions: Vec<String>,
}

impl AuthenticatedUser {
    pub fn has_permission(&self, permission: &str) -> bool {
        permission_granted(&self.permissions, permission)
    }
}

/// Resolves the caller from a Bearer token or the session cookie and stores
/// an [`AuthenticatedUser`] in the request extensions. Rejects with 401.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(req.headers())
        .or_else(|| extract_session_token(req.headers()))
        .ok_or_else(|| AppError::Unauthorized("No session token supplied".to_string()))?;

    let caller = resolve_user(&state, &token).await?;
    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    (scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty())
        .then(|| token.trim().to_string())
}

pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(COOKIE)?.to_str().ok()?;
    raw.split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE_NAME && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

async fn resolve_user(state: &AppState, token: &str) -> Result<AuthenticatedUser, AppError> {
    let rejected = |reason: &str| AppError::Unauthorized(reason.to_string());

    let claims = decode_token(token).map_err(|_| rejected("Session expired or invalid"))?;
    let user_id: i64 = claims.sub.parse().map_err(|_| rejected("Session expired or invalid"))?;

    let user = User::find_by_id(user_id)
        .filter(user::Column::IsActive.eq(true))
        .one(&state.db)
        .await?
        .ok_or_else(|| rejected("Account is disabled or no longer exists"))?;
    let permissions = get_user_permissions(&state.db, user.id).await?;

    Ok(AuthenticatedUser { user, permissions })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("abc.def"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn test_extract_session_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; backoffice_session=tok123; other=1"),
        );
        assert_eq!(extract_session_token(&headers).as_deref(), Some("tok123"));

        headers.insert(COOKIE, HeaderValue::from_static("backoffice_session="));
        assert_eq!(extract_session_token(&headers), None);
    }
}

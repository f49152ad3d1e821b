use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::CONFIG;
use crate::error::{AppError, Result};
use crate::middleware::auth::{extract_session_token, SESSION_COOKIE_NAME};
use crate::models::audit_log::{AuditAction, ResourceType};
use crate::models::user;
use crate::services::accounts::{
    clear_failed_logins, find_user_by_email, get_user_permissions, lockout_remaining,
    record_failed_login,
};
use crate::services::audit::Actor;
use crate::services::security::{create_access_token, decode_token, verify_password};
use crate::services::settings::SecurityPolicy;
use crate::state::AppState;

pub fn auth_routes(state: AppState) -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .with_state(state)
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LoginResponse {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub permissions: Vec<String>,
}

/// `Set-Cookie` value for the session; `None` expires it
fn session_cookie(token: Option<&str>, max_age: i64, secure: bool) -> HeaderValue {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE_NAME,
        token.unwrap_or_default(),
        if token.is_some() { max_age } else { 0 },
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
}

async fn audit_rejection(state: &AppState, account: &user::Model, reason: &str) {
    state
        .audit
        .log_failure(
            AuditAction::LoginFailed,
            ResourceType::User,
            Some(account.id.to_string()),
            &Actor::from(account),
            None,
            reason,
        )
        .await;
}

/// Checks the password of an active account against the security policy, auditing every rejection
async fn check_credentials(
    state: &AppState,
    policy: &SecurityPolicy,
    email: &str,
    password: &str,
) -> Result<user::Model> {
    let rejected = || AppError::Unauthorized("Invalid credentials".to_string());

    let account = match find_user_by_email(&state.db, email).await {
        Ok(account) => account,
        Err(AppError::NotFound(_)) => {
            state
                .audit
                .log_failure(
                    AuditAction::LoginFailed,
                    ResourceType::User,
                    None,
                    &Actor::default(),
                    Some(serde_json::json!({ "email": email })),
                    "Unknown email",
                )
                .await;
            return Err(rejected());
        }
        Err(e) => return Err(e),
    };

    if !account.is_active {
        audit_rejection(state, &account, "Account disabled").await;
        return Err(rejected());
    }

    if let Some(remaining) = lockout_remaining(&account, Utc::now()) {
        audit_rejection(state, &account, "Account locked").await;
        return Err(AppError::TooManyRequests(format!(
            "Too many failed logins; try again in {} seconds",
            remaining
        )));
    }

    if !verify_password(password, &account.hashed_password) {
        let account = record_failed_login(&state.db, &account, policy.max_login_attempts).await?;
        audit_rejection(state, &account, "Invalid password").await;
        return Err(rejected());
    }

    if policy.require_email_verification && !account.is_verified() {
        audit_rejection(state, &account, "Email not verified").await;
        return Err(AppError::Unauthorized(
            "Email address has not been verified".to_string(),
        ));
    }

    clear_failed_logins(&state.db, account).await
}

/// Exchanges credentials for a bearer token plus an HttpOnly session cookie
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = LoginResponse),
        (status = 401, description = "Wrong email or password, disabled or unverified account"),
        (status = 429, description = "Account locked after too many failed logins")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Response> {
    let email = request.email.trim().to_lowercase();
    let policy = state.settings.security_policy().await?;
    let account = check_credentials(&state, &policy, &email, &request.password).await?;

    let ttl = policy.session_lifetime_secs;
    let access_token = create_access_token(&account.id.to_string(), Some(&account.email), Some(ttl))?;
    let permissions = get_user_permissions(&state.db, account.id).await?;

    state
        .audit
        .log_success(
            AuditAction::Login,
            ResourceType::User,
            Some(account.id.to_string()),
            &Actor::from(&account),
            None,
        )
        .await;
    tracing::info!(user_id = account.id, "Signed in");

    let cookie = session_cookie(Some(&access_token), ttl, CONFIG.auth.secure_cookies);
    let body = LoginResponse {
        user_id: account.id,
        name: account.name,
        email: account.email,
        access_token,
        token_type: "bearer".to_string(),
        expires_in: ttl,
        permissions,
    };
    Ok(([(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    responses((status = 200, description = "Session cookie cleared"))
)]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let claims = extract_session_token(&headers).and_then(|t| decode_token(&t).ok());
    if let Some(claims) = claims {
        let actor = Actor {
            user_id: claims.sub.parse().ok(),
            username: claims.email.clone(),
        };
        state
            .audit
            .log_success(AuditAction::Logout, ResourceType::User, Some(claims.sub), &actor, None)
            .await;
    }

    let cookie = session_cookie(None, 0, CONFIG.auth.secure_cookies);
    (
        [(header::SET_COOKIE, cookie)],
        Json(serde_json::json!({ "message": "Signed out" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_flags() {
        let cookie = session_cookie(Some("abc"), 3600, true);
        let value = cookie.to_str().unwrap();
        assert!(value.starts_with("backoffice_session=abc;"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("Max-Age=3600"));
        assert!(value.ends_with("; Secure"));
    }

    #[test]
    fn test_expired_cookie_has_no_token() {
        let value = session_cookie(None, 3600, false);
        let value = value.to_str().unwrap();
        assert!(value.starts_with("backoffice_session=;"));
        assert!(value.contains("Max-Age=0"));
        assert!(!value.contains("Secure"));
    }
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{AppError, Result};
use crate::middleware::permissions::{Authenticated, Authorized, UsersManage, UsersView};
use crate::models::audit_log::{AuditAction, ResourceType};
use crate::models::{role, user};
use crate::services::accounts::{self, NewUser, UserUpdate};
use crate::services::audit::Actor;
use crate::state::AppState;

pub fn users_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/me", get(get_current_user))
        .route(
            "/{id}",
            get(get_user).patch(update_user).delete(delete_user),
        )
        .route("/{id}/verify-email", post(verify_email))
        .route("/{id}/roles", get(get_user_roles).put(set_user_roles))
        .with_state(state)
}

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[serde(default)]
    pub role_ids: Vec<i64>,
    #[serde(default)]
    pub verified: bool,
}

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 255, message = "Name cannot be empty"))]
    pub name: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct SetRolesRequest {
    pub role_ids: Vec<i64>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RoleInfo {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UserResponse {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub is_active: bool,
    #[schema(value_type = Option<String>)]
    pub email_verified_at: Option<chrono::DateTime<chrono::Utc>>,
    #[schema(value_type = Option<String>)]
    pub locked_until: Option<chrono::DateTime<chrono::Utc>>,
    #[schema(value_type = String)]
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[schema(value_type = String)]
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub roles: Vec<RoleInfo>,
    pub permissions: Vec<String>,
}

impl From<role::Model> for RoleInfo {
    fn from(role: role::Model) -> Self {
        Self {
            id: role.id,
            name: role.name,
            description: role.description,
        }
    }
}

async fn role_infos(state: &AppState, user_id: i64) -> Result<Vec<RoleInfo>> {
    let roles = accounts::get_user_roles(&state.db, user_id).await?;
    Ok(roles.into_iter().map(RoleInfo::from).collect())
}

/// Account with its roles and effective permissions
async fn user_response(state: &AppState, account: user::Model) -> Result<UserResponse> {
    let roles = role_infos(state, account.id).await?;
    let permissions = accounts::get_user_permissions(&state.db, account.id).await?;

    Ok(UserResponse {
        id: account.id,
        name: account.name,
        email: account.email,
        is_active: account.is_active,
        email_verified_at: account.email_verified_at,
        locked_until: account.locked_until,
        created_at: account.created_at,
        updated_at: account.updated_at,
        roles,
        permissions,
    })
}

async fn audit_user_change(
    state: &AppState,
    by: &user::Model,
    action: AuditAction,
    user_id: i64,
    details: Option<serde_json::Value>,
) {
    state
        .audit
        .log_success(action, ResourceType::User, Some(user_id.to_string()), &Actor::from(by), details)
        .await;
}

fn dedup_ids(ids: &[i64]) -> Vec<i64> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

async fn list_users(
    State(state): State<AppState>,
    _auth: Authorized<UsersView>,
) -> Result<Json<Vec<UserResponse>>> {
    let mut listing = Vec::new();
    for account in accounts::list_users(&state.db).await? {
        listing.push(user_response(&state, account).await?);
    }
    Ok(Json(listing))
}

async fn get_current_user(
    State(state): State<AppState>,
    auth: Authenticated,
) -> Result<Json<UserResponse>> {
    Ok(Json(user_response(&state, auth.user().clone()).await?))
}

#[utoipa::path(
    post,
    path = "/api/users",
    tag = "users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    auth: Authorized<UsersManage>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>)> {
    request.validate()?;
    state
        .settings
        .security_policy()
        .await?
        .check_password(&request.password)?;

    let created = accounts::create_user(
        &state.db,
        NewUser {
            name: request.name,
            email: request.email,
            password: request.password,
            verified: request.verified,
        },
    )
    .await?;

    if !request.role_ids.is_empty() {
        accounts::set_user_roles(&state.db, created.id, &dedup_ids(&request.role_ids)).await?;
    }

    let details = serde_json::json!({ "email": created.email });
    audit_user_change(&state, auth.user(), AuditAction::UserCreated, created.id, Some(details)).await;

    Ok((StatusCode::CREATED, Json(user_response(&state, created).await?)))
}

async fn get_user(
    State(state): State<AppState>,
    _auth: Authorized<UsersView>,
    Path(id): Path<i64>,
) -> Result<Json<UserResponse>> {
    let account = accounts::get_user(&state.db, id).await?;
    Ok(Json(user_response(&state, account).await?))
}

async fn update_user(
    State(state): State<AppState>,
    auth: Authorized<UsersManage>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>> {
    request.validate()?;
    if let Some(password) = &request.password {
        state.settings.security_policy().await?.check_password(password)?;
    }

    if id == auth.user_id() && request.is_active == Some(false) {
        return Err(AppError::BadRequest(
            "Administrators cannot deactivate their own account".to_string(),
        ));
    }

    let updated = accounts::update_user(
        &state.db,
        id,
        UserUpdate {
            name: request.name,
            email: request.email,
            password: request.password,
            is_active: request.is_active,
        },
    )
    .await?;

    audit_user_change(&state, auth.user(), AuditAction::UserUpdated, id, None).await;

    Ok(Json(user_response(&state, updated).await?))
}

async fn delete_user(
    State(state): State<AppState>,
    auth: Authorized<UsersManage>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    if id == auth.user_id() {
        return Err(AppError::BadRequest(
            "Administrators cannot delete their own account".to_string(),
        ));
    }

    accounts::delete_user(&state.db, id).await?;

    audit_user_change(&state, auth.user(), AuditAction::UserDeleted, id, None).await;

    Ok(StatusCode::NO_CONTENT)
}

async fn verify_email(
    State(state): State<AppState>,
    auth: Authorized<UsersManage>,
    Path(id): Path<i64>,
) -> Result<Json<UserResponse>> {
    let verified = accounts::verify_email(&state.db, id).await?;

    audit_user_change(&state, auth.user(), AuditAction::UserVerified, id, None).await;

    Ok(Json(user_response(&state, verified).await?))
}

async fn get_user_roles(
    State(state): State<AppState>,
    _auth: Authorized<UsersView>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<RoleInfo>>> {
    accounts::get_user(&state.db, id).await?;
    Ok(Json(role_infos(&state, id).await?))
}

async fn set_user_roles(
    State(state): State<AppState>,
    auth: Authorized<UsersManage>,
    Path(id): Path<i64>,
    Json(request): Json<SetRolesRequest>,
) -> Result<Json<UserResponse>> {
    let account = accounts::get_user(&state.db, id).await?;
    let roles = accounts::set_user_roles(&state.db, id, &dedup_ids(&request.role_ids)).await?;

    let names: Vec<_> = roles.iter().map(|r| r.name.as_str()).collect();
    let details = serde_json::json!({ "roles": names });
    audit_user_change(&state, auth.user(), AuditAction::RoleAssigned, id, Some(details)).await;

    Ok(Json(user_response(&state, account).await?))
}

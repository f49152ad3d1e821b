use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::middleware::permissions::{Authorized, RolesManage, RolesView, ALL_PERMISSIONS};
use crate::models::audit_log::{AuditAction, ResourceType};
use crate::models::role;
use crate::services::accounts;
use crate::services::audit::Actor;
use crate::state::AppState;

/// Create roles routes
pub fn roles_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_roles).post(create_role))
        .route("/permissions", get(list_permissions))
        .route(
            "/{id}",
            get(get_role).patch(update_role).delete(delete_role),
        )
        .route(
            "/{id}/permissions",
            get(get_role_permissions).put(set_role_permissions),
        )
        .with_state(state)
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateRoleRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateRoleRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct SetPermissionsRequest {
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RoleResponse {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_system: bool,
    pub permissions: Vec<String>,
}

async fn role_response(state: &AppState, found: role::Model) -> Result<RoleResponse> {
    let permissions = accounts::get_role_permissions(&state.db, found.id).await?;
    Ok(RoleResponse {
        id: found.id,
        name: found.name,
        description: found.description,
        is_system: found.is_system,
        permissions,
    })
}

async fn list_roles(
    State(state): State<AppState>,
    _auth: Authorized<RolesView>,
) -> Result<Json<Vec<RoleResponse>>> {
    let mut roles = Vec::new();
    for found in accounts::list_roles(&state.db).await? {
        roles.push(role_response(&state, found).await?);
    }
    Ok(Json(roles))
}

/// Every permission string a role can be granted
async fn list_permissions(_auth: Authorized<RolesView>) -> Json<Vec<&'static str>> {
    Json(ALL_PERMISSIONS.to_vec())
}

async fn create_role(
    State(state): State<AppState>,
    auth: Authorized<RolesManage>,
    Json(request): Json<CreateRoleRequest>,
) -> Result<(StatusCode, Json<RoleResponse>)> {
    let created = accounts::create_role(
        &state.db,
        &request.name,
        request.description,
        &request.permissions,
    )
    .await?;

    state
        .audit
        .log_success(
            AuditAction::RoleCreated,
            ResourceType::Role,
            Some(created.id.to_string()),
            &Actor::from(auth.user()),
            Some(serde_json::json!({ "name": created.name })),
        )
        .await;

    Ok((StatusCode::CREATED, Json(role_response(&state, created).await?)))
}

async fn get_role(
    State(state): State<AppState>,
    _auth: Authorized<RolesView>,
    Path(id): Path<i64>,
) -> Result<Json<RoleResponse>> {
    let found = accounts::get_role(&state.db, id).await?;
    Ok(Json(role_response(&state, found).await?))
}

async fn update_role(
    State(state): State<AppState>,
    auth: Authorized<RolesManage>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateRoleRequest>,
) -> Result<Json<RoleResponse>> {
    let updated = accounts::update_role(&state.db, id, request.name, request.description).await?;

    state
        .audit
        .log_success(
            AuditAction::RoleUpdated,
            ResourceType::Role,
            Some(id.to_string()),
            &Actor::from(auth.user()),
            None,
        )
        .await;

    Ok(Json(role_response(&state, updated).await?))
}

async fn delete_role(
    State(state): State<AppState>,
    auth: Authorized<RolesManage>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    accounts::delete_role(&state.db, id).await?;

    state
        .audit
        .log_success(
            AuditAction::RoleDeleted,
            ResourceType::Role,
            Some(id.to_string()),
            &Actor::from(auth.user()),
            None,
        )
        .await;

    Ok(StatusCode::NO_CONTENT)
}

async fn get_role_permissions(
    State(state): State<AppState>,
    _auth: Authorized<RolesView>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<String>>> {
    accounts::get_role(&state.db, id).await?;
    Ok(Json(accounts::get_role_permissions(&state.db, id).await?))
}

async fn set_role_permissions(
    State(state): State<AppState>,
    auth: Authorized<RolesManage>,
    Path(id): Path<i64>,
    Json(request): Json<SetPermissionsRequest>,
) -> Result<Json<Vec<String>>> {
    accounts::get_role(&state.db, id).await?;
    let permissions = accounts::set_role_permissions(&state.db, id, &request.permissions).await?;

    state
        .audit
        .log_success(
            AuditAction::RoleUpdated,
            ResourceType::Role,
            Some(id.to_string()),
            &Actor::from(auth.user()),
            Some(serde_json::json!({ "permissions": permissions })),
        )
        .await;

    Ok(Json(permissions))
}

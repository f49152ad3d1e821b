use axum::{extract::State, routing::get, Json, Router};
use serde::Deserialize;

use crate::error::Result;
use crate::middleware::permissions::{Authorized, SystemManage, SystemView};
use crate::models::audit_log::{AuditAction, ResourceType};
use crate::services::audit::Actor;
use crate::services::system::{self, MaintenanceStatus, SystemStatus};
use crate::state::AppState;

/// Create system routes
pub fn system_routes(state: AppState) -> Router {
    Router::new()
        .route("/status", get(system_status))
        .route("/maintenance", get(get_maintenance).put(update_maintenance))
        .with_state(state)
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct MaintenanceRequest {
    pub enabled: bool,
    pub message: Option<String>,
}

/// Database, queue and backup health in one snapshot
#[utoipa::path(
    get,
    path = "/api/system/status",
    tag = "System",
    responses((status = 200, body = SystemStatus))
)]
async fn system_status(
    State(state): State<AppState>,
    _auth: Authorized<SystemView>,
) -> Result<Json<SystemStatus>> {
    Ok(Json(SystemStatus::collect(&state).await?))
}

async fn get_maintenance(
    State(state): State<AppState>,
    _auth: Authorized<SystemView>,
) -> Result<Json<MaintenanceStatus>> {
    Ok(Json(system::maintenance_status(&state.settings).await?))
}

/// Toggle maintenance mode; requests without system.manage get 503 while it is on
async fn update_maintenance(
    State(state): State<AppState>,
    auth: Authorized<SystemManage>,
    Json(request): Json<MaintenanceRequest>,
) -> Result<Json<MaintenanceStatus>> {
    let status =
        system::set_maintenance(&state.settings, request.enabled, request.message.as_deref())
            .await?;

    let action = if status.enabled {
        AuditAction::MaintenanceEnabled
    } else {
        AuditAction::MaintenanceDisabled
    };
    state
        .audit
        .log_success(
            action,
            ResourceType::System,
            None,
            &Actor::from(auth.user()),
            Some(serde_json::json!({ "message": status.message })),
        )
        .await;

    Ok(Json(status))
}

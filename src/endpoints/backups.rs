use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::middleware::permissions::{Authorized, BackupsManage, BackupsView};
use crate::models::audit_log::{AuditAction, ResourceType};
use crate::models::backup::{self, BackupType};
use crate::services::audit::Actor;
use crate::services::backup::{BackupService, BackupStats, BackupVerification};
use crate::state::AppState;

/// Create backup routes
pub fn backups_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_backups).post(create_backup))
        .route("/stats", get(backup_stats))
        .route("/cleanup", post(cleanup_expired))
        .route("/{id}", get(get_backup).delete(delete_backup))
        .route("/{id}/verify", get(verify_backup))
        .route("/{id}/restore", post(restore_backup))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub include_expired: bool,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateBackupRequest {
    pub backup_type: BackupType,
    /// Days until expiry, zero keeps the backup forever
    pub retention_days: Option<i64>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct BackupResponse {
    #[serde(flatten)]
    pub backup: backup::Model,
    pub expired: bool,
}

impl From<backup::Model> for BackupResponse {
    fn from(backup: backup::Model) -> Self {
        let expired = BackupService::is_expired(&backup, Utc::now());
        Self { backup, expired }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CleanupResponse {
    pub removed: u64,
}

async fn list_backups(
    State(state): State<AppState>,
    _auth: Authorized<BackupsView>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<BackupResponse>>> {
    let backups = state.backups.list(query.include_expired).await?;
    Ok(Json(backups.into_iter().map(BackupResponse::from).collect()))
}

async fn backup_stats(
    State(state): State<AppState>,
    _auth: Authorized<BackupsView>,
) -> Result<Json<BackupStats>> {
    Ok(Json(state.backups.stats().await?))
}

/// Create a backup synchronously
#[utoipa::path(
    post,
    path = "/api/backups",
    tag = "Backups",
    request_body = CreateBackupRequest,
    responses(
        (status = 201, description = "Backup finished, check status for the outcome", body = BackupResponse),
        (status = 400, description = "Invalid retention")
    )
)]
async fn create_backup(
    State(state): State<AppState>,
    auth: Authorized<BackupsManage>,
    Json(request): Json<CreateBackupRequest>,
) -> Result<(StatusCode, Json<BackupResponse>)> {
    let created = state
        .backups
        .create(request.backup_type, request.retention_days, Some(auth.user_id()))
        .await?;

    let actor = Actor::from(auth.user());
    let details = Some(serde_json::json!({
        "name": created.name,
        "backup_type": created.backup_type,
    }));
    if created.is_completed() {
        state
            .audit
            .log_success(
                AuditAction::BackupCreated,
                ResourceType::Backup,
                Some(created.id.to_string()),
                &actor,
                details,
            )
            .await;
    } else {
        state
            .audit
            .log_failure(
                AuditAction::BackupFailed,
                ResourceType::Backup,
                Some(created.id.to_string()),
                &actor,
                details,
                created.error_message.as_deref().unwrap_or("Backup failed"),
            )
            .await;
    }

    Ok((StatusCode::CREATED, Json(created.into())))
}

async fn get_backup(
    State(state): State<AppState>,
    _auth: Authorized<BackupsView>,
    Path(id): Path<i64>,
) -> Result<Json<BackupResponse>> {
    Ok(Json(state.backups.get(id).await?.into()))
}

async fn verify_backup(
    State(state): State<AppState>,
    _auth: Authorized<BackupsView>,
    Path(id): Path<i64>,
) -> Result<Json<BackupVerification>> {
    Ok(Json(state.backups.verify(id).await?))
}

/// Restore configuration and files from a backup
#[utoipa::path(
    post,
    path = "/api/backups/{id}/restore",
    tag = "Backups",
    params(("id" = i64, Path, description = "Backup id")),
    responses(
        (status = 200, body = BackupResponse),
        (status = 400, description = "Backup is expired, incomplete or corrupt"),
        (status = 404, description = "Backup not found")
    )
)]
async fn restore_backup(
    State(state): State<AppState>,
    auth: Authorized<BackupsManage>,
    Path(id): Path<i64>,
) -> Result<Json<BackupResponse>> {
    let restored = state.backups.restore(id).await?;

    state
        .audit
        .log_success(
            AuditAction::BackupRestored,
            ResourceType::Backup,
            Some(id.to_string()),
            &Actor::from(auth.user()),
            Some(serde_json::json!({ "name": restored.name })),
        )
        .await;

    Ok(Json(restored.into()))
}

async fn delete_backup(
    State(state): State<AppState>,
    auth: Authorized<BackupsManage>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    let deleted = state.backups.delete(id).await?;

    state
        .audit
        .log_success(
            AuditAction::BackupDeleted,
            ResourceType::Backup,
            Some(id.to_string()),
            &Actor::from(auth.user()),
            Some(serde_json::json!({ "name": deleted.name })),
        )
        .await;

    Ok(StatusCode::NO_CONTENT)
}

/// Remove every expired backup
async fn cleanup_expired(
    State(state): State<AppState>,
    auth: Authorized<BackupsManage>,
) -> Result<Json<CleanupResponse>> {
    let removed = state.backups.cleanup_expired(Utc::now()).await?;

    state
        .audit
        .log_success(
            AuditAction::CleanupRun,
            ResourceType::Backup,
            None,
            &Actor::from(auth.user()),
            Some(serde_json::json!({ "removed": removed })),
        )
        .await;

    Ok(Json(CleanupResponse { removed }))
}

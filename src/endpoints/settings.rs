use std::collections::{BTreeMap, HashMap};

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::middleware::permissions::{Authorized, SettingsManage, SettingsView};
use crate::models::audit_log::{AuditAction, ResourceType};
use crate::services::audit::Actor;
use crate::services::settings::{FooterConfig, SettingEntry};
use crate::state::AppState;

/// Create settings routes
pub fn settings_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(settings_dashboard))
        .route("/entries", get(list_settings))
        .route("/appearance/footer", get(get_footer))
        .route("/{section}", get(get_section).put(update_section))
        .route("/{section}/reset", post(reset_section))
        .with_state(state)
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct SectionUpdate {
    /// Keys with or without the `<section>.` prefix
    pub values: HashMap<String, String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SectionResponse {
    pub section: String,
    pub values: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ResetResponse {
    pub section: String,
    pub removed: u64,
}

// ============================================================================
// Endpoint Handlers
// ============================================================================

/// Every section with its merged values (requires settings.view permission)
#[utoipa::path(
    get,
    path = "/api/settings",
    tag = "Settings",
    responses(
        (status = 200, description = "Settings grouped by section")
    )
)]
async fn settings_dashboard(
    State(state): State<AppState>,
    _auth: Authorized<SettingsView>,
) -> Result<Json<BTreeMap<String, BTreeMap<String, String>>>> {
    Ok(Json(state.settings.dashboard().await?))
}

/// Known and stored settings with their types
async fn list_settings(
    State(state): State<AppState>,
    _auth: Authorized<SettingsView>,
) -> Result<Json<Vec<SettingEntry>>> {
    Ok(Json(state.settings.list().await?))
}

async fn get_footer(
    State(state): State<AppState>,
    _auth: Authorized<SettingsView>,
) -> Result<Json<FooterConfig>> {
    Ok(Json(state.settings.footer().await?))
}

/// Get one section (requires settings.view permission)
#[utoipa::path(
    get,
    path = "/api/settings/{section}",
    tag = "Settings",
    params(
        ("section" = String, Path, description = "Settings section"),
    ),
    responses(
        (status = 200, body = SectionResponse),
        (status = 404, description = "Unknown section")
    )
)]
async fn get_section(
    State(state): State<AppState>,
    Path(section): Path<String>,
    _auth: Authorized<SettingsView>,
) -> Result<Json<SectionResponse>> {
    let values = state.settings.section(&section).await?;
    Ok(Json(SectionResponse { section, values }))
}

/// Update keys of one section (requires settings.manage permission)
#[utoipa::path(
    put,
    path = "/api/settings/{section}",
    tag = "Settings",
    params(
        ("section" = String, Path, description = "Settings section"),
    ),
    request_body = SectionUpdate,
    responses(
        (status = 200, body = SectionResponse),
        (status = 400, description = "Key outside the section or invalid value")
    )
)]
async fn update_section(
    State(state): State<AppState>,
    Path(section): Path<String>,
    auth: Authorized<SettingsManage>,
    Json(update): Json<SectionUpdate>,
) -> Result<Json<SectionResponse>> {
    let changed: Vec<String> = update.values.keys().cloned().collect();
    let values = state
        .settings
        .update_section(&section, update.values)
        .await?;

    state
        .audit
        .log_success(
            AuditAction::SettingChanged,
            ResourceType::Setting,
            Some(section.clone()),
            &Actor::from(auth.user()),
            Some(serde_json::json!({ "keys": changed })),
        )
        .await;

    Ok(Json(SectionResponse { section, values }))
}

/// Restore a section to its defaults
async fn reset_section(
    State(state): State<AppState>,
    Path(section): Path<String>,
    auth: Authorized<SettingsManage>,
) -> Result<Json<ResetResponse>> {
    let removed = state.settings.reset_section(&section).await?;

    state
        .audit
        .log_success(
            AuditAction::SettingsReset,
            ResourceType::Setting,
            Some(section.clone()),
            &Actor::from(auth.user()),
            Some(serde_json::json!({ "removed": removed })),
        )
        .await;

    Ok(Json(ResetResponse { section, removed }))
}

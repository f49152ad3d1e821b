//! Maintenance mode guard
//!
//! Must run after `require_auth`. While `advanced.maintenance_mode` is on,
//! only users holding `system.manage` reach the handlers.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::middleware::permissions::{Permission, SystemManage};
use crate::middleware::AuthenticatedUser;
use crate::services::system;
use crate::state::AppState;

pub async fn maintenance_guard(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let maintenance = match system::maintenance_status(&state.settings).await {
        Ok(status) => status,
        Err(e) => {
            tracing::error!(error = %e, "Failed to read maintenance mode");
            return next.run(req).await;
        }
    };

    if !maintenance.enabled {
        return next.run(req).await;
    }

    let bypass = req
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|u| u.has_permission(SystemManage::NAME))
        .unwrap_or(false);

    if bypass {
        return next.run(req).await;
    }

    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({
            "detail": maintenance.message,
            "maintenance": true,
        })),
    )
        .into_response()
}

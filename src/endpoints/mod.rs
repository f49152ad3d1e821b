pub mod audit;
pub mod auth;
pub mod backups;
pub mod jobs;
pub mod mail;
pub mod roles;
pub mod settings;
pub mod system;
pub mod users;

use axum::{middleware as axum_middleware, routing::get, Json, Router};

use crate::config::CONFIG;
use crate::middleware::{maintenance_guard, require_auth};
use crate::state::AppState;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/api/health", get(health_check))
        .route("/api/system/version", get(get_version))
        .nest("/auth", auth::auth_routes(state.clone()));

    // Protected routes: auth runs first, then the maintenance guard
    let protected_routes = Router::new()
        .nest("/api", api_routes(state.clone()))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            maintenance_guard,
        ))
        .layer(axum_middleware::from_fn_with_state(state, require_auth));

    public_routes.merge(protected_routes)
}

/// API routes under /api/* (protected by auth middleware)
fn api_routes(state: AppState) -> Router {
    Router::new()
        .nest("/users", users::users_routes(state.clone()))
        .nest("/roles", roles::roles_routes(state.clone()))
        .nest("/settings", settings::settings_routes(state.clone()))
        .nest("/mail", mail::mail_routes(state.clone()))
        .nest("/backups", backups::backups_routes(state.clone()))
        .nest("/jobs", jobs::jobs_routes(state.clone()))
        .nest("/system", system::system_routes(state.clone()))
        .nest("/audit", audit::audit_routes(state))
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Version info endpoint
async fn get_version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "version": CONFIG.version,
        "commit_hash": CONFIG.commit_hash,
    }))
}

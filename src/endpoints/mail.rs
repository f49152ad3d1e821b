use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::middleware::permissions::{Authorized, MailManage, MailView};
use crate::models::audit_log::{AuditAction, ResourceType};
use crate::models::email_template;
use crate::services::audit::Actor;
use crate::services::mail::smtp::{self, SmtpConfigInput, SmtpConfigResponse};
use crate::services::mail::templates::{self, EmailTemplateInput, TemplatePreview};
use crate::services::mail::test_connection;
use crate::state::AppState;

/// Create mail routes
pub fn mail_routes(state: AppState) -> Router {
    Router::new()
        .route("/smtp", get(list_smtp_configs).post(create_smtp_config))
        .route(
            "/smtp/{id}",
            get(get_smtp_config)
                .put(update_smtp_config)
                .delete(delete_smtp_config),
        )
        .route("/smtp/{id}/default", post(set_default_smtp_config))
        .route("/smtp/{id}/validate", get(validate_smtp_config))
        .route("/smtp/{id}/test", post(test_smtp_config))
        .route("/templates", get(list_templates).post(create_template))
        .route(
            "/templates/{id}",
            get(get_template).put(update_template).delete(delete_template),
        )
        .route("/templates/{id}/preview", post(preview_template))
        .with_state(state)
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ValidationResponse {
    pub valid: bool,
    pub problems: Vec<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ConnectionTestResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct PreviewRequest {
    #[serde(default)]
    pub vars: HashMap<String, String>,
}

// ============================================================================
// SMTP configurations
// ============================================================================

async fn list_smtp_configs(
    State(state): State<AppState>,
    _auth: Authorized<MailView>,
) -> Result<Json<Vec<SmtpConfigResponse>>> {
    let configs = smtp::list(&state.db).await?;
    Ok(Json(configs.into_iter().map(SmtpConfigResponse::from).collect()))
}

async fn get_smtp_config(
    State(state): State<AppState>,
    _auth: Authorized<MailView>,
    Path(id): Path<i64>,
) -> Result<Json<SmtpConfigResponse>> {
    Ok(Json(smtp::get(&state.db, id).await?.into()))
}

async fn create_smtp_config(
    State(state): State<AppState>,
    auth: Authorized<MailManage>,
    Json(input): Json<SmtpConfigInput>,
) -> Result<(StatusCode, Json<SmtpConfigResponse>)> {
    let created = smtp::create(&state.db, input).await?;

    state
        .audit
        .log_success(
            AuditAction::SmtpConfigCreated,
            ResourceType::SmtpConfig,
            Some(created.id.to_string()),
            &Actor::from(auth.user()),
            Some(serde_json::json!({ "name": created.name, "host": created.host })),
        )
        .await;

    Ok((StatusCode::CREATED, Json(created.into())))
}

async fn update_smtp_config(
    State(state): State<AppState>,
    auth: Authorized<MailManage>,
    Path(id): Path<i64>,
    Json(input): Json<SmtpConfigInput>,
) -> Result<Json<SmtpConfigResponse>> {
    let updated = smtp::update(&state.db, id, input).await?;

    state
        .audit
        .log_success(
            AuditAction::SmtpConfigUpdated,
            ResourceType::SmtpConfig,
            Some(id.to_string()),
            &Actor::from(auth.user()),
            None,
        )
        .await;

    Ok(Json(updated.into()))
}

async fn delete_smtp_config(
    State(state): State<AppState>,
    auth: Authorized<MailManage>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    smtp::delete(&state.db, id).await?;

    state
        .audit
        .log_success(
            AuditAction::SmtpConfigDeleted,
            ResourceType::SmtpConfig,
            Some(id.to_string()),
            &Actor::from(auth.user()),
            None,
        )
        .await;

    Ok(StatusCode::NO_CONTENT)
}

async fn set_default_smtp_config(
    State(state): State<AppState>,
    auth: Authorized<MailManage>,
    Path(id): Path<i64>,
) -> Result<Json<SmtpConfigResponse>> {
    let updated = smtp::set_default(&state.db, id).await?;

    state
        .audit
        .log_success(
            AuditAction::SmtpConfigUpdated,
            ResourceType::SmtpConfig,
            Some(id.to_string()),
            &Actor::from(auth.user()),
            Some(serde_json::json!({ "is_default": true })),
        )
        .await;

    Ok(Json(updated.into()))
}

async fn validate_smtp_config(
    State(state): State<AppState>,
    _auth: Authorized<MailView>,
    Path(id): Path<i64>,
) -> Result<Json<ValidationResponse>> {
    let problems = smtp::get(&state.db, id).await?.validate();
    Ok(Json(ValidationResponse {
        valid: problems.is_empty(),
        problems,
    }))
}

/// Open a connection to the configured SMTP server
#[utoipa::path(
    post,
    path = "/api/mail/smtp/{id}/test",
    tag = "Mail",
    params(("id" = i64, Path, description = "SMTP configuration id")),
    responses(
        (status = 200, body = ConnectionTestResponse),
        (status = 400, description = "Configuration is invalid")
    )
)]
async fn test_smtp_config(
    State(state): State<AppState>,
    _auth: Authorized<MailManage>,
    Path(id): Path<i64>,
) -> Result<Json<ConnectionTestResponse>> {
    let config = smtp::get(&state.db, id)
        .await?
        .to_mailer_config()
        .map_err(AppError::BadRequest)?;

    let response = match test_connection(&config).await {
        Ok(()) => ConnectionTestResponse {
            success: true,
            message: format!("Connected to {}:{}", config.host, config.port),
        },
        Err(e) => ConnectionTestResponse {
            success: false,
            message: e.to_string(),
        },
    };
    Ok(Json(response))
}

// ============================================================================
// Email templates
// ============================================================================

async fn list_templates(
    State(state): State<AppState>,
    _auth: Authorized<MailView>,
) -> Result<Json<Vec<email_template::Model>>> {
    Ok(Json(templates::list(&state.db).await?))
}

async fn get_template(
    State(state): State<AppState>,
    _auth: Authorized<MailView>,
    Path(id): Path<i64>,
) -> Result<Json<email_template::Model>> {
    Ok(Json(templates::get(&state.db, id).await?))
}

async fn create_template(
    State(state): State<AppState>,
    auth: Authorized<MailManage>,
    Json(input): Json<EmailTemplateInput>,
) -> Result<(StatusCode, Json<email_template::Model>)> {
    let created = templates::create(&state.db, input).await?;

    state
        .audit
        .log_success(
            AuditAction::TemplateCreated,
            ResourceType::EmailTemplate,
            Some(created.id.to_string()),
            &Actor::from(auth.user()),
            Some(serde_json::json!({ "name": created.name })),
        )
        .await;

    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_template(
    State(state): State<AppState>,
    auth: Authorized<MailManage>,
    Path(id): Path<i64>,
    Json(input): Json<EmailTemplateInput>,
) -> Result<Json<email_template::Model>> {
    let updated = templates::update(&state.db, id, input).await?;

    state
        .audit
        .log_success(
            AuditAction::TemplateUpdated,
            ResourceType::EmailTemplate,
            Some(id.to_string()),
            &Actor::from(auth.user()),
            None,
        )
        .await;

    Ok(Json(updated))
}

async fn delete_template(
    State(state): State<AppState>,
    auth: Authorized<MailManage>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    templates::delete(&state.db, id).await?;

    state
        .audit
        .log_success(
            AuditAction::TemplateDeleted,
            ResourceType::EmailTemplate,
            Some(id.to_string()),
            &Actor::from(auth.user()),
            None,
        )
        .await;

    Ok(StatusCode::NO_CONTENT)
}

async fn preview_template(
    State(state): State<AppState>,
    _auth: Authorized<MailView>,
    Path(id): Path<i64>,
    Json(request): Json<PreviewRequest>,
) -> Result<Json<TemplatePreview>> {
    Ok(Json(templates::preview(&state.db, id, &request.vars).await?))
}

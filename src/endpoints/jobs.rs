use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::middleware::permissions::{Authorized, JobsManage, JobsView};
use crate::models::audit_log::{AuditAction, ResourceType};
use crate::models::{failed_job, job};
use crate::services::audit::Actor;
use crate::services::jobs::{self, QueueStats, DEFAULT_PRIORITY};
use crate::state::AppState;

/// Create job queue routes
pub fn jobs_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(queue_overview))
        .route("/pending", get(list_pending))
        .route("/dispatch", post(dispatch_job))
        .route("/failed", get(list_failed).delete(flush_failed))
        .route("/failed/retry", post(retry_all_failed))
        .route("/failed/{id}", delete(forget_failed))
        .route("/failed/{id}/retry", post(retry_failed))
        .with_state(state)
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct DispatchRequest {
    pub job_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// 1 (most urgent) to 5
    pub priority: Option<i32>,
    /// Overrides the queue chosen from the priority
    pub queue: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PendingQuery {
    pub queue: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FlushQuery {
    pub older_than_days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct QueueOverview {
    #[serde(flatten)]
    pub stats: QueueStats,
    pub pending: Vec<job::Model>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CountResponse {
    pub count: u64,
}

/// Per-queue counts and every pending job (requires jobs.view permission)
#[utoipa::path(
    get,
    path = "/api/jobs",
    tag = "Jobs",
    responses((status = 200, description = "Queue counts and pending jobs"))
)]
async fn queue_overview(
    State(state): State<AppState>,
    _auth: Authorized<JobsView>,
) -> Result<Json<QueueOverview>> {
    Ok(Json(QueueOverview {
        stats: jobs::stats(&state.db, state.queue.reservation_timeout_secs).await?,
        pending: jobs::pending(&state.db, None).await?,
    }))
}

async fn list_pending(
    State(state): State<AppState>,
    _auth: Authorized<JobsView>,
    Query(query): Query<PendingQuery>,
) -> Result<Json<Vec<job::Model>>> {
    Ok(Json(jobs::pending(&state.db, query.queue.as_deref()).await?))
}

async fn dispatch_job(
    State(state): State<AppState>,
    auth: Authorized<JobsManage>,
    Json(request): Json<DispatchRequest>,
) -> Result<(StatusCode, Json<job::Model>)> {
    let priority = request.priority.unwrap_or(DEFAULT_PRIORITY);
    if !(1..=5).contains(&priority) {
        return Err(AppError::BadRequest(
            "Priority must be between 1 and 5".to_string(),
        ));
    }

    let dispatched = match request.queue.as_deref() {
        Some(queue) => {
            state
                .jobs
                .dispatch_on(queue, &request.job_type, request.payload, priority)
                .await?
        }
        None => {
            state
                .jobs
                .dispatch(&request.job_type, request.payload, priority)
                .await?
        }
    };

    state
        .audit
        .log_success(
            AuditAction::JobDispatched,
            ResourceType::Job,
            Some(dispatched.id.to_string()),
            &Actor::from(auth.user()),
            Some(serde_json::json!({
                "job_type": dispatched.job_type,
                "queue": dispatched.queue,
            })),
        )
        .await;

    Ok((StatusCode::CREATED, Json(dispatched)))
}

async fn list_failed(
    State(state): State<AppState>,
    _auth: Authorized<JobsView>,
) -> Result<Json<Vec<failed_job::Model>>> {
    Ok(Json(jobs::failed(&state.db).await?))
}

async fn retry(state: &AppState, auth: &Authorized<JobsManage>, id: Option<i64>) -> Result<u64> {
    let count = jobs::retry(&state.db, id, state.queue.max_attempts).await?;

    state
        .audit
        .log_success(
            AuditAction::JobsRetried,
            ResourceType::Job,
            id.map(|id| id.to_string()),
            &Actor::from(auth.user()),
            Some(serde_json::json!({ "count": count })),
        )
        .await;

    Ok(count)
}

async fn retry_failed(
    State(state): State<AppState>,
    auth: Authorized<JobsManage>,
    Path(id): Path<i64>,
) -> Result<Json<CountResponse>> {
    let count = retry(&state, &auth, Some(id)).await?;
    Ok(Json(CountResponse { count }))
}

async fn retry_all_failed(
    State(state): State<AppState>,
    auth: Authorized<JobsManage>,
) -> Result<Json<CountResponse>> {
    let count = retry(&state, &auth, None).await?;
    Ok(Json(CountResponse { count }))
}

async fn forget_failed(
    State(state): State<AppState>,
    _auth: Authorized<JobsManage>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    if !jobs::forget(&state.db, id).await? {
        return Err(AppError::NotFound(format!("Failed job {} not found", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn flush_failed(
    State(state): State<AppState>,
    auth: Authorized<JobsManage>,
    Query(query): Query<FlushQuery>,
) -> Result<Json<CountResponse>> {
    if matches!(query.older_than_days, Some(days) if days < 0) {
        return Err(AppError::BadRequest(
            "older_than_days cannot be negative".to_string(),
        ));
    }
    let count = jobs::flush_failed(&state.db, query.older_than_days).await?;

    state
        .audit
        .log_success(
            AuditAction::JobsFlushed,
            ResourceType::Job,
            None,
            &Actor::from(auth.user()),
            Some(serde_json::json!({ "count": count })),
        )
        .await;

    Ok(Json(CountResponse { count }))
}

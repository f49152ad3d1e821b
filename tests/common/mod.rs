//! Test helpers shared by the integration tests.
//!
//! Every test gets its own in-memory SQLite database with all migrations
//! applied (which seeds the default roles and email templates) and its own
//! temporary storage directory. Mail uses the `log` driver.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tempfile::TempDir;
use tower::util::ServiceExt;

use backoffice::config::mail::MailDriver;
use backoffice::config::queue::QueueConfig;
use backoffice::config::storage::StorageConfig;
use backoffice::endpoints::create_router;
use backoffice::migrations::Migrator;
use backoffice::models::user;
use backoffice::services::accounts::{self, NewUser};
use backoffice::services::security::create_access_token;
use backoffice::state::AppState;

pub const TEST_PASSWORD: &str = "correct-horse-battery";

/// Create an in-memory SQLite database for testing
pub async fn create_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to create test database");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run test migrations");

    db
}

/// Application state over a fresh database and temporary storage
pub struct TestContext {
    pub state: AppState,
    pub storage: TempDir,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_queue(test_queue_config()).await
    }

    pub async fn with_queue(queue: QueueConfig) -> Self {
        let db = create_test_db().await;
        let storage = TempDir::new().expect("Failed to create temp dir");
        let storage_config = StorageConfig::with_root(storage.path().to_path_buf());
        let state = AppState::new(db, storage_config, queue, MailDriver::Log);
        Self { state, storage }
    }

    pub fn app(&self) -> Router {
        create_router(self.state.clone())
    }
}

/// Queue settings with no retry delay so released jobs are claimable at once
pub fn test_queue_config() -> QueueConfig {
    QueueConfig {
        poll_interval_ms: 10,
        retry_delay_secs: 0,
        max_attempts: 3,
        cache_ttl_secs: 3600,
        reservation_timeout_secs: 300,
    }
}

/// Create an active, verified user holding the named seeded role
pub async fn create_user_with_role(state: &AppState, email: &str, role: &str) -> user::Model {
    let created = accounts::create_user(
        &state.db,
        NewUser {
            name: email.split('@').next().unwrap_or(email).to_string(),
            email: email.to_string(),
            password: TEST_PASSWORD.to_string(),
            verified: true,
        },
    )
    .await
    .expect("Failed to create test user");

    let role = accounts::find_role_by_name(&state.db, role)
        .await
        .expect("Seeded role missing");
    accounts::assign_role(&state.db, created.id, role.id)
        .await
        .expect("Failed to assign role");

    created
}

/// A bearer token for the user
pub fn token_for(user: &user::Model) -> String {
    create_access_token(&user.id.to_string(), Some(&user.email), None)
        .expect("Failed to create token")
}

/// Create a user with the role and return their token
pub async fn login_as(state: &AppState, email: &str, role: &str) -> String {
    let user = create_user_with_role(state, email, role).await;
    token_for(&user)
}

/// Send a request and return the status and the JSON body (`Null` when empty
/// or not JSON)
pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

pub async fn get(app: Router, uri: &str, token: &str) -> (StatusCode, serde_json::Value) {
    send(app, Method::GET, uri, Some(token), None).await
}

pub async fn post(
    app: Router,
    uri: &str,
    token: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send(app, Method::POST, uri, Some(token), Some(body)).await
}

pub async fn put(
    app: Router,
    uri: &str,
    token: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send(app, Method::PUT, uri, Some(token), Some(body)).await
}

pub async fn delete(app: Router, uri: &str, token: &str) -> (StatusCode, serde_json::Value) {
    send(app, Method::DELETE, uri, Some(token), None).await
}

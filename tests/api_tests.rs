//! HTTP API tests: authentication, permissions, users and roles

mod common;

use axum::http::{header, Method, StatusCode};
use serde_json::json;

use common::{delete, get, login_as, post, put, send, TestContext, TEST_PASSWORD};

#[tokio::test]
async fn test_health_is_public() {
    let ctx = TestContext::new().await;
    let (status, _) = send(ctx.app(), Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(ctx.app(), Method::GET, "/api/system/version", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let ctx = TestContext::new().await;
    for uri in ["/api/users", "/api/settings", "/api/backups", "/api/jobs"] {
        let (status, _) = send(ctx.app(), Method::GET, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
    }

    let (status, _) = send(
        ctx.app(),
        Method::GET,
        "/api/users",
        Some("not-a-jwt"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_returns_token_and_cookie() {
    let ctx = TestContext::new().await;
    common::create_user_with_role(&ctx.state, "ada@example.com", "editor").await;

    let request = axum::http::Request::builder()
        .method(Method::POST)
        .uri("/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(
            json!({ "email": "ADA@example.com", "password": TEST_PASSWORD }).to_string(),
        ))
        .unwrap();

    use http_body_util::BodyExt;
    use tower::util::ServiceExt;
    let response = ctx.app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(cookie.contains("HttpOnly"));

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let token = body["access_token"].as_str().unwrap();
    assert!(body["permissions"]
        .as_array()
        .unwrap()
        .contains(&json!("settings.manage")));

    let (status, me) = get(ctx.app(), "/api/users/me", token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "ada@example.com");
}

#[tokio::test]
async fn test_login_rejects_wrong_password() {
    let ctx = TestContext::new().await;
    common::create_user_with_role(&ctx.state, "ada@example.com", "viewer").await;

    let (status, _) = send(
        ctx.app(),
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "email": "ada@example.com", "password": "wrong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        ctx.app(),
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "email": "nobody@example.com", "password": TEST_PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_viewer_cannot_manage() {
    let ctx = TestContext::new().await;
    let token = login_as(&ctx.state, "viewer@example.com", "viewer").await;

    let (status, _) = get(ctx.app(), "/api/settings/general", &token).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = put(
        ctx.app(),
        "/api/settings/general",
        &token,
        json!({ "values": { "app_name": "Nope" } }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = get(ctx.app(), "/api/users", &token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = post(
        ctx.app(),
        "/api/jobs/dispatch",
        &token,
        json!({ "job_type": "cleanup" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_manages_users_and_roles() {
    let ctx = TestContext::new().await;
    let token = login_as(&ctx.state, "admin@example.com", "admin").await;

    let (status, role) = post(
        ctx.app(),
        "/api/roles",
        &token,
        json!({
            "name": "auditor",
            "description": "Reads the audit log",
            "permissions": ["audit.view"]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let role_id = role["id"].as_i64().unwrap();
    assert_eq!(role["permissions"], json!(["audit.view"]));

    let (status, created) = post(
        ctx.app(),
        "/api/users",
        &token,
        json!({
            "name": "Grace",
            "email": "grace@example.com",
            "password": "a-long-password",
            "role_ids": [role_id],
            "verified": true
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["permissions"], json!(["audit.view"]));
    let user_id = created["id"].as_i64().unwrap();

    let (status, _) = post(
        ctx.app(),
        "/api/users",
        &token,
        json!({
            "name": "Grace again",
            "email": "grace@example.com",
            "password": "a-long-password",
            "role_ids": []
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, users) = get(ctx.app(), "/api/users", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users.as_array().unwrap().len(), 2);

    let (status, _) = delete(ctx.app(), &format!("/api/users/{}", user_id), &token).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = get(ctx.app(), &format!("/api/users/{}", user_id), &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_permission_rejected() {
    let ctx = TestContext::new().await;
    let token = login_as(&ctx.state, "admin@example.com", "admin").await;

    let (status, _) = post(
        ctx.app(),
        "/api/roles",
        &token,
        json!({ "name": "broken", "permissions": ["reactor.meltdown"] }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_maintenance_mode_blocks_non_admins() {
    let ctx = TestContext::new().await;
    let admin = login_as(&ctx.state, "admin@example.com", "admin").await;
    let viewer = login_as(&ctx.state, "viewer@example.com", "viewer").await;

    let (status, body) = put(
        ctx.app(),
        "/api/system/maintenance",
        &admin,
        json!({ "enabled": true, "message": "Back soon" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enabled"], true);

    let (status, body) = get(ctx.app(), "/api/settings", &viewer).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["detail"], "Back soon");
    assert_eq!(body["maintenance"], true);

    let (status, _) = get(ctx.app(), "/api/settings", &admin).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(ctx.app(), Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = put(
        ctx.app(),
        "/api/system/maintenance",
        &admin,
        json!({ "enabled": false }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enabled"], false);

    let (status, _) = get(ctx.app(), "/api/settings", &viewer).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_actions_are_audited() {
    let ctx = TestContext::new().await;
    let admin = login_as(&ctx.state, "admin@example.com", "admin").await;

    let (status, _) = put(
        ctx.app(),
        "/api/settings/general",
        &admin,
        json!({ "values": { "app_name": "Acme Admin" } }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, logs) = get(ctx.app(), "/api/audit?action=setting_changed", &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(logs["total"], 1);
    assert_eq!(logs["logs"][0]["resource_id"], "general");
}

async fn try_login(ctx: &TestContext, email: &str, password: &str) -> (StatusCode, serde_json::Value) {
    send(
        ctx.app(),
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "email": email, "password": password })),
    )
    .await
}

#[tokio::test]
async fn test_login_requires_verified_email_when_enabled() {
    let ctx = TestContext::new().await;
    backoffice::services::accounts::create_user(
        &ctx.state.db,
        backoffice::services::accounts::NewUser {
            name: "Unverified".to_string(),
            email: "new@example.com".to_string(),
            password: TEST_PASSWORD.to_string(),
            verified: false,
        },
    )
    .await
    .unwrap();

    let (status, _) = try_login(&ctx, "new@example.com", TEST_PASSWORD).await;
    assert_eq!(status, StatusCode::OK);

    ctx.state
        .settings
        .set("security.require_email_verification", "true")
        .await
        .unwrap();
    let (status, body) = try_login(&ctx, "new@example.com", TEST_PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "Email address has not been verified");

    // Verified accounts are unaffected
    common::create_user_with_role(&ctx.state, "ada@example.com", "viewer").await;
    let (status, _) = try_login(&ctx, "ada@example.com", TEST_PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_login_locks_account_after_failures() {
    let ctx = TestContext::new().await;
    ctx.state
        .settings
        .set("security.max_login_attempts", "3")
        .await
        .unwrap();
    let ada = common::create_user_with_role(&ctx.state, "ada@example.com", "viewer").await;

    for _ in 0..3 {
        let (status, _) = try_login(&ctx, "ada@example.com", "wrong-password").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    // Locked: even the right password is refused
    let (status, body) = try_login(&ctx, "ada@example.com", TEST_PASSWORD).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["detail"].as_str().unwrap().contains("try again"));

    let locked = backoffice::services::accounts::get_user(&ctx.state.db, ada.id)
        .await
        .unwrap();
    assert_eq!(locked.failed_login_count, 3);
    assert!(locked.locked_until.is_some());

    backoffice::services::accounts::unlock_user(&ctx.state.db, ada.id)
        .await
        .unwrap();
    let (status, _) = try_login(&ctx, "ada@example.com", TEST_PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_successful_login_resets_failure_count() {
    let ctx = TestContext::new().await;
    ctx.state
        .settings
        .set("security.max_login_attempts", "3")
        .await
        .unwrap();
    let ada = common::create_user_with_role(&ctx.state, "ada@example.com", "viewer").await;

    for _ in 0..2 {
        try_login(&ctx, "ada@example.com", "wrong-password").await;
    }
    let (status, _) = try_login(&ctx, "ada@example.com", TEST_PASSWORD).await;
    assert_eq!(status, StatusCode::OK);

    let account = backoffice::services::accounts::get_user(&ctx.state.db, ada.id)
        .await
        .unwrap();
    assert_eq!(account.failed_login_count, 0);
    assert!(account.locked_until.is_none());

    // Counting starts again from zero
    for _ in 0..2 {
        try_login(&ctx, "ada@example.com", "wrong-password").await;
    }
    let (status, _) = try_login(&ctx, "ada@example.com", TEST_PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_zero_max_attempts_disables_lockout() {
    let ctx = TestContext::new().await;
    ctx.state
        .settings
        .set("security.max_login_attempts", "0")
        .await
        .unwrap();
    common::create_user_with_role(&ctx.state, "ada@example.com", "viewer").await;

    for _ in 0..8 {
        try_login(&ctx, "ada@example.com", "wrong-password").await;
    }
    let (status, _) = try_login(&ctx, "ada@example.com", TEST_PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_session_lifetime_setting_controls_token_ttl() {
    let ctx = TestContext::new().await;
    ctx.state
        .settings
        .set("security.session_lifetime_minutes", "30")
        .await
        .unwrap();
    common::create_user_with_role(&ctx.state, "ada@example.com", "viewer").await;

    let (status, body) = try_login(&ctx, "ada@example.com", TEST_PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expires_in"], 1800);

    let claims =
        backoffice::services::security::decode_token(body["access_token"].as_str().unwrap())
            .unwrap();
    let remaining = claims.exp - chrono::Utc::now().timestamp();
    assert!((1700..=1800).contains(&remaining), "{}", remaining);
}

#[tokio::test]
async fn test_password_min_length_setting_is_enforced() {
    let ctx = TestContext::new().await;
    let token = login_as(&ctx.state, "admin@example.com", "admin").await;
    ctx.state
        .settings
        .set("security.password_min_length", "20")
        .await
        .unwrap();

    let (status, body) = post(
        ctx.app(),
        "/api/users",
        &token,
        json!({ "name": "Short", "email": "short@example.com", "password": "ninechars" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Password must be at least 20 characters");

    let (status, created) = post(
        ctx.app(),
        "/api/users",
        &token,
        json!({ "name": "Long", "email": "long@example.com", "password": TEST_PASSWORD }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let uri = format!("/api/users/{}", created["id"]);
    let (status, _) = put(ctx.app(), &uri, &token, json!({ "password": "ninechars" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

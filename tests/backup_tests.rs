mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, Set};
use serde_json::json;

use backoffice::error::AppError;
use backoffice::models::backup::{self, BackupType};
use backoffice::services::backup::{DATABASE_FILE, MANIFEST_FILE};
use common::{get, login_as, post, TestContext};

fn write_file(root: &std::path::Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

#[tokio::test]
async fn test_database_backup_writes_manifest_and_hash() {
    let ctx = TestContext::new().await;
    ctx.state.settings.set("general.app_name", "Acme").await.unwrap();

    let created = ctx
        .state
        .backups
        .create(BackupType::Database, None, None)
        .await
        .unwrap();

    assert!(created.is_completed());
    assert!(created.file_hash.is_some());
    assert!(created.file_size.unwrap() > 0);
    assert!(created.expires_at.is_some());

    let dir = std::path::PathBuf::from(created.file_path.clone().unwrap());
    assert!(dir.join(DATABASE_FILE).is_file());
    assert!(dir.join(MANIFEST_FILE).is_file());

    let verification = ctx.state.backups.verify(created.id).await.unwrap();
    assert!(verification.valid, "{}", verification.message);
}

#[tokio::test]
async fn test_zero_retention_never_expires() {
    let ctx = TestContext::new().await;
    let created = ctx
        .state
        .backups
        .create(BackupType::Database, Some(0), None)
        .await
        .unwrap();
    assert!(created.expires_at.is_none());

    let err = ctx
        .state
        .backups
        .create(BackupType::Database, Some(-1), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = ctx
        .state
        .backups
        .create(BackupType::Database, Some(1_000_000_000_000), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert!(ctx.state.backups.list(true).await.unwrap().len() == 1);
}

#[tokio::test]
async fn test_tampered_backup_fails_verification_and_restore() {
    let ctx = TestContext::new().await;
    write_file(&ctx.state.storage.files_dir, "uploads/report.txt", "quarterly numbers");

    let created = ctx
        .state
        .backups
        .create(BackupType::Full, None, None)
        .await
        .unwrap();
    let dir = std::path::PathBuf::from(created.file_path.clone().unwrap());
    assert!(dir.join("files/uploads/report.txt").is_file());

    std::fs::write(dir.join("files/uploads/report.txt"), "cooked numbers").unwrap();

    let verification = ctx.state.backups.verify(created.id).await.unwrap();
    assert!(!verification.valid);
    assert_ne!(verification.actual_hash, verification.expected_hash);

    let err = ctx.state.backups.restore(created.id).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn test_restore_brings_back_settings_and_files() {
    let ctx = TestContext::new().await;
    let settings = &ctx.state.settings;
    settings.set("general.app_name", "Before").await.unwrap();
    write_file(&ctx.state.storage.files_dir, "logo.svg", "<svg/>");

    let created = ctx
        .state
        .backups
        .create(BackupType::Full, None, None)
        .await
        .unwrap();

    settings.set("general.app_name", "After").await.unwrap();
    std::fs::remove_file(ctx.state.storage.files_dir.join("logo.svg")).unwrap();

    let restored = ctx.state.backups.restore(created.id).await.unwrap();
    assert!(restored.restored_at.is_some());
    assert_eq!(
        settings.get("general.app_name").await.unwrap().as_deref(),
        Some("Before")
    );
    assert!(ctx.state.storage.files_dir.join("logo.svg").is_file());
}

#[tokio::test]
async fn test_expired_backups_are_hidden_and_cleaned() {
    let ctx = TestContext::new().await;
    let backups = &ctx.state.backups;

    let kept = backups.create(BackupType::Database, Some(0), None).await.unwrap();
    let old = backups.create(BackupType::Database, Some(1), None).await.unwrap();
    let old_dir = std::path::PathBuf::from(old.file_path.clone().unwrap());

    let mut active: backup::ActiveModel = old.clone().into();
    active.expires_at = Set(Some(Utc::now() - Duration::hours(1)));
    active.update(&ctx.state.db).await.unwrap();

    let visible = backups.list(false).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, kept.id);
    assert_eq!(backups.list(true).await.unwrap().len(), 2);

    let err = backups.restore(old.id).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    assert_eq!(backups.count_expired(Utc::now()).await.unwrap(), 1);
    assert_eq!(backups.cleanup_expired(Utc::now()).await.unwrap(), 1);
    assert!(!old_dir.exists());
    assert!(matches!(
        backups.get(old.id).await.unwrap_err(),
        AppError::NotFound(_)
    ));

    let stats = backups.stats().await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.completed, 1);
}

#[tokio::test]
async fn test_backup_endpoints() {
    let ctx = TestContext::new().await;
    let editor = login_as(&ctx.state, "editor@example.com", "editor").await;
    let viewer = login_as(&ctx.state, "viewer@example.com", "viewer").await;

    let (status, _) = post(
        ctx.app(),
        "/api/backups",
        &viewer,
        json!({ "backup_type": "database" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = post(
        ctx.app(),
        "/api/backups",
        &editor,
        json!({ "backup_type": "database", "retention_days": 1_000_000_000_000i64 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post(
        ctx.app(),
        "/api/backups",
        &editor,
        json!({ "backup_type": "database", "retention_days": 7 }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["expired"], false);
    let id = body["id"].as_i64().unwrap();

    let (status, body) = get(ctx.app(), &format!("/api/backups/{}/verify", id), &viewer).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);

    let (status, body) = get(ctx.app(), "/api/backups", &viewer).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = get(ctx.app(), "/api/backups/9999", &viewer).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post(
        ctx.app(),
        &format!("/api/backups/{}/restore", id),
        &editor,
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

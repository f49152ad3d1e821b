mod common;

use std::collections::HashMap;

use axum::http::StatusCode;
use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::json;

use backoffice::error::AppError;
use backoffice::models::prelude::AppSetting;
use common::{get, login_as, post, put, TestContext};

#[tokio::test]
async fn test_get_falls_back_to_registry_default() {
    let ctx = TestContext::new().await;
    let settings = &ctx.state.settings;

    assert_eq!(
        settings.get("general.app_name").await.unwrap().as_deref(),
        Some("Back Office")
    );
    assert_eq!(settings.get("custom.unknown").await.unwrap(), None);
    assert!(settings.get_bool("notifications.enabled").await.unwrap());
    assert_eq!(
        settings.get_int("advanced.backup_retention_days").await.unwrap(),
        Some(30)
    );
}

#[tokio::test]
async fn test_set_upserts_and_normalises() {
    let ctx = TestContext::new().await;
    let settings = &ctx.state.settings;

    settings.set("advanced.maintenance_mode", "YES").await.unwrap();
    let saved = settings.set("advanced.maintenance_mode", "off").await.unwrap();
    assert_eq!(saved.value, "false");
    assert_eq!(saved.setting_type, "boolean");

    let rows = AppSetting::find().count(&ctx.state.db).await.unwrap();
    assert_eq!(rows, 1);

    let saved = settings.set("advanced.backup_retention_days", " 14 ").await.unwrap();
    assert_eq!(saved.value, "14");

    let err = settings
        .set("advanced.backup_retention_days", "forever")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let saved = settings.set("custom.flag", "anything").await.unwrap();
    assert_eq!(saved.setting_type, "string");
}

#[tokio::test]
async fn test_section_cache_is_invalidated_on_write() {
    let ctx = TestContext::new().await;
    let settings = &ctx.state.settings;

    let before = settings.section("general").await.unwrap();
    assert_eq!(before["general.app_name"], "Back Office");
    assert!(settings.cache().get("settings.section.general").await.is_some());

    settings.set("general.app_name", "Acme").await.unwrap();
    assert!(settings.cache().get("settings.section.general").await.is_none());

    let after = settings.section("general").await.unwrap();
    assert_eq!(after["general.app_name"], "Acme");
}

#[tokio::test]
async fn test_update_section_rejects_foreign_keys() {
    let ctx = TestContext::new().await;
    let settings = &ctx.state.settings;

    let values = HashMap::from([
        ("app_name".to_string(), "Acme".to_string()),
        ("security.password_min_length".to_string(), "12".to_string()),
    ]);
    let err = settings.update_section("general", values).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    // Nothing from a rejected update is written
    assert_eq!(
        settings.get("general.app_name").await.unwrap().as_deref(),
        Some("Back Office")
    );

    let err = settings
        .update_section("plugins", HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_reset_section_restores_defaults() {
    let ctx = TestContext::new().await;
    let settings = &ctx.state.settings;

    settings.set("security.password_min_length", "12").await.unwrap();
    settings.set("security.max_login_attempts", "3").await.unwrap();
    settings.set("general.app_name", "Acme").await.unwrap();

    let removed = settings.reset_section("security").await.unwrap();
    assert_eq!(removed, 2);

    let security = settings.section("security").await.unwrap();
    assert_eq!(security["security.password_min_length"], "8");
    assert_eq!(
        settings.get("general.app_name").await.unwrap().as_deref(),
        Some("Acme")
    );
}

#[tokio::test]
async fn test_footer_generates_copyright() {
    let ctx = TestContext::new().await;
    let settings = &ctx.state.settings;

    settings.set("general.app_name", "Acme").await.unwrap();
    let footer = settings.footer().await.unwrap();
    assert!(footer.copyright.ends_with("Acme"));
    assert!(footer.show_version);
    assert_eq!(footer.version.as_deref(), Some(env!("CARGO_PKG_VERSION")));

    settings
        .set("appearance.footer_show_version", "false")
        .await
        .unwrap();
    let footer = settings.footer().await.unwrap();
    assert!(!footer.show_version);
    assert!(footer.version.is_none());
}

#[tokio::test]
async fn test_repair_fixes_stored_values() {
    let ctx = TestContext::new().await;
    let settings = &ctx.state.settings;
    let storage = ctx.storage.path();

    let logo = storage.join("branding").join("logo.png");
    settings
        .set("appearance.logo_path", &logo.to_string_lossy())
        .await
        .unwrap();
    settings
        .set("general.app_url", "https://admin.example.com/#/home")
        .await
        .unwrap();
    settings.set("general.app_name", "  Acme  ").await.unwrap();

    let planned = settings.repair(storage, true).await.unwrap();
    assert_eq!(planned.len(), 3);
    assert_eq!(
        settings.get("general.app_name").await.unwrap().as_deref(),
        Some("  Acme  ")
    );

    let applied = settings.repair(storage, false).await.unwrap();
    assert_eq!(applied.len(), 3);
    assert_eq!(
        settings.get("appearance.logo_path").await.unwrap().as_deref(),
        Some("branding/logo.png")
    );
    assert_eq!(
        settings.get("general.app_url").await.unwrap().as_deref(),
        Some("https://admin.example.com")
    );
    assert!(settings.repair(storage, false).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_settings_endpoints() {
    let ctx = TestContext::new().await;
    let token = login_as(&ctx.state, "editor@example.com", "editor").await;

    let (status, body) = get(ctx.app(), "/api/settings", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["advanced"].is_object());

    let (status, body) = put(
        ctx.app(),
        "/api/settings/notifications",
        &token,
        json!({ "values": { "enabled": "no" } }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["values"]["notifications.enabled"], "false");

    let (status, _) = put(
        ctx.app(),
        "/api/settings/notifications",
        &token,
        json!({ "values": { "enabled": "sometimes" } }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(ctx.app(), "/api/settings/plugins", &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = post(
        ctx.app(),
        "/api/settings/notifications/reset",
        &token,
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 1);

    let (status, body) = get(ctx.app(), "/api/settings/appearance/footer", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["text"], "Powered by Back Office");
}

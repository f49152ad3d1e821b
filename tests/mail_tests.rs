mod common;

use std::collections::HashMap;

use axum::http::StatusCode;
use serde_json::json;

use backoffice::error::AppError;
use backoffice::services::mail::smtp::{self, SmtpConfigInput};
use backoffice::services::mail::templates::{self, EmailTemplateInput};
use common::{delete, get, login_as, post, put, TestContext};

fn smtp_input(name: &str) -> SmtpConfigInput {
    serde_json::from_value(json!({
        "name": name,
        "host": "smtp.example.com",
        "username": "mailer",
        "password": "secret",
        "from_address": "noreply@example.com",
        "from_name": "Back Office"
    }))
    .unwrap()
}

#[tokio::test]
async fn test_first_config_becomes_default() {
    let ctx = TestContext::new().await;
    let db = &ctx.state.db;

    let primary = smtp::create(db, smtp_input("primary")).await.unwrap();
    assert!(primary.is_default);
    assert_eq!(primary.port, 587);

    let backup = smtp::create(db, smtp_input("backup")).await.unwrap();
    assert!(!backup.is_default);

    smtp::set_default(db, backup.id).await.unwrap();
    let defaults: Vec<_> = smtp::list(db)
        .await
        .unwrap()
        .into_iter()
        .filter(|c| c.is_default)
        .collect();
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0].id, backup.id);

    smtp::delete(db, backup.id).await.unwrap();
    let promoted = smtp::get(db, primary.id).await.unwrap();
    assert!(promoted.is_default);
}

#[tokio::test]
async fn test_invalid_smtp_config_rejected() {
    let ctx = TestContext::new().await;
    let db = &ctx.state.db;

    let mut input = smtp_input("broken");
    input.encryption = "rot13".to_string();
    let err = smtp::create(db, input).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let mut input = smtp_input("no-password");
    input.password = None;
    let err = smtp::create(db, input).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    smtp::create(db, smtp_input("primary")).await.unwrap();
    let err = smtp::create(db, smtp_input("primary")).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_update_keeps_password_when_omitted() {
    let ctx = TestContext::new().await;
    let db = &ctx.state.db;
    let created = smtp::create(db, smtp_input("primary")).await.unwrap();

    let mut input = smtp_input("primary");
    input.password = None;
    input.port = 2525;
    let updated = smtp::update(db, created.id, input).await.unwrap();
    assert_eq!(updated.port, 2525);
    assert_eq!(updated.password.as_deref(), Some("secret"));
}

#[tokio::test]
async fn test_deactivating_default_promotes_another() {
    let ctx = TestContext::new().await;
    let db = &ctx.state.db;
    let primary = smtp::create(db, smtp_input("primary")).await.unwrap();
    let backup = smtp::create(db, smtp_input("backup")).await.unwrap();
    assert!(primary.is_default);

    let mut input = smtp_input("primary");
    input.is_active = false;
    let deactivated = smtp::update(db, primary.id, input).await.unwrap();
    assert!(!deactivated.is_active);
    assert!(!deactivated.is_default);

    let default = smtp::default_config(db).await.unwrap().unwrap();
    assert_eq!(default.id, backup.id);

    // With nothing left to promote, the flag stays where it was
    let mut input = smtp_input("backup");
    input.is_active = false;
    let last = smtp::update(db, backup.id, input).await.unwrap();
    assert!(last.is_default);
    assert!(smtp::default_config(db).await.unwrap().is_none());

    // Reactivating brings it back
    smtp::update(db, backup.id, smtp_input("backup")).await.unwrap();
    assert_eq!(
        smtp::default_config(db).await.unwrap().unwrap().id,
        backup.id
    );
}

#[tokio::test]
async fn test_template_preview_leaves_unknown_placeholders() {
    let ctx = TestContext::new().await;
    let db = &ctx.state.db;

    let created = templates::create(
        db,
        EmailTemplateInput {
            name: "invoice".to_string(),
            subject: "Invoice {{ number }}".to_string(),
            body_html: "<p>Dear {{ name }}, you owe {{ amount }}</p>".to_string(),
            body_text: None,
            variables: None,
            category: "billing".to_string(),
            is_active: true,
        },
    )
    .await
    .unwrap();

    let declared: Vec<String> = serde_json::from_str(&created.variables).unwrap();
    assert_eq!(declared, vec!["amount", "name", "number"]);

    let vars = HashMap::from([
        ("number".to_string(), "42".to_string()),
        ("name".to_string(), "Ada".to_string()),
    ]);
    let preview = templates::preview(db, created.id, &vars).await.unwrap();
    assert_eq!(preview.subject, "Invoice 42");
    assert_eq!(preview.html, "<p>Dear Ada, you owe {{ amount }}</p>");
    assert_eq!(preview.missing_variables, vec!["amount"]);
}

#[tokio::test]
async fn test_send_template_with_log_driver() {
    let ctx = TestContext::new().await;
    ctx.state.settings.set("general.app_name", "Acme").await.unwrap();

    let vars = HashMap::from([("sent_at".to_string(), "noon".to_string())]);
    let rendered = ctx
        .state
        .mail
        .send_template("test_email", vec!["ops@example.com".to_string()], &vars)
        .await
        .unwrap();
    assert_eq!(rendered.subject, "Acme test email");

    let sent = ctx.state.mail.recent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, vec!["ops@example.com"]);

    let err = ctx
        .state
        .mail
        .send_template("does_not_exist", vec!["ops@example.com".to_string()], &vars)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_inactive_template_is_not_sent() {
    let ctx = TestContext::new().await;
    let db = &ctx.state.db;
    let welcome = templates::get_by_name(db, "welcome").await.unwrap();

    templates::update(
        db,
        welcome.id,
        EmailTemplateInput {
            name: welcome.name.clone(),
            subject: welcome.subject.clone(),
            body_html: welcome.body_html.clone(),
            body_text: welcome.body_text.clone(),
            variables: None,
            category: welcome.category.clone(),
            is_active: false,
        },
    )
    .await
    .unwrap();

    let err = ctx
        .state
        .mail
        .send_template("welcome", vec!["a@example.com".to_string()], &HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert!(ctx.state.mail.recent().is_empty());
}

#[tokio::test]
async fn test_mail_endpoints_mask_password() {
    let ctx = TestContext::new().await;
    let editor = login_as(&ctx.state, "editor@example.com", "editor").await;

    let (status, body) = post(
        ctx.app(),
        "/api/mail/smtp",
        &editor,
        json!({
            "name": "primary",
            "host": "smtp.example.com",
            "username": "mailer",
            "password": "secret",
            "from_address": "noreply@example.com"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["has_password"], true);
    assert!(body.get("password").is_none());
    let id = body["id"].as_i64().unwrap();

    let (status, body) = get(ctx.app(), &format!("/api/mail/smtp/{}/validate", id), &editor).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);

    let (status, _) = put(
        ctx.app(),
        &format!("/api/mail/smtp/{}", id),
        &editor,
        json!({
            "name": "primary",
            "host": "smtp.example.com",
            "from_address": "not-an-address"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, templates) = get(ctx.app(), "/api/mail/templates", &editor).await;
    assert_eq!(status, StatusCode::OK);
    let welcome = templates
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["name"] == "welcome")
        .unwrap();

    let (status, preview) = post(
        ctx.app(),
        &format!("/api/mail/templates/{}/preview", welcome["id"]),
        &editor,
        json!({ "vars": { "name": "Ada", "app_name": "Acme" } }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(preview["subject"], "Welcome to Acme, Ada");

    let (status, _) = delete(ctx.app(), &format!("/api/mail/smtp/{}", id), &editor).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

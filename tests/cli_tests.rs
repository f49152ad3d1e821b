//! Management commands run against a test state

mod common;

use clap::Parser;

use backoffice::cli::{run_command, Cli};
use backoffice::services::accounts;
use backoffice::services::jobs;
use common::TestContext;

async fn run(ctx: &TestContext, args: &[&str]) -> anyhow::Result<()> {
    let mut argv = vec!["backoffice"];
    argv.extend_from_slice(args);
    let cli = Cli::try_parse_from(argv)?;
    run_command(&ctx.state, cli.command).await
}

#[tokio::test]
async fn test_user_create_and_assign_role() {
    let ctx = TestContext::new().await;

    run(
        &ctx,
        &[
            "user",
            "create",
            "--name",
            "Root",
            "--email",
            "root@example.com",
            "--password",
            "a-long-password",
            "--role",
            "admin",
            "--verified",
        ],
    )
    .await
    .unwrap();

    let user = accounts::find_user_by_email(&ctx.state.db, "root@example.com")
        .await
        .unwrap();
    assert!(user.email_verified_at.is_some());
    let roles = accounts::get_user_roles(&ctx.state.db, user.id).await.unwrap();
    assert_eq!(roles.len(), 1);
    assert_eq!(roles[0].name, "admin");

    run(&ctx, &["user", "assign-role", "root@example.com", "editor"])
        .await
        .unwrap();
    run(&ctx, &["user", "assign-role", "root@example.com", "admin", "--remove"])
        .await
        .unwrap();
    let roles = accounts::get_user_roles(&ctx.state.db, user.id).await.unwrap();
    assert_eq!(roles.len(), 1);
    assert_eq!(roles[0].name, "editor");

    // Unknown roles are rejected before the user is created
    let err = run(
        &ctx,
        &[
            "user",
            "create",
            "--name",
            "Ghost",
            "--email",
            "ghost@example.com",
            "--password",
            "a-long-password",
            "--role",
            "overlord",
        ],
    )
    .await;
    assert!(err.is_err());
    assert!(accounts::find_user_by_email(&ctx.state.db, "ghost@example.com")
        .await
        .is_err());
}

#[tokio::test]
async fn test_user_password_policy_and_unlock() {
    let ctx = TestContext::new().await;
    ctx.state
        .settings
        .set("security.password_min_length", "16")
        .await
        .unwrap();

    let create = |password: &'static str| {
        [
            "user",
            "create",
            "--name",
            "Ops",
            "--email",
            "ops@example.com",
            "--password",
            password,
        ]
    };
    assert!(run(&ctx, &create("short-password")).await.is_err());
    run(&ctx, &create("a-much-longer-password")).await.unwrap();

    let mut user = accounts::find_user_by_email(&ctx.state.db, "ops@example.com")
        .await
        .unwrap();
    for _ in 0..5 {
        user = accounts::record_failed_login(&ctx.state.db, &user, 5)
            .await
            .unwrap();
    }
    assert_eq!(user.failed_login_count, 5);
    assert!(accounts::lockout_remaining(&user, chrono::Utc::now()).is_some());

    run(&ctx, &["user", "unlock", "ops@example.com"]).await.unwrap();
    let user = accounts::get_user(&ctx.state.db, user.id).await.unwrap();
    assert_eq!(user.failed_login_count, 0);
    assert!(user.locked_until.is_none());
}

#[tokio::test]
async fn test_backup_commands() {
    let ctx = TestContext::new().await;

    run(&ctx, &["backup:manage", "create", "--type", "full", "--retention", "3"])
        .await
        .unwrap();
    let backups = ctx.state.backups.list(true).await.unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(backups[0].backup_type, "full");
    let id = backups[0].id.to_string();

    run(&ctx, &["backup", "verify", &id]).await.unwrap();
    run(&ctx, &["backup", "list", "--all"]).await.unwrap();

    // Restoring needs an explicit --force
    assert!(run(&ctx, &["backup", "restore", &id]).await.is_err());
    run(&ctx, &["backup", "restore", &id, "--force"]).await.unwrap();

    run(&ctx, &["backup", "delete", &id]).await.unwrap();
    assert!(ctx.state.backups.list(true).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_settings_commands() {
    let ctx = TestContext::new().await;

    run(&ctx, &["settings", "set", "advanced.maintenance_mode", "on"])
        .await
        .unwrap();
    assert!(ctx
        .state
        .settings
        .get_bool("advanced.maintenance_mode")
        .await
        .unwrap());

    assert!(run(&ctx, &["settings", "set", "security.max_login_attempts", "lots"])
        .await
        .is_err());

    run(&ctx, &["settings", "reset", "advanced"]).await.unwrap();
    assert!(!ctx
        .state
        .settings
        .get_bool("advanced.maintenance_mode")
        .await
        .unwrap());

    run(&ctx, &["settings", "list", "--section", "general"])
        .await
        .unwrap();
    run(&ctx, &["settings", "repair", "--dry-run"]).await.unwrap();
}

#[tokio::test]
async fn test_jobs_commands() {
    let ctx = TestContext::new().await;

    run(
        &ctx,
        &["jobs:manage", "dispatch", "cleanup", "--payload", "{\"dry_run\":true}", "--priority", "1"],
    )
    .await
    .unwrap();
    let pending = jobs::pending(&ctx.state.db, Some("high")).await.unwrap();
    assert_eq!(pending.len(), 1);

    assert!(Cli::try_parse_from(["backoffice", "jobs", "dispatch", "cleanup", "--priority", "7"]).is_err());
    assert!(run(&ctx, &["jobs", "dispatch", "cleanup", "--payload", "{not json"])
        .await
        .is_err());

    run(&ctx, &["jobs", "work", "--stop-when-empty"]).await.unwrap();
    assert!(jobs::pending(&ctx.state.db, None).await.unwrap().is_empty());

    run(&ctx, &["jobs", "stats"]).await.unwrap();
    assert!(run(&ctx, &["jobs", "flush", "--older-than", "4294967295"])
        .await
        .is_err());
    run(&ctx, &["jobs", "flush"]).await.unwrap();
}

#[tokio::test]
async fn test_system_maintenance_commands() {
    let ctx = TestContext::new().await;

    run(&ctx, &["system:maintenance", "on", "--message", "Upgrading"])
        .await
        .unwrap();
    let status = backoffice::services::system::maintenance_status(&ctx.state.settings)
        .await
        .unwrap();
    assert!(status.enabled);
    assert_eq!(status.message, "Upgrading");

    run(&ctx, &["system", "maintenance", "off"]).await.unwrap();
    run(&ctx, &["system:status"]).await.unwrap();
    run(&ctx, &["system:monitor", "--interval", "1", "--iterations", "1"])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_validate_and_cleanup_commands() {
    let ctx = TestContext::new().await;

    // No administrator yet
    assert!(run(&ctx, &["validate", "permissions"]).await.is_err());
    run(&ctx, &["validate", "mail"]).await.unwrap();
    assert!(Cli::try_parse_from(["backoffice", "validate", "network"]).is_err());

    run(&ctx, &["cleanup:manage", "run", "--dry-run"]).await.unwrap();
    run(&ctx, &["cleanup", "run", "--only", "cache"]).await.unwrap();
    run(&ctx, &["cleanup", "targets"]).await.unwrap();
}

use anyhow::Result;
use chrono::Utc;
use clap::Subcommand;

use crate::cli::output::{self, format_bytes, print_table};
use crate::models::audit_log::{AuditAction, ResourceType};
use crate::models::backup::BackupType;
use crate::services::audit::Actor;
use crate::services::backup::BackupService;
use crate::state::AppState;

#[derive(Debug, Subcommand)]
pub enum BackupCommand {
    /// Create a backup now
    Create {
        /// database, files or full
        #[arg(short = 't', long = "type", default_value = "database", value_parser = parse_backup_type)]
        backup_type: BackupType,
        /// Days to keep the backup; 0 keeps it forever
        #[arg(long)]
        retention: Option<i64>,
    },
    /// List backups
    List {
        /// Include expired backups
        #[arg(long)]
        all: bool,
    },
    /// Restore a backup
    Restore {
        id: i64,
        /// Skip the confirmation
        #[arg(long)]
        force: bool,
    },
    /// Delete a backup
    Delete { id: i64 },
    /// Check a backup against its recorded hash
    Verify { id: i64 },
    /// Delete every expired backup
    Cleanup {
        /// Only report what would be removed
        #[arg(long)]
        dry_run: bool,
    },
}

fn parse_backup_type(s: &str) -> Result<BackupType, String> {
    BackupType::parse(s).ok_or_else(|| format!("unknown backup type '{}'", s))
}

pub async fn run(state: &AppState, command: BackupCommand) -> Result<()> {
    let actor = Actor::console();
    match command {
        BackupCommand::Create {
            backup_type,
            retention,
        } => {
            println!("Creating {} backup...", backup_type);
            let created = state.backups.create(backup_type, retention, None).await?;
            let details = Some(serde_json::json!({ "name": created.name }));
            if !created.is_completed() {
                let reason = created
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string());
                state
                    .audit
                    .log_failure(
                        AuditAction::BackupFailed,
                        ResourceType::Backup,
                        Some(created.id.to_string()),
                        &actor,
                        details,
                        &reason,
                    )
                    .await;
                anyhow::bail!("Backup {} failed: {}", created.name, reason);
            }

            state
                .audit
                .log_success(
                    AuditAction::BackupCreated,
                    ResourceType::Backup,
                    Some(created.id.to_string()),
                    &actor,
                    details,
                )
                .await;
            output::success(format!(
                "Backup {} created ({})",
                created.name,
                format_bytes(created.file_size.unwrap_or(0).max(0) as u64)
            ));
            if let Some(expires_at) = created.expires_at {
                println!("Expires at {}", expires_at.format("%Y-%m-%d %H:%M"));
            }
        }
        BackupCommand::List { all } => {
            let now = Utc::now();
            let rows: Vec<Vec<String>> = state
                .backups
                .list(all)
                .await?
                .into_iter()
                .map(|b| {
                    let expired = BackupService::is_expired(&b, now);
                    vec![
                        b.id.to_string(),
                        b.name,
                        b.backup_type,
                        if expired { "expired".to_string() } else { b.status },
                        format_bytes(b.file_size.unwrap_or(0).max(0) as u64),
                        b.created_at.format("%Y-%m-%d %H:%M").to_string(),
                        b.expires_at
                            .map(|e| e.format("%Y-%m-%d %H:%M").to_string())
                            .unwrap_or_else(|| "never".to_string()),
                    ]
                })
                .collect();
            print_table(
                &["ID", "Name", "Type", "Status", "Size", "Created", "Expires"],
                &rows,
            );
        }
        BackupCommand::Restore { id, force } => {
            let backup = state.backups.get(id).await?;
            if !force {
                anyhow::bail!(
                    "Restoring {} overwrites settings, SMTP configs and templates; rerun with --force",
                    backup.name
                );
            }
            let restored = state.backups.restore(id).await?;
            state
                .audit
                .log_success(
                    AuditAction::BackupRestored,
                    ResourceType::Backup,
                    Some(id.to_string()),
                    &actor,
                    Some(serde_json::json!({ "name": restored.name })),
                )
                .await;
            output::success(format!("Backup {} restored", restored.name));
        }
        BackupCommand::Delete { id } => {
            let deleted = state.backups.delete(id).await?;
            state
                .audit
                .log_success(
                    AuditAction::BackupDeleted,
                    ResourceType::Backup,
                    Some(id.to_string()),
                    &actor,
                    Some(serde_json::json!({ "name": deleted.name })),
                )
                .await;
            output::success(format!("Backup {} deleted", deleted.name));
        }
        BackupCommand::Verify { id } => {
            let verification = state.backups.verify(id).await?;
            if !verification.valid {
                anyhow::bail!("Backup {} is invalid: {}", id, verification.message);
            }
            output::success(format!("Backup {}: {}", id, verification.message));
        }
        BackupCommand::Cleanup { dry_run } => {
            let now = Utc::now();
            if dry_run {
                let expired = state.backups.expired(now).await?;
                for b in &expired {
                    println!("Would delete {}", b.name);
                }
                output::success(format!("{} expired backup(s) would be removed", expired.len()));
            } else {
                let removed = state.backups.cleanup_expired(now).await?;
                state
                    .audit
                    .log_success(
                        AuditAction::CleanupRun,
                        ResourceType::Backup,
                        None,
                        &actor,
                        Some(serde_json::json!({ "removed": removed })),
                    )
                    .await;
                output::success(format!("Removed {} expired backup(s)", removed));
            }
        }
    }
    Ok(())
}

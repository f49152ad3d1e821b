use anyhow::Result;
use clap::Subcommand;

use crate::cli::output::{self, print_table};
use crate::models::audit_log::{AuditAction, ResourceType};
use crate::services::audit::Actor;
use crate::services::jobs::{handlers::default_worker, QUEUE_HIGH};
use crate::services::notification::NotificationKind;
use crate::state::AppState;

#[derive(Debug, Subcommand)]
pub enum NotificationCommand {
    /// Show which notifications are enabled and who receives them
    Status,
    /// Queue a test notification
    Test {
        email: String,
        /// Process the queued mail immediately instead of leaving it to the workers
        #[arg(long)]
        now: bool,
    },
    /// Enable a notification kind (backup_failure, job_failure, test)
    Enable {
        #[arg(value_parser = parse_kind)]
        kind: NotificationKind,
    },
    /// Disable a notification kind
    Disable {
        #[arg(value_parser = parse_kind)]
        kind: NotificationKind,
    },
}

fn parse_kind(s: &str) -> Result<NotificationKind, String> {
    NotificationKind::parse(s).ok_or_else(|| format!("unknown notification kind '{}'", s))
}

pub async fn run(state: &AppState, command: NotificationCommand) -> Result<()> {
    let notifications = &state.notifications;
    match command {
        NotificationCommand::Status => {
            let status = notifications.status().await?;
            println!(
                "Notifications: {}",
                if status.enabled { "enabled" } else { "disabled" }
            );
            let rows: Vec<Vec<String>> = status
                .kinds
                .iter()
                .map(|k| {
                    vec![
                        k.kind.to_string(),
                        if k.enabled { "on" } else { "off" }.to_string(),
                    ]
                })
                .collect();
            print_table(&["Kind", "State"], &rows);
            if status.recipients.is_empty() {
                output::warning("No recipients: set notifications.recipients or assign the admin role");
            } else {
                println!("Recipients: {}", status.recipients.join(", "));
            }
        }
        NotificationCommand::Test { email, now } => {
            let job_id = notifications.send_test(&email).await?;
            output::success(format!("Test notification queued as job {}", job_id));
            if now {
                let processed = default_worker(state)
                    .drain(&[QUEUE_HIGH.to_string()])
                    .await?;
                output::success(format!("Processed {} job(s) on the {} queue", processed, QUEUE_HIGH));
            }
        }
        NotificationCommand::Enable { kind } => set_enabled(state, kind, true).await?,
        NotificationCommand::Disable { kind } => set_enabled(state, kind, false).await?,
    }
    Ok(())
}

async fn set_enabled(state: &AppState, kind: NotificationKind, enabled: bool) -> Result<()> {
    state.notifications.set_kind_enabled(kind, enabled).await?;
    state
        .audit
        .log_success(
            AuditAction::SettingChanged,
            ResourceType::Setting,
            Some(kind.setting_key()),
            &Actor::console(),
            Some(serde_json::json!({ "enabled": enabled })),
        )
        .await;
    output::success(format!(
        "{} notifications {}",
        kind,
        if enabled { "enabled" } else { "disabled" }
    ));
    Ok(())
}

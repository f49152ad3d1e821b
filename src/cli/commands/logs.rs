use anyhow::Result;
use clap::Subcommand;

use crate::cli::output::print_table;
use crate::services::audit::{get_audit_logs, AuditLogQuery};
use crate::state::AppState;

#[derive(Debug, Subcommand)]
pub enum LogsCommand {
    /// Show recent audit log entries
    Inspect {
        /// Only this action, e.g. backup_created
        #[arg(long)]
        action: Option<String>,
        /// User id, or a name to search for
        #[arg(long)]
        user: Option<String>,
        /// Only failed actions
        #[arg(long)]
        failed: bool,
        #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u64).range(1..=100))]
        limit: u64,
    },
}

pub async fn run(state: &AppState, command: LogsCommand) -> Result<()> {
    match command {
        LogsCommand::Inspect {
            action,
            user,
            failed,
            limit,
        } => {
            let mut query = AuditLogQuery {
                per_page: Some(limit),
                action,
                success: failed.then_some(false),
                ..Default::default()
            };
            match user.as_deref().map(|u| (u, u.parse::<i64>())) {
                Some((_, Ok(id))) => query.user_id = Some(id),
                Some((name, Err(_))) => query.search = Some(name.to_string()),
                None => {}
            }

            let response = get_audit_logs(&state.db, query).await?;
            let rows: Vec<Vec<String>> = response
                .logs
                .into_iter()
                .map(|entry| {
                    vec![
                        entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                        entry.username.unwrap_or_else(|| "-".to_string()),
                        entry.action,
                        match entry.resource_id {
                            Some(id) => format!("{}:{}", entry.resource_type, id),
                            None => entry.resource_type,
                        },
                        if entry.success {
                            "ok".to_string()
                        } else {
                            entry.error_message.unwrap_or_else(|| "failed".to_string())
                        },
                    ]
                })
                .collect();
            print_table(&["Time", "User", "Action", "Resource", "Result"], &rows);
            println!("Showing {} of {} entries", rows.len(), response.total);
        }
    }
    Ok(())
}

use anyhow::Result;
use clap::Subcommand;

use crate::cli::output::{self, print_table};
use crate::models::audit_log::{AuditAction, ResourceType};
use crate::services::audit::Actor;
use crate::services::cleanup::{CleanupOptions, CleanupTarget};
use crate::state::AppState;

#[derive(Debug, Subcommand)]
pub enum CleanupCommand {
    /// Run cleanup for every target or the selected ones
    Run {
        /// Count what would be removed without removing it
        #[arg(long)]
        dry_run: bool,
        /// Limit cleanup to these targets
        #[arg(long = "only", value_parser = parse_target, num_args = 1..)]
        only: Vec<CleanupTarget>,
    },
    /// List the cleanup targets
    Targets,
}

fn parse_target(s: &str) -> Result<CleanupTarget, String> {
    CleanupTarget::parse(s).ok_or_else(|| {
        let known: Vec<&str> = CleanupTarget::all().iter().map(|t| t.as_str()).collect();
        format!("unknown target '{}' (expected one of {})", s, known.join(", "))
    })
}

pub async fn run(state: &AppState, command: CleanupCommand) -> Result<()> {
    match command {
        CleanupCommand::Run { dry_run, only } => {
            let options = CleanupOptions {
                dry_run,
                targets: only,
            };
            let report = state.cleanup.run(&options).await?;

            let rows: Vec<Vec<String>> = report
                .items
                .iter()
                .map(|item| vec![item.target.to_string(), item.count.to_string()])
                .collect();
            let header = if dry_run { "Would remove" } else { "Removed" };
            print_table(&["Target", header], &rows);

            if dry_run {
                output::success(format!("Dry run: {} item(s) would be removed", report.total()));
            } else {
                state
                    .audit
                    .log_success(
                        AuditAction::CleanupRun,
                        ResourceType::System,
                        None,
                        &Actor::console(),
                        Some(serde_json::to_value(&report)?),
                    )
                    .await;
                output::success(format!("Cleanup finished: {} item(s) removed", report.total()));
            }
        }
        CleanupCommand::Targets => {
            for target in CleanupTarget::all() {
                println!("{}", target);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_reports_known_targets() {
        assert_eq!(parse_target("audit"), Ok(CleanupTarget::AuditLogs));
        let err = parse_target("everything").unwrap_err();
        assert!(err.contains("temp_files"));
    }
}

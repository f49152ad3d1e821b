use std::time::Duration;

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::cli::output::{self, format_bytes, print_table};
use crate::models::audit_log::{AuditAction, ResourceType};
use crate::services::audit::Actor;
use crate::services::system::{self, SystemStatus, Thresholds};
use crate::state::AppState;

#[derive(Debug, Subcommand)]
pub enum SystemCommand {
    /// Database, queue, backup and maintenance overview
    Status,
    /// Inspect or toggle maintenance mode
    Maintenance {
        #[command(subcommand)]
        action: MaintenanceAction,
    },
    /// Sample the system status periodically and flag thresholds
    Monitor(MonitorArgs),
}

#[derive(Debug, Subcommand)]
pub enum MaintenanceAction {
    /// Turn maintenance mode on
    On {
        /// Message shown to API clients
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Turn maintenance mode off
    Off,
    /// Show whether maintenance mode is on
    Status,
}

#[derive(Debug, Args)]
pub struct MonitorArgs {
    /// Seconds between samples
    #[arg(long, default_value_t = 60)]
    pub interval: u64,
    /// Number of samples; runs until interrupted when omitted
    #[arg(long)]
    pub iterations: Option<u32>,
    #[arg(long, default_value_t = Thresholds::default().max_failed_jobs)]
    pub max_failed: u64,
    #[arg(long, default_value_t = Thresholds::default().max_pending_jobs)]
    pub max_pending: u64,
}

pub async fn run(state: &AppState, command: SystemCommand) -> Result<()> {
    match command {
        SystemCommand::Status => {
            let status = SystemStatus::collect(state).await?;
            print_status(&status);
            if !status.database_ok {
                anyhow::bail!("Database is unreachable");
            }
        }
        SystemCommand::Maintenance { action } => maintenance(state, action).await?,
        SystemCommand::Monitor(args) => {
            let thresholds = Thresholds {
                max_failed_jobs: args.max_failed,
                max_pending_jobs: args.max_pending,
            };
            let interval = Duration::from_secs(args.interval.max(1));
            let mut alerting_samples = 0;
            let samples = system::monitor(state, interval, args.iterations, thresholds, |status, alerts| {
                println!(
                    "[{}] db={} pending={} failed={} backups={}/{} maintenance={}",
                    status.checked_at.format("%H:%M:%S"),
                    if status.database_ok { "ok" } else { "down" },
                    status.pending_jobs,
                    status.failed_jobs,
                    status.backups.active,
                    status.backups.failed,
                    if status.maintenance.enabled { "on" } else { "off" },
                );
                for alert in alerts {
                    output::warning(alert);
                }
                if !alerts.is_empty() {
                    alerting_samples += 1;
                }
            })
            .await?;
            if alerting_samples > 0 {
                anyhow::bail!("{} of {} sample(s) breached a threshold", alerting_samples, samples);
            }
            output::success(format!("{} sample(s), no thresholds breached", samples));
        }
    }
    Ok(())
}

async fn maintenance(state: &AppState, action: MaintenanceAction) -> Result<()> {
    let status = match action {
        MaintenanceAction::On { message } => {
            system::set_maintenance(&state.settings, true, message.as_deref()).await?
        }
        MaintenanceAction::Off => system::set_maintenance(&state.settings, false, None).await?,
        MaintenanceAction::Status => {
            let status = system::maintenance_status(&state.settings).await?;
            if status.enabled {
                println!("Maintenance mode is ON: {}", status.message);
            } else {
                println!("Maintenance mode is off");
            }
            return Ok(());
        }
    };

    let action = if status.enabled {
        AuditAction::MaintenanceEnabled
    } else {
        AuditAction::MaintenanceDisabled
    };
    state
        .audit
        .log_success(
            action,
            ResourceType::System,
            None,
            &Actor::console(),
            Some(serde_json::json!({ "message": status.message })),
        )
        .await;

    if status.enabled {
        output::success(format!("Maintenance mode enabled: {}", status.message));
    } else {
        output::success("Maintenance mode disabled");
    }
    Ok(())
}

fn print_status(status: &SystemStatus) {
    println!("Back office v{}", status.version);
    println!("Checked at:   {}", status.checked_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Uptime:       {}s", status.uptime_secs);
    println!("Database:     {}", if status.database_ok { "ok" } else { "unreachable" });
    println!("Users:        {}", status.users);
    println!(
        "Maintenance:  {}",
        if status.maintenance.enabled { "on" } else { "off" }
    );
    println!();

    let rows: Vec<Vec<String>> = status
        .queues
        .iter()
        .map(|q| {
            vec![
                q.queue.clone(),
                q.ready.to_string(),
                q.delayed.to_string(),
                q.reserved.to_string(),
            ]
        })
        .collect();
    print_table(&["Queue", "Ready", "Delayed", "Reserved"], &rows);
    println!("Pending jobs: {}  Failed jobs: {}", status.pending_jobs, status.failed_jobs);
    println!();
    println!(
        "Backups: {} active, {} expired, {} failed, {} on disk",
        status.backups.active,
        status.backups.expired,
        status.backups.failed,
        format_bytes(status.backups.dir_size)
    );
}

//! Management commands
//!
//! Every subcommand runs against the same services the HTTP API uses. The
//! colon-separated names of the old console (`backup:manage`, ...) are kept
//! as aliases.

use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod commands;
pub mod output;

use crate::bootstrapper::{self, ServeOptions};
use crate::config::CONFIG;
use crate::db;
use crate::state::AppState;
use commands::{
    backup::BackupCommand, cleanup::CleanupCommand, jobs::JobsCommand, logs::LogsCommand,
    mail::MailCommand, notification::NotificationCommand, settings::SettingsCommand,
    system::SystemCommand, user::UserCommand, validate::ValidateArgs,
};

#[derive(Debug, Parser)]
#[command(name = "backoffice")]
#[command(about = "Administrative back office: HTTP API and management commands")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the HTTP API with queue workers and the scheduler
    Serve {
        #[arg(long, env = "BACKOFFICE_HOST")]
        host: Option<String>,
        #[arg(short, long, env = "BACKOFFICE_PORT")]
        port: Option<u16>,
        /// Do not start queue workers in this process
        #[arg(long)]
        no_workers: bool,
        /// Do not start the periodic task scheduler in this process
        #[arg(long)]
        no_scheduler: bool,
    },
    /// Run database migrations
    Migrate,
    /// Create, list, verify, restore and delete backups
    #[command(subcommand)]
    #[command(alias = "backup:manage")]
    Backup(BackupCommand),
    /// Remove expired backups, old failed jobs and audit entries, temp files
    #[command(subcommand)]
    #[command(alias = "cleanup:manage")]
    Cleanup(CleanupCommand),
    /// Inspect and toggle administrator notifications
    #[command(subcommand)]
    #[command(alias = "notification:manage")]
    Notification(NotificationCommand),
    /// Dispatch, inspect, retry and work queued jobs
    #[command(subcommand)]
    #[command(alias = "jobs:manage")]
    Jobs(JobsCommand),
    /// System status, maintenance mode and monitoring
    #[command(subcommand)]
    System(SystemCommand),
    /// Read and write application settings
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Manage users and their roles
    #[command(subcommand)]
    User(UserCommand),
    /// Send test mail and list templates
    #[command(subcommand)]
    Mail(MailCommand),
    /// Inspect the audit log
    #[command(subcommand)]
    Logs(LogsCommand),
    /// Run diagnostic checks
    Validate(ValidateArgs),

    // Colon names of the system commands
    #[command(name = "system:status", hide = true)]
    SystemStatus,
    #[command(name = "system:maintenance", hide = true)]
    SystemMaintenance {
        #[command(subcommand)]
        action: commands::system::MaintenanceAction,
    },
    #[command(name = "system:monitor", hide = true)]
    SystemMonitor(commands::system::MonitorArgs),
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Serve {
                host,
                port,
                no_workers,
                no_scheduler,
            } => {
                let defaults = ServeOptions::default();
                bootstrapper::run(ServeOptions {
                    host: host.unwrap_or(defaults.host),
                    port: port.unwrap_or(defaults.port),
                    workers: !no_workers,
                    scheduler: !no_scheduler,
                })
                .await
            }
            Commands::Migrate => {
                println!("Running migrations against {}", redact_url(&CONFIG.database.database_url));
                db::connect().await?;
                output::success("Database migrations completed");
                Ok(())
            }
            command => {
                let state = bootstrapper::init_state().await?;
                run_command(&state, command).await
            }
        }
    }
}

/// Run a command that needs the application state
pub async fn run_command(state: &AppState, command: Commands) -> Result<()> {
    match command {
        Commands::Backup(cmd) => commands::backup::run(state, cmd).await,
        Commands::Cleanup(cmd) => commands::cleanup::run(state, cmd).await,
        Commands::Notification(cmd) => commands::notification::run(state, cmd).await,
        Commands::Jobs(cmd) => commands::jobs::run(state, cmd).await,
        Commands::System(cmd) => commands::system::run(state, cmd).await,
        Commands::SystemStatus => commands::system::run(state, SystemCommand::Status).await,
        Commands::SystemMaintenance { action } => {
            commands::system::run(state, SystemCommand::Maintenance { action }).await
        }
        Commands::SystemMonitor(args) => {
            commands::system::run(state, SystemCommand::Monitor(args)).await
        }
        Commands::Settings(cmd) => commands::settings::run(state, cmd).await,
        Commands::User(cmd) => commands::user::run(state, cmd).await,
        Commands::Mail(cmd) => commands::mail::run(state, cmd).await,
        Commands::Logs(cmd) => commands::logs::run(state, cmd).await,
        Commands::Validate(args) => commands::validate::run(state, args).await,
        Commands::Serve { .. } | Commands::Migrate => {
            anyhow::bail!("This command does not run against an existing state")
        }
    }
}

/// Hide the password of a connection URL
fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((credentials, host)) = rest.split_once('@') else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{}://{}:***@{}", scheme, user, host),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_colon_aliases_parse() {
        let cli = Cli::try_parse_from(["backoffice", "backup:manage", "list"]).unwrap();
        assert!(matches!(cli.command, Commands::Backup(BackupCommand::List { .. })));

        let cli = Cli::try_parse_from(["backoffice", "system:status"]).unwrap();
        assert!(matches!(cli.command, Commands::SystemStatus));

        let cli = Cli::try_parse_from(["backoffice", "jobs:manage", "stats"]).unwrap();
        assert!(matches!(cli.command, Commands::Jobs(JobsCommand::Stats)));
    }

    #[test]
    fn test_redact_url() {
        assert_eq!(
            redact_url("postgres://admin:secret@db:5432/app"),
            "postgres://admin:***@db:5432/app"
        );
        assert_eq!(redact_url("sqlite://backoffice.db?mode=rwc"), "sqlite://backoffice.db?mode=rwc");
    }
}

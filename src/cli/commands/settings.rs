use anyhow::Result;
use clap::Subcommand;

use crate::cli::output::{self, print_table};
use crate::models::audit_log::{AuditAction, ResourceType};
use crate::services::audit::Actor;
use crate::state::AppState;

#[derive(Debug, Subcommand)]
pub enum SettingsCommand {
    /// Print one setting
    Get { key: String },
    /// Store a setting
    Set { key: String, value: String },
    /// List settings, optionally for one section
    List {
        #[arg(long)]
        section: Option<String>,
    },
    /// Restore a section to its defaults
    Reset { section: String },
    /// Normalise stored values and fix legacy paths and URLs
    Repair {
        #[arg(long)]
        dry_run: bool,
    },
}

pub async fn run(state: &AppState, command: SettingsCommand) -> Result<()> {
    let settings = &state.settings;
    match command {
        SettingsCommand::Get { key } => match settings.get(&key).await? {
            Some(value) => println!("{}", value),
            None => anyhow::bail!("Setting '{}' is not set and has no default", key),
        },
        SettingsCommand::Set { key, value } => {
            let stored = settings.set(&key, &value).await?;
            state
                .audit
                .log_success(
                    AuditAction::SettingChanged,
                    ResourceType::Setting,
                    Some(key.clone()),
                    &Actor::console(),
                    Some(serde_json::json!({ "value": stored.value })),
                )
                .await;
            output::success(format!("{} = {}", stored.key, stored.value));
        }
        SettingsCommand::List { section } => {
            let prefix = section.map(|s| format!("{}.", s));
            let rows: Vec<Vec<String>> = settings
                .list()
                .await?
                .into_iter()
                .filter(|e| prefix.as_deref().map_or(true, |p| e.key.starts_with(p)))
                .map(|e| {
                    vec![
                        e.key,
                        e.value,
                        e.setting_type,
                        if e.is_default { "default" } else { "stored" }.to_string(),
                    ]
                })
                .collect();
            print_table(&["Key", "Value", "Type", "Source"], &rows);
        }
        SettingsCommand::Reset { section } => {
            let removed = settings.reset_section(&section).await?;
            state
                .audit
                .log_success(
                    AuditAction::SettingsReset,
                    ResourceType::Setting,
                    Some(section.clone()),
                    &Actor::console(),
                    Some(serde_json::json!({ "removed": removed })),
                )
                .await;
            output::success(format!(
                "Section {} reset ({} stored value(s) removed)",
                section, removed
            ));
        }
        SettingsCommand::Repair { dry_run } => {
            let changes = settings.repair(&state.storage.storage_dir, dry_run).await?;
            let rows: Vec<Vec<String>> = changes
                .iter()
                .map(|c| {
                    vec![
                        c.key.clone(),
                        c.old_value.clone(),
                        c.new_value.clone(),
                        c.reason.clone(),
                    ]
                })
                .collect();
            print_table(&["Key", "Old", "New", "Reason"], &rows);

            if dry_run {
                output::success(format!("{} setting(s) would be repaired", changes.len()));
            } else {
                if !changes.is_empty() {
                    state
                        .audit
                        .log_success(
                            AuditAction::SettingChanged,
                            ResourceType::Setting,
                            None,
                            &Actor::console(),
                            Some(serde_json::json!({ "repaired": changes })),
                        )
                        .await;
                }
                output::success(format!("{} setting(s) repaired", changes.len()));
            }
        }
    }
    Ok(())
}

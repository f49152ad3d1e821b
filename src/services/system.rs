//! System status, maintenance mode and monitoring

use std::time::Duration;

use chrono::{DateTime, Utc};
use sea_orm::{EntityTrait, PaginatorTrait};
use serde::Serialize;

use crate::db;
use crate::error::{AppError, Result};
use crate::models::prelude::*;
use crate::services::backup::dir_size;
use crate::services::jobs::{self, QueueCount};
use crate::services::settings::{parse_bool, SettingsService};
use crate::state::AppState;

const MAINTENANCE_KEY: &str = "advanced.maintenance_mode";
const MAINTENANCE_MESSAGE_KEY: &str = "advanced.maintenance_message";

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct MaintenanceStatus {
    pub enabled: bool,
    pub message: String,
}

/// Read maintenance mode through the cached `advanced` section
pub async fn maintenance_status(settings: &SettingsService) -> Result<MaintenanceStatus> {
    let advanced = settings.section("advanced").await?;
    Ok(MaintenanceStatus {
        enabled: advanced
            .get(MAINTENANCE_KEY)
            .and_then(|v| parse_bool(v))
            .unwrap_or(false),
        message: advanced
            .get(MAINTENANCE_MESSAGE_KEY)
            .cloned()
            .unwrap_or_default(),
    })
}

pub async fn set_maintenance(
    settings: &SettingsService,
    enabled: bool,
    message: Option<&str>,
) -> Result<MaintenanceStatus> {
    if let Some(message) = message {
        if message.trim().is_empty() {
            return Err(AppError::BadRequest(
                "Maintenance message cannot be empty".to_string(),
            ));
        }
        settings.set(MAINTENANCE_MESSAGE_KEY, message.trim()).await?;
    }
    settings.set(MAINTENANCE_KEY, &enabled.to_string()).await?;

    if enabled {
        tracing::warn!("Maintenance mode enabled");
    } else {
        tracing::info!("Maintenance mode disabled");
    }
    maintenance_status(settings).await
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct BackupSummary {
    pub active: u64,
    pub expired: u64,
    pub failed: u64,
    pub dir_size: u64,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct SystemStatus {
    pub version: String,
    #[schema(value_type = String)]
    pub checked_at: DateTime<Utc>,
    pub uptime_secs: i64,
    pub database_ok: bool,
    pub users: u64,
    pub queues: Vec<QueueCount>,
    pub pending_jobs: u64,
    pub failed_jobs: u64,
    pub backups: BackupSummary,
    pub maintenance: MaintenanceStatus,
}

impl SystemStatus {
    pub async fn collect(state: &AppState) -> Result<Self> {
        let now = Utc::now();
        let database_ok = db::ping(&state.db).await;
        let queue_stats = jobs::stats(&state.db, state.queue.reservation_timeout_secs).await?;
        let backup_stats = state.backups.stats().await?;

        let backup_dir = state.backups.backup_dir().to_path_buf();
        let backup_dir_size = tokio::task::spawn_blocking(move || dir_size(&backup_dir))
            .await
            .map_err(|e| AppError::Internal(format!("Status task panicked: {}", e)))??;

        Ok(Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            checked_at: now,
            uptime_secs: (now - state.started_at).num_seconds(),
            database_ok,
            users: User::find().count(&state.db).await?,
            queues: queue_stats.queues,
            pending_jobs: queue_stats.pending_total,
            failed_jobs: queue_stats.failed,
            backups: BackupSummary {
                active: backup_stats.active,
                expired: backup_stats.expired,
                failed: backup_stats.failed,
                dir_size: backup_dir_size,
            },
            maintenance: maintenance_status(&state.settings).await?,
        })
    }
}

/// Limits that make the monitor raise an alert
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub max_failed_jobs: u64,
    pub max_pending_jobs: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_failed_jobs: 10,
            max_pending_jobs: 100,
        }
    }
}

/// Alerts for every threshold the status breaches
pub fn check_thresholds(status: &SystemStatus, thresholds: &Thresholds) -> Vec<String> {
    let mut alerts = Vec::new();
    if !status.database_ok {
        alerts.push("Database is unreachable".to_string());
    }
    if status.failed_jobs > thresholds.max_failed_jobs {
        alerts.push(format!(
            "{} failed jobs (threshold {})",
            status.failed_jobs, thresholds.max_failed_jobs
        ));
    }
    if status.pending_jobs > thresholds.max_pending_jobs {
        alerts.push(format!(
            "{} pending jobs (threshold {})",
            status.pending_jobs, thresholds.max_pending_jobs
        ));
    }
    if status.backups.failed > 0 {
        alerts.push(format!("{} failed backup(s)", status.backups.failed));
    }
    alerts
}

/// Sample the status every `interval`, `iterations` times or forever when None
pub async fn monitor<F>(
    state: &AppState,
    interval: Duration,
    iterations: Option<u32>,
    thresholds: Thresholds,
    mut on_sample: F,
) -> Result<u32>
where
    F: FnMut(&SystemStatus, &[String]),
{
    let mut ticker = tokio::time::interval(interval);
    let mut taken = 0;
    loop {
        ticker.tick().await;
        let status = SystemStatus::collect(state).await?;
        let alerts = check_thresholds(&status, &thresholds);
        if !alerts.is_empty() {
            tracing::warn!(alerts = ?alerts, "System thresholds exceeded");
        }
        on_sample(&status, &alerts);

        taken += 1;
        if iterations.map(|n| taken >= n).unwrap_or(false) {
            return Ok(taken);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(failed_jobs: u64, pending_jobs: u64) -> SystemStatus {
        SystemStatus {
            version: "0.1.0".to_string(),
            checked_at: Utc::now(),
            uptime_secs: 0,
            database_ok: true,
            users: 1,
            queues: Vec::new(),
            pending_jobs,
            failed_jobs,
            backups: BackupSummary {
                active: 0,
                expired: 0,
                failed: 0,
                dir_size: 0,
            },
            maintenance: MaintenanceStatus {
                enabled: false,
                message: String::new(),
            },
        }
    }

    #[test]
    fn test_no_alerts_within_thresholds() {
        assert!(check_thresholds(&status(10, 100), &Thresholds::default()).is_empty());
    }

    #[test]
    fn test_alerts_above_thresholds() {
        let alerts = check_thresholds(&status(11, 101), &Thresholds::default());
        assert_eq!(alerts.len(), 2);
        assert!(alerts[0].contains("failed jobs"));
    }
}

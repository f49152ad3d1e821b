//! Housekeeping: expired backups, old failed jobs and audit entries, stale
//! temp files and the settings cache

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::DbConn;
use crate::error::{AppError, Result};
use crate::services::audit::{clear_old_logs, count_old_logs};
use crate::services::backup::BackupService;
use crate::services::jobs;
use crate::services::retention::MAX_RETENTION_DAYS;
use crate::services::settings::SettingsService;

/// Temp files older than this are removed
pub const TEMP_FILE_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CleanupTarget {
    Backups,
    FailedJobs,
    AuditLogs,
    TempFiles,
    Cache,
}

impl CleanupTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupTarget::Backups => "backups",
            CleanupTarget::FailedJobs => "failed_jobs",
            CleanupTarget::AuditLogs => "audit_logs",
            CleanupTarget::TempFiles => "temp_files",
            CleanupTarget::Cache => "cache",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "backups" => Some(CleanupTarget::Backups),
            "failed_jobs" | "jobs" => Some(CleanupTarget::FailedJobs),
            "audit_logs" | "audit" | "logs" => Some(CleanupTarget::AuditLogs),
            "temp_files" | "temp" | "tmp" => Some(CleanupTarget::TempFiles),
            "cache" => Some(CleanupTarget::Cache),
            _ => None,
        }
    }

    pub fn all() -> Vec<CleanupTarget> {
        vec![
            CleanupTarget::Backups,
            CleanupTarget::FailedJobs,
            CleanupTarget::AuditLogs,
            CleanupTarget::TempFiles,
            CleanupTarget::Cache,
        ]
    }
}

impl std::fmt::Display for CleanupTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema)]
pub struct CleanupOptions {
    /// Count what would be removed without removing anything
    #[serde(default)]
    pub dry_run: bool,
    /// Empty means every target
    #[serde(default)]
    pub targets: Vec<CleanupTarget>,
}

impl CleanupOptions {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            targets: Vec::new(),
        }
    }

    fn selected(&self) -> Vec<CleanupTarget> {
        if self.targets.is_empty() {
            CleanupTarget::all()
        } else {
            CleanupTarget::all()
                .into_iter()
                .filter(|t| self.targets.contains(t))
                .collect()
        }
    }
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct CleanupItem {
    pub target: CleanupTarget,
    /// Removed, or removable on a dry run
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct CleanupReport {
    pub dry_run: bool,
    pub items: Vec<CleanupItem>,
}

impl CleanupReport {
    pub fn total(&self) -> u64 {
        self.items.iter().map(|i| i.count).sum()
    }

    pub fn count(&self, target: CleanupTarget) -> Option<u64> {
        self.items.iter().find(|i| i.target == target).map(|i| i.count)
    }
}

#[derive(Clone)]
pub struct CleanupService {
    db: DbConn,
    settings: SettingsService,
    backups: BackupService,
    temp_dir: PathBuf,
}

impl CleanupService {
    pub fn new(db: DbConn, settings: SettingsService, backups: BackupService, temp_dir: PathBuf) -> Self {
        Self {
            db,
            settings,
            backups,
            temp_dir,
        }
    }

    pub async fn run(&self, options: &CleanupOptions) -> Result<CleanupReport> {
        let mut items = Vec::new();
        for target in options.selected() {
            let count = self.clean(target, options.dry_run).await?;
            tracing::info!(target = %target, count, dry_run = options.dry_run, "Cleanup target processed");
            items.push(CleanupItem { target, count });
        }
        Ok(CleanupReport {
            dry_run: options.dry_run,
            items,
        })
    }

    async fn clean(&self, target: CleanupTarget, dry_run: bool) -> Result<u64> {
        match target {
            CleanupTarget::Backups => {
                let now = Utc::now();
                if dry_run {
                    self.backups.count_expired(now).await
                } else {
                    self.backups.cleanup_expired(now).await
                }
            }
            CleanupTarget::FailedJobs => {
                let days = self.retention_days("advanced.failed_job_retention_days", 7).await?;
                if dry_run {
                    jobs::count_failed_older_than(&self.db, days).await
                } else {
                    jobs::flush_failed(&self.db, Some(days)).await
                }
            }
            CleanupTarget::AuditLogs => {
                let days = self.retention_days("advanced.audit_retention_days", 90).await?;
                if dry_run {
                    count_old_logs(&self.db, days).await
                } else {
                    clear_old_logs(&self.db, days).await
                }
            }
            CleanupTarget::TempFiles => {
                let dir = self.temp_dir.clone();
                tokio::task::spawn_blocking(move || {
                    remove_stale_files(&dir, TEMP_FILE_MAX_AGE, SystemTime::now(), dry_run)
                })
                .await
                .map_err(|e| AppError::Internal(format!("Cleanup task panicked: {}", e)))?
                .map_err(AppError::from)
            }
            CleanupTarget::Cache => {
                let cache = self.settings.cache();
                if dry_run {
                    Ok(cache.len().await as u64)
                } else {
                    Ok(cache.flush().await as u64)
                }
            }
        }
    }

    /// Stored retention for `key`, kept within 1..=MAX_RETENTION_DAYS
    async fn retention_days(&self, key: &str, fallback: i64) -> Result<i64> {
        let stored = self.settings.get_int(key).await?.unwrap_or(fallback);
        let days = stored.clamp(1, MAX_RETENTION_DAYS);
        if days != stored {
            tracing::warn!(key, stored, used = days, "Retention setting out of range");
        }
        Ok(days)
    }
}

/// Remove files under `dir` last modified more than `max_age` before `now`
pub fn remove_stale_files(dir: &Path, max_age: Duration, now: SystemTime, dry_run: bool) -> std::io::Result<u64> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let meta = entry.metadata()?;
        if meta.is_dir() {
            removed += remove_stale_files(&path, max_age, now, dry_run)?;
            continue;
        }
        let age = now
            .duration_since(meta.modified()?)
            .unwrap_or(Duration::ZERO);
        if age > max_age {
            if !dry_run {
                std::fs::remove_file(&path)?;
            }
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_parse() {
        assert_eq!(CleanupTarget::parse("failed-jobs"), Some(CleanupTarget::FailedJobs));
        assert_eq!(CleanupTarget::parse("tmp"), Some(CleanupTarget::TempFiles));
        assert_eq!(CleanupTarget::parse("sessions"), None);
    }

    #[test]
    fn test_selected_keeps_canonical_order() {
        let options = CleanupOptions {
            dry_run: false,
            targets: vec![CleanupTarget::Cache, CleanupTarget::Backups],
        };
        assert_eq!(options.selected(), vec![CleanupTarget::Backups, CleanupTarget::Cache]);
        assert_eq!(CleanupOptions::all().selected().len(), 5);
    }

    #[test]
    fn test_remove_stale_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("a.tmp"), b"a").unwrap();
        std::fs::write(dir.path().join("nested/b.tmp"), b"b").unwrap();

        let later = SystemTime::now() + Duration::from_secs(2 * 24 * 60 * 60);

        assert_eq!(remove_stale_files(dir.path(), TEMP_FILE_MAX_AGE, SystemTime::now(), false).unwrap(), 0);
        assert_eq!(remove_stale_files(dir.path(), TEMP_FILE_MAX_AGE, later, true).unwrap(), 2);
        assert!(dir.path().join("a.tmp").exists());
        assert_eq!(remove_stale_files(dir.path(), TEMP_FILE_MAX_AGE, later, false).unwrap(), 2);
        assert!(!dir.path().join("a.tmp").exists());
    }

    #[test]
    fn test_missing_temp_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            remove_stale_files(&dir.path().join("nope"), TEMP_FILE_MAX_AGE, SystemTime::now(), false).unwrap(),
            0
        );
    }
}

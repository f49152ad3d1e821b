//! Recurring background tasks started alongside the HTTP server.
//!
//! Each task implements [`PeriodicTask`] and is driven by its own tokio
//! interval. A failing run is logged and the task keeps its schedule.

use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::models::backup::BackupType;
use crate::services::backup::BackupService;
use crate::services::cleanup::{CleanupOptions, CleanupService};
use crate::services::settings::SettingsService;
use crate::state::AppState;

const HOURLY: Duration = Duration::from_secs(60 * 60);
const DAILY: Duration = Duration::from_secs(24 * 60 * 60);

#[async_trait]
pub trait PeriodicTask: Send + Sync {
    fn name(&self) -> &'static str;

    /// Time between runs; the first run happens one period after start
    fn interval(&self) -> Duration;

    async fn run(&self) -> anyhow::Result<()>;
}

pub fn default_tasks(state: &AppState) -> Vec<Box<dyn PeriodicTask>> {
    vec![
        Box::new(PruneExpiredBackups {
            backups: state.backups.clone(),
        }),
        Box::new(NightlyCleanup {
            cleanup: state.cleanup.clone(),
        }),
        Box::new(AutoBackup {
            backups: state.backups.clone(),
            settings: state.settings.clone(),
        }),
    ]
}

pub fn start_scheduler(state: &AppState) -> Vec<JoinHandle<()>> {
    let tasks = default_tasks(state);
    let names: Vec<_> = tasks.iter().map(|t| t.name()).collect();
    tracing::info!(tasks = ?names, "Scheduler started");
    tasks.into_iter().map(|task| tokio::spawn(drive(task))).collect()
}

async fn drive(task: Box<dyn PeriodicTask>) {
    let period = task.interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let started = std::time::Instant::now();
        match task.run().await {
            Ok(()) => tracing::debug!(
                task = task.name(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Scheduled task finished"
            ),
            Err(e) => tracing::error!(task = task.name(), error = %e, "Scheduled task failed"),
        }
    }
}

/// Deletes backups whose retention has run out
pub struct PruneExpiredBackups {
    pub backups: BackupService,
}

#[async_trait]
impl PeriodicTask for PruneExpiredBackups {
    fn name(&self) -> &'static str {
        "prune_expired_backups"
    }

    fn interval(&self) -> Duration {
        HOURLY
    }

    async fn run(&self) -> anyhow::Result<()> {
        let removed = self.backups.cleanup_expired(Utc::now()).await?;
        if removed > 0 {
            tracing::info!(removed, "Expired backups pruned");
        }
        Ok(())
    }
}

pub struct NightlyCleanup {
    pub cleanup: CleanupService,
}

#[async_trait]
impl PeriodicTask for NightlyCleanup {
    fn name(&self) -> &'static str {
        "nightly_cleanup"
    }

    fn interval(&self) -> Duration {
        DAILY
    }

    async fn run(&self) -> anyhow::Result<()> {
        let report = self.cleanup.run(&CleanupOptions::all()).await?;
        tracing::info!(removed = report.total(), "Nightly cleanup finished");
        Ok(())
    }
}

/// Database backup once a day while `advanced.auto_backup_enabled` is on
pub struct AutoBackup {
    pub backups: BackupService,
    pub settings: SettingsService,
}

#[async_trait]
impl PeriodicTask for AutoBackup {
    fn name(&self) -> &'static str {
        "auto_backup"
    }

    fn interval(&self) -> Duration {
        DAILY
    }

    async fn run(&self) -> anyhow::Result<()> {
        if !self.settings.get_bool("advanced.auto_backup_enabled").await? {
            return Ok(());
        }

        let backup = self.backups.create(BackupType::Database, None, None).await?;
        if !backup.is_completed() {
            anyhow::bail!(
                "automatic backup {} failed: {}",
                backup.name,
                backup.error_message.unwrap_or_default()
            );
        }
        tracing::info!(backup_id = backup.id, name = %backup.name, "Automatic backup created");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Flaky {
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PeriodicTask for Flaky {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn interval(&self) -> Duration {
            Duration::from_millis(10)
        }

        async fn run(&self) -> anyhow::Result<()> {
            if self.runs.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                anyhow::bail!("odd run");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_run_keeps_schedule() {
        let runs = Arc::new(AtomicUsize::new(0));
        let handle = tokio::spawn(drive(Box::new(Flaky { runs: runs.clone() })));

        let mut waited = 0;
        while runs.load(Ordering::SeqCst) < 3 && waited < 200 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waited += 1;
        }
        handle.abort();
        assert!(runs.load(Ordering::SeqCst) >= 3);
    }
}

use chrono::{DateTime, Utc};

use crate::config::mail::MailDriver;
use crate::config::queue::QueueConfig;
use crate::config::storage::StorageConfig;
use crate::config::CONFIG;
use crate::services::audit::AuditService;
use crate::services::backup::BackupService;
use crate::services::cache::SettingsCache;
use crate::services::cleanup::CleanupService;
use crate::services::jobs::JobDispatcher;
use crate::services::mail::MailService;
use crate::services::notification::NotificationService;
use crate::services::settings::SettingsService;

pub use crate::db::DbConn;

/// Application state containing all shared resources
///
/// Every service is cheap to clone; handlers, commands and background tasks
/// each hold their own copy.
#[derive(Clone)]
pub struct AppState {
    pub db: DbConn,
    pub storage: StorageConfig,
    pub queue: QueueConfig,
    pub settings: SettingsService,
    pub audit: AuditService,
    pub mail: MailService,
    pub jobs: JobDispatcher,
    pub notifications: NotificationService,
    pub backups: BackupService,
    pub cleanup: CleanupService,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: DbConn, storage: StorageConfig, queue: QueueConfig, mail_driver: MailDriver) -> Self {
        let settings = SettingsService::new(db.clone(), SettingsCache::new(queue.cache_ttl_secs));
        let jobs = JobDispatcher::new(db.clone(), queue.max_attempts);
        let notifications = NotificationService::new(db.clone(), settings.clone(), jobs.clone());
        let mail = MailService::new(db.clone(), settings.clone(), mail_driver);
        let backups = BackupService::new(
            db.clone(),
            settings.clone(),
            storage.backup_dir.clone(),
            storage.files_dir.clone(),
        )
        .with_notifications(notifications.clone());
        let cleanup = CleanupService::new(
            db.clone(),
            settings.clone(),
            backups.clone(),
            storage.temp_dir.clone(),
        );

        Self {
            audit: AuditService::new(db.clone()),
            db,
            storage,
            queue,
            settings,
            mail,
            jobs,
            notifications,
            backups,
            cleanup,
            started_at: Utc::now(),
        }
    }

    /// State wired from the environment configuration
    pub fn from_config(db: DbConn) -> Self {
        Self::new(
            db,
            CONFIG.storage.clone(),
            CONFIG.queue.clone(),
            CONFIG.mail.driver,
        )
    }
}

//! Backup lifecycle
//!
//! A backup is a directory `<backup_dir>/<name>/` holding `database.json`
//! (snapshot of the configuration tables), a copy of the files directory under
//! `files/`, and `manifest.json`. The stored hash covers every file except the
//! manifest.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::db::DbConn;
use crate::error::{AppError, Result};
use crate::models::backup::{self, BackupStatus, BackupType};
use crate::models::prelude::*;
use crate::models::{app_setting, email_template, smtp_config};
use crate::services::notification::{NotificationKind, NotificationService};
use crate::services::retention;
use crate::services::settings::SettingsService;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const DATABASE_FILE: &str = "database.json";
pub const FILES_DIR: &str = "files";

/// Configuration tables captured by database backups
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub taken_at: DateTime<Utc>,
    pub app_settings: Vec<app_setting::Model>,
    pub smtp_configs: Vec<smtp_config::Model>,
    pub email_templates: Vec<email_template::Model>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupManifest {
    pub name: String,
    pub backup_type: BackupType,
    pub created_at: DateTime<Utc>,
    pub app_version: String,
    pub hash: String,
    pub size: u64,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct BackupVerification {
    pub id: i64,
    pub valid: bool,
    pub expected_hash: Option<String>,
    pub actual_hash: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, utoipa::ToSchema)]
pub struct BackupStats {
    pub total: u64,
    pub active: u64,
    pub expired: u64,
    pub completed: u64,
    pub failed: u64,
    pub pending: u64,
    /// Sum of recorded backup sizes in bytes
    pub total_size: u64,
}

#[derive(Clone)]
pub struct BackupService {
    db: DbConn,
    settings: SettingsService,
    notifications: Option<NotificationService>,
    backup_dir: PathBuf,
    files_dir: PathBuf,
}

impl BackupService {
    pub fn new(db: DbConn, settings: SettingsService, backup_dir: PathBuf, files_dir: PathBuf) -> Self {
        Self {
            db,
            settings,
            notifications: None,
            backup_dir,
            files_dir,
        }
    }

    /// Notify administrators when a backup fails
    pub fn with_notifications(mut self, notifications: NotificationService) -> Self {
        self.notifications = Some(notifications);
        self
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    pub async fn get(&self, id: i64) -> Result<backup::Model> {
        Backup::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Backup {} not found", id)))
    }

    /// Create a backup; the returned row is either completed or failed
    ///
    /// `retention_days` defaults to `advanced.backup_retention_days`; zero means
    /// the backup never expires.
    pub async fn create(
        &self,
        backup_type: BackupType,
        retention_days: Option<i64>,
        created_by: Option<i64>,
    ) -> Result<backup::Model> {
        let retention_days = match retention_days {
            Some(days) => days,
            None => self
                .settings
                .get_int("advanced.backup_retention_days")
                .await?
                .unwrap_or(30),
        };
        let now = Utc::now();
        let expires_at = match retention_days {
            0 => None,
            days => Some(retention::expires_after(now, days)?),
        };

        let name = format!(
            "backup-{}-{}-{}",
            backup_type,
            now.format("%Y%m%d-%H%M%S"),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        let dir = self.backup_dir.join(&name);

        let pending = backup::ActiveModel {
            name: Set(name.clone()),
            backup_type: Set(backup_type.as_str().to_string()),
            status: Set(BackupStatus::Pending.as_str().to_string()),
            file_path: Set(Some(dir.to_string_lossy().to_string())),
            file_hash: Set(None),
            file_size: Set(None),
            error_message: Set(None),
            expires_at: Set(expires_at),
            completed_at: Set(None),
            restored_at: Set(None),
            created_by: Set(created_by),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        tracing::info!(backup_id = pending.id, name = %name, backup_type = %backup_type, "Creating backup");

        match self.write_backup(&name, backup_type, &dir).await {
            Ok(manifest) => {
                let mut active: backup::ActiveModel = pending.into();
                active.status = Set(BackupStatus::Completed.as_str().to_string());
                active.file_hash = Set(Some(manifest.hash.clone()));
                active.file_size = Set(Some(manifest.size as i64));
                active.completed_at = Set(Some(Utc::now()));
                let completed = active.update(&self.db).await?;

                tracing::info!(
                    backup_id = completed.id,
                    size = manifest.size,
                    status = %BackupStatus::Completed,
                    "Backup completed"
                );
                Ok(completed)
            }
            Err(e) => {
                let message = e.to_string();
                if dir.exists() {
                    if let Err(rm) = fs::remove_dir_all(&dir) {
                        tracing::warn!(path = %dir.display(), error = %rm, "Failed to remove partial backup");
                    }
                }

                let mut active: backup::ActiveModel = pending.into();
                active.status = Set(BackupStatus::Failed.as_str().to_string());
                active.error_message = Set(Some(message.clone()));
                let failed = active.update(&self.db).await?;

                tracing::error!(backup_id = failed.id, error = %message, status = %BackupStatus::Failed, "Backup failed");
                self.notify_failure(&failed, &message).await;
                Ok(failed)
            }
        }
    }

    async fn write_backup(&self, name: &str, backup_type: BackupType, dir: &Path) -> Result<BackupManifest> {
        let snapshot = if backup_type.includes_database() {
            Some(self.snapshot().await?)
        } else {
            None
        };
        let files_source = backup_type.includes_files().then(|| self.files_dir.clone());

        let dir = dir.to_path_buf();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || -> Result<BackupManifest> {
            fs::create_dir_all(&dir)?;

            if let Some(snapshot) = snapshot {
                let json = serde_json::to_vec_pretty(&snapshot)?;
                fs::write(dir.join(DATABASE_FILE), json)?;
            }

            if let Some(source) = files_source {
                let target = dir.join(FILES_DIR);
                if source.exists() {
                    copy_dir(&source, &target)?;
                } else {
                    tracing::warn!(path = %source.display(), "Files directory does not exist, backing up nothing");
                    fs::create_dir_all(&target)?;
                }
            }

            let (hash, size) = content_digest(&dir)?;
            let manifest = BackupManifest {
                name,
                backup_type,
                created_at: Utc::now(),
                app_version: env!("CARGO_PKG_VERSION").to_string(),
                hash,
                size,
                files: content_files(&dir)?,
            };
            fs::write(dir.join(MANIFEST_FILE), serde_json::to_vec_pretty(&manifest)?)?;
            Ok(manifest)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Backup task panicked: {}", e)))?
    }

    /// Read the configuration tables
    pub async fn snapshot(&self) -> Result<DatabaseSnapshot> {
        Ok(DatabaseSnapshot {
            taken_at: Utc::now(),
            app_settings: AppSetting::find()
                .order_by_asc(app_setting::Column::Key)
                .all(&self.db)
                .await?,
            smtp_configs: SmtpConfig::find()
                .order_by_asc(smtp_config::Column::Id)
                .all(&self.db)
                .await?,
            email_templates: EmailTemplate::find()
                .order_by_asc(email_template::Column::Id)
                .all(&self.db)
                .await?,
        })
    }

    async fn notify_failure(&self, failed: &backup::Model, message: &str) {
        let Some(notifications) = &self.notifications else {
            return;
        };
        let subject = format!("Backup {} failed", failed.name);
        let body = format!(
            "The {} backup {} failed at {}:\n\n{}",
            failed.backup_type,
            failed.name,
            Utc::now().to_rfc3339(),
            message
        );
        if let Err(e) = notifications
            .notify_admins(NotificationKind::BackupFailure, &subject, &body)
            .await
        {
            tracing::warn!(error = %e, "Failed to notify about backup failure");
        }
    }

    /// Backups newest first; expired ones only when `include_expired`
    pub async fn list(&self, include_expired: bool) -> Result<Vec<backup::Model>> {
        let mut query = Backup::find();
        if !include_expired {
            query = query.filter(
                Condition::any()
                    .add(backup::Column::ExpiresAt.is_null())
                    .add(backup::Column::ExpiresAt.gte(Utc::now())),
            );
        }
        Ok(query
            .order_by_desc(backup::Column::CreatedAt)
            .order_by_desc(backup::Column::Id)
            .all(&self.db)
            .await?)
    }

    pub fn is_expired(backup: &backup::Model, now: DateTime<Utc>) -> bool {
        backup.is_expired_at(now)
    }

    /// Recompute the content hash and compare it to the recorded one
    pub async fn verify(&self, id: i64) -> Result<BackupVerification> {
        let backup = self.get(id).await?;
        let expected = backup.file_hash.clone();

        let invalid = |message: String, actual: Option<String>| BackupVerification {
            id,
            valid: false,
            expected_hash: expected.clone(),
            actual_hash: actual,
            message,
        };

        if !backup.is_completed() {
            return Ok(invalid(format!("Backup is {}", backup.status), None));
        }
        let Some(dir) = backup.file_path.clone().map(PathBuf::from) else {
            return Ok(invalid("Backup has no file path".to_string(), None));
        };
        if !dir.is_dir() {
            return Ok(invalid(format!("Backup directory {} is missing", dir.display()), None));
        }

        let (actual, _) = tokio::task::spawn_blocking(move || content_digest(&dir))
            .await
            .map_err(|e| AppError::Internal(format!("Verify task panicked: {}", e)))??;

        if Some(&actual) == expected.as_ref() {
            Ok(BackupVerification {
                id,
                valid: true,
                expected_hash: expected.clone(),
                actual_hash: Some(actual),
                message: "Backup is intact".to_string(),
            })
        } else {
            Ok(invalid("Hash mismatch".to_string(), Some(actual)))
        }
    }

    /// Restore a completed, non-expired backup
    pub async fn restore(&self, id: i64) -> Result<backup::Model> {
        let backup = self.get(id).await?;
        if !backup.is_completed() {
            return Err(AppError::BadRequest(format!(
                "Only completed backups can be restored (backup is {})",
                backup.status
            )));
        }
        if backup.is_expired_at(Utc::now()) {
            return Err(AppError::BadRequest(format!("Backup {} has expired", backup.name)));
        }

        let verification = self.verify(id).await?;
        if !verification.valid {
            return Err(AppError::BadRequest(format!(
                "Backup integrity check failed: {}",
                verification.message
            )));
        }

        let backup_type = BackupType::parse(&backup.backup_type).ok_or_else(|| {
            AppError::Internal(format!("Unknown backup type '{}'", backup.backup_type))
        })?;
        let dir = PathBuf::from(backup.file_path.clone().unwrap_or_default());

        if backup_type.includes_database() {
            let raw = tokio::fs::read(dir.join(DATABASE_FILE)).await?;
            let snapshot: DatabaseSnapshot = serde_json::from_slice(&raw)?;
            self.import_snapshot(snapshot).await?;
            self.settings.cache().flush().await;
        }

        if backup_type.includes_files() {
            let source = dir.join(FILES_DIR);
            let target = self.files_dir.clone();
            tokio::task::spawn_blocking(move || copy_dir(&source, &target))
                .await
                .map_err(|e| AppError::Internal(format!("Restore task panicked: {}", e)))??;
        }

        let mut active: backup::ActiveModel = backup.into();
        active.restored_at = Set(Some(Utc::now()));
        let restored = active.update(&self.db).await?;

        tracing::info!(backup_id = restored.id, name = %restored.name, "Backup restored");
        Ok(restored)
    }

    async fn import_snapshot(&self, snapshot: DatabaseSnapshot) -> Result<()> {
        let txn = self.db.begin().await?;

        AppSetting::delete_many().exec(&txn).await?;
        SmtpConfig::delete_many().exec(&txn).await?;
        EmailTemplate::delete_many().exec(&txn).await?;

        if !snapshot.app_settings.is_empty() {
            AppSetting::insert_many(
                snapshot
                    .app_settings
                    .into_iter()
                    .map(|m| app_setting::ActiveModel::from(m).reset_all()),
            )
            .exec(&txn)
            .await?;
        }
        if !snapshot.smtp_configs.is_empty() {
            SmtpConfig::insert_many(
                snapshot
                    .smtp_configs
                    .into_iter()
                    .map(|m| smtp_config::ActiveModel::from(m).reset_all()),
            )
            .exec(&txn)
            .await?;
        }
        if !snapshot.email_templates.is_empty() {
            EmailTemplate::insert_many(
                snapshot
                    .email_templates
                    .into_iter()
                    .map(|m| email_template::ActiveModel::from(m).reset_all()),
            )
            .exec(&txn)
            .await?;
        }

        txn.commit().await?;
        Ok(())
    }

    /// Remove the backup directory and its row
    pub async fn delete(&self, id: i64) -> Result<backup::Model> {
        let backup = self.get(id).await?;
        self.remove(&backup).await?;
        Ok(backup)
    }

    async fn remove(&self, backup: &backup::Model) -> Result<()> {
        if let Some(path) = &backup.file_path {
            let dir = PathBuf::from(path);
            if dir.exists() {
                tokio::fs::remove_dir_all(&dir).await?;
            }
        }
        Backup::delete_by_id(backup.id).exec(&self.db).await?;
        tracing::info!(backup_id = backup.id, name = %backup.name, "Backup deleted");
        Ok(())
    }

    pub async fn expired(&self, now: DateTime<Utc>) -> Result<Vec<backup::Model>> {
        Ok(Backup::find()
            .filter(backup::Column::ExpiresAt.lt(now))
            .order_by_asc(backup::Column::ExpiresAt)
            .all(&self.db)
            .await?)
    }

    pub async fn count_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        Ok(self.expired(now).await?.len() as u64)
    }

    /// Delete every backup expired at `now`; returns how many were removed
    pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut removed = 0;
        for backup in self.expired(now).await? {
            self.remove(&backup).await?;
            removed += 1;
        }
        if removed > 0 {
            tracing::info!(count = removed, "Expired backups removed");
        }
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<BackupStats> {
        let now = Utc::now();
        let mut stats = BackupStats::default();
        for b in Backup::find().all(&self.db).await? {
            stats.total += 1;
            if b.is_expired_at(now) {
                stats.expired += 1;
            } else {
                stats.active += 1;
            }
            match b.status.as_str() {
                "completed" => stats.completed += 1,
                "failed" => stats.failed += 1,
                _ => stats.pending += 1,
            }
            stats.total_size += b.file_size.unwrap_or(0).max(0) as u64;
        }
        Ok(stats)
    }
}

// ============================================================================
// Filesystem helpers
// ============================================================================

/// Content files relative to `root`, `/`-separated and sorted, manifest excluded
pub fn content_files(root: &Path) -> io::Result<Vec<String>> {
    let mut files = Vec::new();
    collect_files(root, root, &mut files)?;
    files.retain(|f| f != MANIFEST_FILE);
    files.sort();
    Ok(files)
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else {
            let relative = path
                .strip_prefix(root)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            let parts: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect();
            out.push(parts.join("/"));
        }
    }
    Ok(())
}

/// SHA-256 over each content file's relative path and bytes, plus the total size
pub fn content_digest(root: &Path) -> io::Result<(String, u64)> {
    let mut hasher = Sha256::new();
    let mut size = 0u64;
    for relative in content_files(root)? {
        let bytes = fs::read(root.join(&relative))?;
        hasher.update(relative.as_bytes());
        hasher.update([0u8]);
        hasher.update(&bytes);
        size += bytes.len() as u64;
    }
    Ok((hex::encode(hasher.finalize()), size))
}

/// Recursively copy `source` into `target`, overwriting existing files
pub fn copy_dir(source: &Path, target: &Path) -> io::Result<()> {
    fs::create_dir_all(target)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let path = entry.path();
        let dest = target.join(entry.file_name());
        if path.is_dir() {
            copy_dir(&path, &dest)?;
        } else {
            fs::copy(&path, &dest)?;
        }
    }
    Ok(())
}

/// Total size in bytes of every file under `dir`; zero when it does not exist
pub fn dir_size(dir: &Path) -> io::Result<u64> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut total = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        total += if meta.is_dir() {
            dir_size(&entry.path())?
        } else {
            meta.len()
        };
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_ignores_manifest_and_tracks_content() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("database.json"), b"{}").unwrap();
        fs::create_dir_all(dir.path().join("files/logos")).unwrap();
        fs::write(dir.path().join("files/logos/a.png"), b"png").unwrap();

        let (before, size) = content_digest(dir.path()).unwrap();
        assert_eq!(size, 5);

        fs::write(dir.path().join(MANIFEST_FILE), b"anything").unwrap();
        assert_eq!(content_digest(dir.path()).unwrap().0, before);

        fs::write(dir.path().join("files/logos/a.png"), b"PNG").unwrap();
        assert_ne!(content_digest(dir.path()).unwrap().0, before);
    }

    #[test]
    fn test_content_files_are_relative_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("files")).unwrap();
        fs::write(dir.path().join("files/b.txt"), b"b").unwrap();
        fs::write(dir.path().join("database.json"), b"{}").unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), b"{}").unwrap();

        assert_eq!(
            content_files(dir.path()).unwrap(),
            vec!["database.json".to_string(), "files/b.txt".to_string()]
        );
    }

    #[test]
    fn test_copy_dir_and_size() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("nested")).unwrap();
        fs::write(src.path().join("nested/file.txt"), b"hello").unwrap();

        copy_dir(src.path(), &dst.path().join("copy")).unwrap();
        assert_eq!(
            fs::read(dst.path().join("copy/nested/file.txt")).unwrap(),
            b"hello"
        );
        assert_eq!(dir_size(&dst.path().join("copy")).unwrap(), 5);
        assert_eq!(dir_size(&dst.path().join("missing")).unwrap(), 0);
    }
}

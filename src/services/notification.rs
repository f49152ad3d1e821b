//! Administrator notifications
//!
//! Notifications are delivered as high-priority `send_email` jobs so a slow
//! SMTP server never blocks the caller.

use serde::Serialize;

use crate::db::DbConn;
use crate::error::{AppError, Result};
use crate::services::accounts::admin_emails;
use crate::services::jobs::handlers::{SendEmailPayload, SEND_EMAIL};
use crate::services::jobs::JobDispatcher;
use crate::services::mail::text_to_html;
use crate::services::settings::SettingsService;

const NOTIFICATION_PRIORITY: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BackupFailure,
    JobFailure,
    Test,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::BackupFailure => "backup_failure",
            NotificationKind::JobFailure => "job_failure",
            NotificationKind::Test => "test",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "backup_failure" | "backup" => Some(NotificationKind::BackupFailure),
            "job_failure" | "job" => Some(NotificationKind::JobFailure),
            "test" => Some(NotificationKind::Test),
            _ => None,
        }
    }

    pub fn all() -> [NotificationKind; 3] {
        [
            NotificationKind::BackupFailure,
            NotificationKind::JobFailure,
            NotificationKind::Test,
        ]
    }

    /// Setting that toggles this kind
    pub fn setting_key(&self) -> String {
        format!("notifications.{}_enabled", self.as_str())
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct KindStatus {
    pub kind: NotificationKind,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct NotificationStatus {
    pub enabled: bool,
    pub kinds: Vec<KindStatus>,
    pub recipients: Vec<String>,
}

/// What `notify_admins` did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum NotifyOutcome {
    Dispatched { recipients: Vec<String>, job_id: i64 },
    Skipped { reason: String },
}

#[derive(Clone)]
pub struct NotificationService {
    db: DbConn,
    settings: SettingsService,
    jobs: JobDispatcher,
}

impl NotificationService {
    pub fn new(db: DbConn, settings: SettingsService, jobs: JobDispatcher) -> Self {
        Self { db, settings, jobs }
    }

    /// Configured recipients, falling back to the emails of admin users
    pub async fn recipients(&self) -> Result<Vec<String>> {
        let configured = self
            .settings
            .get("notifications.recipients")
            .await?
            .unwrap_or_default();

        let mut recipients: Vec<String> = configured
            .split(',')
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();

        if recipients.is_empty() {
            recipients = admin_emails(&self.db).await?;
        }

        recipients.sort();
        recipients.dedup();
        Ok(recipients)
    }

    pub async fn is_enabled(&self, kind: NotificationKind) -> Result<bool> {
        Ok(self.settings.get_bool("notifications.enabled").await?
            && self.settings.get_bool(&kind.setting_key()).await?)
    }

    pub async fn set_kind_enabled(&self, kind: NotificationKind, enabled: bool) -> Result<()> {
        self.settings
            .set(&kind.setting_key(), &enabled.to_string())
            .await?;
        Ok(())
    }

    pub async fn status(&self) -> Result<NotificationStatus> {
        let mut kinds = Vec::new();
        for kind in NotificationKind::all() {
            kinds.push(KindStatus {
                kind,
                enabled: self.settings.get_bool(&kind.setting_key()).await?,
            });
        }

        Ok(NotificationStatus {
            enabled: self.settings.get_bool("notifications.enabled").await?,
            kinds,
            recipients: self.recipients().await?,
        })
    }

    /// Queue a notification mail to every administrator recipient
    pub async fn notify_admins(
        &self,
        kind: NotificationKind,
        subject: &str,
        body: &str,
    ) -> Result<NotifyOutcome> {
        if !self.is_enabled(kind).await? {
            tracing::debug!(kind = %kind, "Notification kind disabled, skipping");
            return Ok(NotifyOutcome::Skipped {
                reason: format!("{} notifications are disabled", kind),
            });
        }

        let recipients = self.recipients().await?;
        if recipients.is_empty() {
            tracing::warn!(kind = %kind, "No notification recipients configured");
            return Ok(NotifyOutcome::Skipped {
                reason: "No recipients configured".to_string(),
            });
        }

        let app_name = self
            .settings
            .get("general.app_name")
            .await?
            .unwrap_or_default();

        let payload = SendEmailPayload {
            to: recipients.clone(),
            subject: Some(format!("[{}] {}", app_name, subject)),
            html: Some(text_to_html(body)),
            text: Some(body.to_string()),
            ..Default::default()
        };

        let job = self
            .jobs
            .dispatch(SEND_EMAIL, serde_json::to_value(&payload)?, NOTIFICATION_PRIORITY)
            .await?;

        tracing::info!(kind = %kind, job_id = job.id, recipients = recipients.len(), "Notification queued");
        Ok(NotifyOutcome::Dispatched {
            recipients,
            job_id: job.id,
        })
    }

    /// Send a test notification to one address
    pub async fn send_test(&self, email: &str) -> Result<i64> {
        if email.parse::<lettre::Address>().is_err() {
            return Err(AppError::BadRequest(format!("Invalid email address '{}'", email)));
        }
        if !self.is_enabled(NotificationKind::Test).await? {
            return Err(AppError::BadRequest("Test notifications are disabled".to_string()));
        }

        let payload = SendEmailPayload {
            to: vec![email.to_string()],
            template: Some("test_email".to_string()),
            vars: [("sent_at".to_string(), chrono::Utc::now().to_rfc2822())]
                .into_iter()
                .collect(),
            ..Default::default()
        };

        let job = self
            .jobs
            .dispatch(SEND_EMAIL, serde_json::to_value(&payload)?, NOTIFICATION_PRIORITY)
            .await?;
        Ok(job.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_and_setting_key() {
        assert_eq!(NotificationKind::parse("backup-failure"), Some(NotificationKind::BackupFailure));
        assert_eq!(NotificationKind::parse("JOB"), Some(NotificationKind::JobFailure));
        assert_eq!(NotificationKind::parse("sms"), None);
        assert_eq!(
            NotificationKind::JobFailure.setting_key(),
            "notifications.job_failure_enabled"
        );
    }

    #[test]
    fn test_every_kind_has_a_registered_setting() {
        for kind in NotificationKind::all() {
            assert!(crate::services::settings::definition(&kind.setting_key()).is_some());
        }
    }
}

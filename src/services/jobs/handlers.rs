//! Built-in job handlers

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::backup::{BackupType, BackupStatus};
use crate::services::backup::BackupService;
use crate::services::cleanup::{CleanupOptions, CleanupService};
use crate::services::mail::{text_to_html, MailService, OutgoingEmail};
use crate::state::AppState;

use super::{JobHandler, JobWorker};

pub const SEND_EMAIL: &str = "send_email";
pub const CREATE_BACKUP: &str = "create_backup";
pub const CLEANUP: &str = "cleanup";

/// Either a stored template (`template` + `vars`) or a raw message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendEmailPayload {
    pub to: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub vars: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl SendEmailPayload {
    /// The explicit HTML body, else the text body escaped into `<pre>`
    fn html_body(&self) -> anyhow::Result<String> {
        match (&self.html, &self.text) {
            (Some(html), _) => Ok(html.clone()),
            (None, Some(text)) => Ok(text_to_html(text)),
            (None, None) => bail!("send_email job needs an html or text body"),
        }
    }
}

pub struct SendEmailJob {
    pub mail: MailService,
}

#[async_trait]
impl JobHandler for SendEmailJob {
    fn job_type(&self) -> &'static str {
        SEND_EMAIL
    }

    async fn handle(&self, payload: serde_json::Value) -> anyhow::Result<()> {
        let payload: SendEmailPayload =
            serde_json::from_value(payload).context("Invalid send_email payload")?;
        if payload.to.is_empty() {
            bail!("send_email job has no recipients");
        }

        if let Some(template) = &payload.template {
            self.mail
                .send_template(template, payload.to.clone(), &payload.vars)
                .await?;
            return Ok(());
        }

        let subject = payload
            .subject
            .clone()
            .context("send_email job needs a template or a subject")?;
        let html = payload.html_body()?;

        self.mail
            .send(&OutgoingEmail {
                to: payload.to,
                subject,
                html,
                text: payload.text,
            })
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBackupPayload {
    pub backup_type: BackupType,
    #[serde(default)]
    pub retention_days: Option<i64>,
    #[serde(default)]
    pub created_by: Option<i64>,
}

pub struct CreateBackupJob {
    pub backups: BackupService,
}

#[async_trait]
impl JobHandler for CreateBackupJob {
    fn job_type(&self) -> &'static str {
        CREATE_BACKUP
    }

    async fn handle(&self, payload: serde_json::Value) -> anyhow::Result<()> {
        let payload: CreateBackupPayload =
            serde_json::from_value(payload).context("Invalid create_backup payload")?;
        let backup = self
            .backups
            .create(payload.backup_type, payload.retention_days, payload.created_by)
            .await?;

        // Administrators were already notified by the backup service
        if backup.status == BackupStatus::Failed.as_str() {
            tracing::warn!(backup_id = backup.id, "Queued backup finished as failed");
        }
        Ok(())
    }
}

pub struct CleanupJob {
    pub cleanup: CleanupService,
}

#[async_trait]
impl JobHandler for CleanupJob {
    fn job_type(&self) -> &'static str {
        CLEANUP
    }

    async fn handle(&self, payload: serde_json::Value) -> anyhow::Result<()> {
        let options: CleanupOptions = if payload.is_null() {
            CleanupOptions::default()
        } else {
            serde_json::from_value(payload).context("Invalid cleanup payload")?
        };
        let report = self.cleanup.run(&options).await?;
        tracing::info!(total = report.total(), dry_run = report.dry_run, "Queued cleanup finished");
        Ok(())
    }
}

/// A worker with every built-in handler registered
pub fn default_worker(state: &AppState) -> JobWorker {
    JobWorker::new(state.db.clone(), state.queue.retry_delay_secs)
        .with_reservation_timeout(state.queue.reservation_timeout_secs)
        .register(Arc::new(SendEmailJob {
            mail: state.mail.clone(),
        }))
        .register(Arc::new(CreateBackupJob {
            backups: state.backups.clone(),
        }))
        .register(Arc::new(CleanupJob {
            cleanup: state.cleanup.clone(),
        }))
        .with_notifications(state.notifications.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_email_payload_omits_empty_fields() {
        let payload = SendEmailPayload {
            to: vec!["a@example.com".to_string()],
            template: Some("welcome".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"to": ["a@example.com"], "template": "welcome"})
        );
    }

    #[test]
    fn test_text_only_body_is_escaped() {
        let payload = SendEmailPayload {
            to: vec!["a@example.com".to_string()],
            subject: Some("Report".to_string()),
            text: Some("<script>alert(1)</script> & \"more\"".to_string()),
            ..Default::default()
        };
        assert_eq!(
            payload.html_body().unwrap(),
            "<pre>&lt;script&gt;alert(1)&lt;/script&gt; &amp; &quot;more&quot;</pre>"
        );

        let explicit = SendEmailPayload {
            html: Some("<p>kept</p>".to_string()),
            ..payload.clone()
        };
        assert_eq!(explicit.html_body().unwrap(), "<p>kept</p>");

        let empty = SendEmailPayload {
            text: None,
            ..payload
        };
        assert!(empty.html_body().is_err());
    }

    #[test]
    fn test_backup_payload_defaults() {
        let payload: CreateBackupPayload =
            serde_json::from_value(serde_json::json!({"backup_type": "full"})).unwrap();
        assert_eq!(payload.backup_type, BackupType::Full);
        assert!(payload.retention_days.is_none());
    }
}

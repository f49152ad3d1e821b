//! Validation suites run by `backoffice validate`
//!
//! Every check resolves to a detail string on success; any error counts as a
//! failure of that check and the suite carries on.

use std::future::Future;

use anyhow::{bail, ensure, Context};
use sea_orm::{EntityTrait, PaginatorTrait};
use sea_orm_migration::MigratorTrait;
use serde::Serialize;

use crate::config::mail::MailDriver;
use crate::db;
use crate::middleware::permissions::{is_known_permission, WILDCARD};
use crate::migrations::Migrator;
use crate::models::prelude::*;
use crate::services::accounts::{admin_emails, find_role_by_name, get_role_permissions, ADMIN_ROLE};
use crate::services::jobs::{self, handlers};
use crate::services::mail::{smtp, templates};
use crate::services::settings::{definition, normalize_value, SECTIONS};
use crate::state::AppState;

/// Templates the application sends itself
pub const REQUIRED_TEMPLATES: [&str; 5] = [
    "welcome",
    "password_reset",
    "backup_failed",
    "job_failed",
    "test_email",
];

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationSuite {
    pub name: String,
    pub results: Vec<CheckResult>,
    pub passed: usize,
    pub failed: usize,
}

impl ValidationSuite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            results: Vec::new(),
            passed: 0,
            failed: 0,
        }
    }

    /// Run one check and record its outcome
    pub async fn check<Fut>(&mut self, name: &str, check: Fut) -> bool
    where
        Fut: Future<Output = anyhow::Result<String>>,
    {
        let (passed, detail) = match check.await {
            Ok(detail) => (true, detail),
            Err(e) => (false, format!("{:#}", e)),
        };

        if passed {
            self.passed += 1;
        } else {
            self.failed += 1;
            tracing::warn!(suite = %self.name, check = name, detail = %detail, "Validation check failed");
        }
        self.results.push(CheckResult {
            name: name.to_string(),
            passed,
            detail,
        });
        passed
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn render_table(&self) -> String {
        let width = self
            .results
            .iter()
            .map(|r| r.name.len())
            .max()
            .unwrap_or(5)
            .max(5);

        let mut out = format!("{} checks\n", self.name);
        out.push_str(&format!("{:<width$}  {:<6}  {}\n", "Check", "Status", "Detail"));
        out.push_str(&format!("{}  {}  {}\n", "-".repeat(width), "-".repeat(6), "-".repeat(6)));
        for result in &self.results {
            let status = if result.passed { "PASS" } else { "FAIL" };
            out.push_str(&format!(
                "{:<width$}  {:<6}  {}\n",
                result.name, status, result.detail
            ));
        }
        out.push_str(&format!("{} passed, {} failed\n", self.passed, self.failed));
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticSuite {
    Database,
    Settings,
    Cache,
    Mail,
    Backups,
    Jobs,
    Permissions,
}

impl DiagnosticSuite {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticSuite::Database => "database",
            DiagnosticSuite::Settings => "settings",
            DiagnosticSuite::Cache => "cache",
            DiagnosticSuite::Mail => "mail",
            DiagnosticSuite::Backups => "backups",
            DiagnosticSuite::Jobs => "jobs",
            DiagnosticSuite::Permissions => "permissions",
        }
    }

    pub fn all() -> Vec<DiagnosticSuite> {
        vec![
            DiagnosticSuite::Database,
            DiagnosticSuite::Settings,
            DiagnosticSuite::Cache,
            DiagnosticSuite::Mail,
            DiagnosticSuite::Backups,
            DiagnosticSuite::Jobs,
            DiagnosticSuite::Permissions,
        ]
    }

    /// `all` expands to every suite
    pub fn parse_selection(s: &str) -> Option<Vec<DiagnosticSuite>> {
        let name = s.trim().to_lowercase();
        if name == "all" {
            return Some(Self::all());
        }
        Self::all()
            .into_iter()
            .find(|suite| suite.as_str() == name)
            .map(|suite| vec![suite])
    }
}

impl std::fmt::Display for DiagnosticSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn passed(detail: impl Into<String>) -> anyhow::Result<String> {
    Ok(detail.into())
}

pub async fn run_suites(state: &AppState, suites: &[DiagnosticSuite]) -> Vec<ValidationSuite> {
    let mut results = Vec::with_capacity(suites.len());
    for suite in suites {
        results.push(run_suite(state, *suite).await);
    }
    results
}

pub async fn run_suite(state: &AppState, suite: DiagnosticSuite) -> ValidationSuite {
    let mut v = ValidationSuite::new(suite.as_str());
    match suite {
        DiagnosticSuite::Database => database_checks(state, &mut v).await,
        DiagnosticSuite::Settings => settings_checks(state, &mut v).await,
        DiagnosticSuite::Cache => cache_checks(state, &mut v).await,
        DiagnosticSuite::Mail => mail_checks(state, &mut v).await,
        DiagnosticSuite::Backups => backup_checks(state, &mut v).await,
        DiagnosticSuite::Jobs => job_checks(state, &mut v).await,
        DiagnosticSuite::Permissions => permission_checks(state, &mut v).await,
    }
    v
}

async fn database_checks(state: &AppState, v: &mut ValidationSuite) {
    v.check("connection", async {
        ensure!(db::ping(&state.db).await, "database did not answer a ping");
        passed("reachable".to_string())
    })
    .await;

    v.check("migrations", async {
        let pending = Migrator::get_pending_migrations(&state.db).await?;
        ensure!(pending.is_empty(), "{} pending migration(s)", pending.len());
        passed("up to date".to_string())
    })
    .await;

    v.check("users table", async {
        let users = User::find().count(&state.db).await?;
        passed(format!("{} user(s)", users))
    })
    .await;
}

async fn settings_checks(state: &AppState, v: &mut ValidationSuite) {
    v.check("sections load", async {
        for section in SECTIONS {
            state
                .settings
                .section(section)
                .await
                .with_context(|| format!("section {}", section))?;
        }
        passed(format!("{} sections", SECTIONS.len()))
    })
    .await;

    v.check("stored values", async {
        let rows = AppSetting::find().all(&state.db).await?;
        let mut invalid = Vec::new();
        for row in &rows {
            if let Some(def) = definition(&row.key) {
                if normalize_value(def, &row.value).is_err() {
                    invalid.push(row.key.clone());
                }
            }
        }
        ensure!(invalid.is_empty(), "invalid values for {}", invalid.join(", "));
        passed(format!("{} stored value(s) valid", rows.len()))
    })
    .await;

    v.check("footer", async {
        let footer = state.settings.footer().await?;
        ensure!(!footer.copyright.is_empty(), "footer copyright is empty");
        passed(footer.copyright)
    })
    .await;
}

async fn cache_checks(state: &AppState, v: &mut ValidationSuite) {
    v.check("read/write", async {
        let cache = state.settings.cache();
        let key = "diagnostics.check";
        cache.put(key, serde_json::json!("ok")).await;
        let read = cache.get(key).await;
        cache.forget(key).await;
        ensure!(read == Some(serde_json::json!("ok")), "cached value was not returned");
        passed(format!("ttl {}s", cache.ttl().as_secs()))
    })
    .await;

    v.check("entries", async {
        let purged = state.settings.cache().purge_expired().await;
        passed(format!(
            "{} live, {} expired purged",
            state.settings.cache().len().await,
            purged
        ))
    })
    .await;
}

async fn mail_checks(state: &AppState, v: &mut ValidationSuite) {
    v.check("default smtp config", async {
        match smtp::default_config(&state.db).await? {
            Some(config) => passed(format!("{} ({}:{})", config.name, config.host, config.port)),
            None if state.mail.driver() == MailDriver::Log => {
                passed("none (log driver)".to_string())
            }
            None => bail!("no active default SMTP configuration"),
        }
    })
    .await;

    v.check("smtp configs valid", async {
        let configs = smtp::list(&state.db).await?;
        let problems: Vec<String> = configs
            .iter()
            .filter(|c| c.is_active)
            .flat_map(|c| c.validate().into_iter().map(move |p| format!("{}: {}", c.name, p)))
            .collect();
        ensure!(problems.is_empty(), "{}", problems.join("; "));
        passed(format!("{} config(s)", configs.len()))
    })
    .await;

    v.check("required templates", async {
        let names: Vec<String> = templates::list(&state.db)
            .await?
            .into_iter()
            .filter(|t| t.is_active)
            .map(|t| t.name)
            .collect();
        let missing: Vec<&str> = REQUIRED_TEMPLATES
            .iter()
            .copied()
            .filter(|name| !names.iter().any(|n| n == name))
            .collect();
        ensure!(missing.is_empty(), "missing {}", missing.join(", "));
        passed(format!("{} active template(s)", names.len()))
    })
    .await;
}

async fn backup_checks(state: &AppState, v: &mut ValidationSuite) {
    v.check("backup dir writable", async {
        let dir = state.backups.backup_dir().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        let marker = dir.join(".write-check");
        tokio::fs::write(&marker, b"ok").await?;
        tokio::fs::remove_file(&marker).await?;
        passed(dir.display().to_string())
    })
    .await;

    v.check("completed backups present", async {
        let missing: Vec<String> = state
            .backups
            .list(true)
            .await?
            .into_iter()
            .filter(|b| b.is_completed())
            .filter(|b| {
                b.file_path
                    .as_ref()
                    .map(|p| !std::path::Path::new(p).is_dir())
                    .unwrap_or(true)
            })
            .map(|b| b.name)
            .collect();
        ensure!(missing.is_empty(), "missing directories for {}", missing.join(", "));
        passed("all present".to_string())
    })
    .await;
}

async fn job_checks(state: &AppState, v: &mut ValidationSuite) {
    v.check("queue stats", async {
        let stats = jobs::stats(&state.db, state.queue.reservation_timeout_secs).await?;
        passed(format!("{} pending, {} failed", stats.pending_total, stats.failed))
    })
    .await;

    v.check("known job types", async {
        let known = [handlers::SEND_EMAIL, handlers::CREATE_BACKUP, handlers::CLEANUP];
        let mut unknown: Vec<String> = jobs::pending(&state.db, None)
            .await?
            .into_iter()
            .map(|j| j.job_type)
            .filter(|t| !known.contains(&t.as_str()))
            .collect();
        unknown.sort();
        unknown.dedup();
        ensure!(unknown.is_empty(), "no handler for {}", unknown.join(", "));
        passed("every pending job has a handler".to_string())
    })
    .await;
}

async fn permission_checks(state: &AppState, v: &mut ValidationSuite) {
    v.check("admin role", async {
        let admin = find_role_by_name(&state.db, ADMIN_ROLE).await?;
        let perms = get_role_permissions(&state.db, admin.id).await?;
        ensure!(
            perms.iter().any(|p| p == WILDCARD),
            "admin role lacks the {} permission",
            WILDCARD
        );
        passed(format!("{} permission(s)", perms.len()))
    })
    .await;

    v.check("known permissions", async {
        let unknown: Vec<String> = RolePermission::find()
            .all(&state.db)
            .await?
            .into_iter()
            .map(|rp| rp.permission)
            .filter(|p| !is_known_permission(p))
            .collect();
        ensure!(unknown.is_empty(), "unknown permission(s) {}", unknown.join(", "));
        passed("all granted permissions are known".to_string())
    })
    .await;

    v.check("administrators", async {
        let admins = admin_emails(&state.db).await?;
        ensure!(!admins.is_empty(), "no active user holds the admin role");
        passed(format!("{} administrator(s)", admins.len()))
    })
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_suite_counts_failures_and_renders() {
        let mut suite = ValidationSuite::new("sample");
        assert!(suite.check("ok", async { passed("fine") }).await);
        assert!(!suite.check("broken", async {
            ensure!(1 + 1 == 3, "boom");
            passed("unreachable")
        })
        .await);

        assert_eq!(suite.passed, 1);
        assert_eq!(suite.failed, 1);
        assert!(!suite.is_success());

        let table = suite.render_table();
        assert!(table.contains("ok      PASS    fine"));
        assert!(table.contains("broken  FAIL    boom"));
        assert!(table.contains("1 passed, 1 failed"));
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!(DiagnosticSuite::parse_selection("all").map(|s| s.len()), Some(7));
        assert_eq!(
            DiagnosticSuite::parse_selection("Mail"),
            Some(vec![DiagnosticSuite::Mail])
        );
        assert!(DiagnosticSuite::parse_selection("network").is_none());
    }
}

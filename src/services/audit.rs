use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};

use crate::db::DbConn;
use crate::error::Result;
use crate::models::audit_log::{self, AuditAction, ResourceType};
use crate::models::user;
use crate::services::retention;

/// Who performed an audited action
#[derive(Debug, Clone, Default)]
pub struct Actor {
    pub user_id: Option<i64>,
    pub username: Option<String>,
}

impl Actor {
    pub fn user(id: i64, username: impl Into<String>) -> Self {
        Self {
            user_id: Some(id),
            username: Some(username.into()),
        }
    }

    fn named(label: &str) -> Self {
        Self {
            user_id: None,
            username: Some(label.to_string()),
        }
    }

    /// Management commands run from a shell
    pub fn console() -> Self {
        Self::named("console")
    }

    /// Scheduler and queue workers
    pub fn system() -> Self {
        Self::named("system")
    }
}

impl From<&user::Model> for Actor {
    fn from(user: &user::Model) -> Self {
        Self::user(user.id, user.name.clone())
    }
}

/// Append-only trail of administrative actions
#[derive(Clone)]
pub struct AuditService {
    db: DbConn,
}

impl AuditService {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn record(
        &self,
        action: AuditAction,
        resource_type: ResourceType,
        resource_id: Option<String>,
        actor: &Actor,
        details: Option<serde_json::Value>,
        outcome: std::result::Result<(), &str>,
    ) -> Result<audit_log::Model> {
        let entry = audit_log::ActiveModel {
            timestamp: Set(Utc::now()),
            user_id: Set(actor.user_id),
            username: Set(actor.username.clone()),
            action: Set(action.to_string()),
            resource_type: Set(resource_type.to_string()),
            resource_id: Set(resource_id),
            details: Set(details.map(|d| d.to_string())),
            success: Set(outcome.is_ok()),
            error_message: Set(outcome.err().map(str::to_string)),
            ..Default::default()
        };
        Ok(entry.insert(&self.db).await?)
    }

    /// Records a completed action. A failing audit write never fails the caller.
    pub async fn log_success(
        &self,
        action: AuditAction,
        resource_type: ResourceType,
        resource_id: Option<String>,
        actor: &Actor,
        details: Option<serde_json::Value>,
    ) {
        let written = self
            .record(action, resource_type, resource_id, actor, details, Ok(()))
            .await;
        if let Err(e) = written {
            tracing::warn!(error = %e, "Audit entry was not written");
        }
    }

    pub async fn log_failure(
        &self,
        action: AuditAction,
        resource_type: ResourceType,
        resource_id: Option<String>,
        actor: &Actor,
        details: Option<serde_json::Value>,
        error: &str,
    ) {
        let written = self
            .record(action, resource_type, resource_id, actor, details, Err(error))
            .await;
        if let Err(e) = written {
            tracing::warn!(error = %e, "Audit entry was not written");
        }
    }
}

/// Filters accepted by the audit log listing
#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema)]
pub struct AuditLogQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub user_id: Option<i64>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub success: Option<bool>,
    #[schema(value_type = Option<String>)]
    pub from: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>)]
    pub to: Option<DateTime<Utc>>,
    pub search: Option<String>,
}

impl AuditLogQuery {
    const DEFAULT_PER_PAGE: u64 = 50;
    const MAX_PER_PAGE: u64 = 100;

    fn page_window(&self) -> (u64, u64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self
            .per_page
            .unwrap_or(Self::DEFAULT_PER_PAGE)
            .clamp(1, Self::MAX_PER_PAGE);
        (page, per_page)
    }

    fn condition(&self) -> Condition {
        let mut cond = Condition::all()
            .add_option(self.user_id.map(|id| audit_log::Column::UserId.eq(id)))
            .add_option(self.action.as_ref().map(|a| audit_log::Column::Action.eq(a.as_str())))
            .add_option(
                self.resource_type
                    .as_ref()
                    .map(|r| audit_log::Column::ResourceType.eq(r.as_str())),
            )
            .add_option(self.success.map(|s| audit_log::Column::Success.eq(s)))
            .add_option(self.from.map(|from| audit_log::Column::Timestamp.gte(from)))
            .add_option(self.to.map(|to| audit_log::Column::Timestamp.lte(to)));

        if let Some(term) = self.search.as_deref().filter(|t| !t.trim().is_empty()) {
            cond = cond.add(
                Condition::any()
                    .add(audit_log::Column::Username.contains(term))
                    .add(audit_log::Column::Action.contains(term))
                    .add(audit_log::Column::ResourceId.contains(term))
                    .add(audit_log::Column::Details.contains(term)),
            );
        }
        cond
    }
}

/// One page of audit entries, newest first
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct AuditLogResponse {
    pub logs: Vec<audit_log::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub total_pages: u64,
}

pub async fn get_audit_logs(db: &DbConn, query: AuditLogQuery) -> Result<AuditLogResponse> {
    let (page, per_page) = query.page_window();
    let select = audit_log::Entity::find().filter(query.condition());

    let total = select.clone().count(db).await?;
    let logs = select
        .order_by_desc(audit_log::Column::Timestamp)
        .order_by_desc(audit_log::Column::Id)
        .offset((page - 1) * per_page)
        .limit(per_page)
        .all(db)
        .await?;

    Ok(AuditLogResponse {
        logs,
        total,
        page,
        per_page,
        total_pages: total.div_ceil(per_page),
    })
}

fn retention_cutoff(days: i64) -> Result<Condition> {
    let cutoff = retention::cutoff_before(Utc::now(), days)?;
    Ok(Condition::all().add(audit_log::Column::Timestamp.lt(cutoff)))
}

/// Entries older than the retention window
pub async fn count_old_logs(db: &DbConn, days: i64) -> Result<u64> {
    Ok(audit_log::Entity::find()
        .filter(retention_cutoff(days)?)
        .count(db)
        .await?)
}

pub async fn clear_old_logs(db: &DbConn, days: i64) -> Result<u64> {
    let result = audit_log::Entity::delete_many()
        .filter(retention_cutoff(days)?)
        .exec(db)
        .await?;
    if result.rows_affected > 0 {
        tracing::info!(removed = result.rows_affected, days, "Pruned audit log");
    }
    Ok(result.rows_affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use sea_orm::sea_query::Expr;

    async fn service() -> AuditService {
        let conn = sea_orm::Database::connect("sqlite::memory:").await.unwrap();
        db::run_migrations(&conn).await.unwrap();
        AuditService::new(conn)
    }

    #[tokio::test]
    async fn test_failure_is_recorded_with_message() {
        let audit = service().await;
        let entry = audit
            .record(
                AuditAction::BackupFailed,
                ResourceType::Backup,
                Some("3".to_string()),
                &Actor::system(),
                None,
                Err("disk full"),
            )
            .await
            .unwrap();
        assert!(!entry.success);
        assert_eq!(entry.error_message.as_deref(), Some("disk full"));
        assert_eq!(entry.username.as_deref(), Some("system"));
    }

    #[tokio::test]
    async fn test_search_and_paging() {
        let audit = service().await;
        for key in ["general", "mail", "security"] {
            audit
                .log_success(
                    AuditAction::SettingChanged,
                    ResourceType::Setting,
                    Some(key.to_string()),
                    &Actor::console(),
                    None,
                )
                .await;
        }

        let query = AuditLogQuery {
            search: Some("mail".to_string()),
            ..Default::default()
        };
        let found = get_audit_logs(&audit.db, query).await.unwrap();
        assert_eq!(found.total, 1);
        assert_eq!(found.logs[0].resource_id.as_deref(), Some("mail"));

        let query = AuditLogQuery {
            per_page: Some(2),
            page: Some(2),
            ..Default::default()
        };
        let page = get_audit_logs(&audit.db, query).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.logs.len(), 1);

        audit_log::Entity::update_many()
            .col_expr(
                audit_log::Column::Timestamp,
                Expr::value(Utc::now() - chrono::Duration::days(10)),
            )
            .exec(&audit.db)
            .await
            .unwrap();
        assert_eq!(count_old_logs(&audit.db, 30).await.unwrap(), 0);
        assert_eq!(count_old_logs(&audit.db, 7).await.unwrap(), 3);
        assert_eq!(clear_old_logs(&audit.db, 7).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_retention_outside_bounds_is_rejected() {
        let audit = service().await;
        assert!(matches!(
            clear_old_logs(&audit.db, i64::MAX).await,
            Err(crate::error::AppError::BadRequest(_))
        ));
        assert!(count_old_logs(&audit.db, -1).await.is_err());
    }
}

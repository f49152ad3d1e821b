use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, utoipa::ToSchema)]
#[sea_orm(table_name = "audit_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[schema(value_type = String)]
    pub timestamp: DateTimeUtc,
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub details: Option<String>, // JSON string for flexible data
    pub success: bool,
    pub error_message: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

// Audit action types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuditAction {
    // Authentication
    Login,
    LoginFailed,
    Logout,

    // User management
    UserCreated,
    UserUpdated,
    UserDeleted,
    UserVerified,

    // Role management
    RoleCreated,
    RoleUpdated,
    RoleDeleted,
    RoleAssigned,
    RoleUnassigned,

    // Settings
    SettingChanged,
    SettingsReset,
    MaintenanceEnabled,
    MaintenanceDisabled,

    // Mail
    SmtpConfigCreated,
    SmtpConfigUpdated,
    SmtpConfigDeleted,
    TemplateCreated,
    TemplateUpdated,
    TemplateDeleted,

    // Backups
    BackupCreated,
    BackupFailed,
    BackupRestored,
    BackupDeleted,

    // Jobs
    JobDispatched,
    JobsRetried,
    JobsFlushed,

    // Housekeeping
    CleanupRun,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditAction::Login => "login",
            AuditAction::LoginFailed => "login_failed",
            AuditAction::Logout => "logout",
            AuditAction::UserCreated => "user_created",
            AuditAction::UserUpdated => "user_updated",
            AuditAction::UserDeleted => "user_deleted",
            AuditAction::UserVerified => "user_verified",
            AuditAction::RoleCreated => "role_created",
            AuditAction::RoleUpdated => "role_updated",
            AuditAction::RoleDeleted => "role_deleted",
            AuditAction::RoleAssigned => "role_assigned",
            AuditAction::RoleUnassigned => "role_unassigned",
            AuditAction::SettingChanged => "setting_changed",
            AuditAction::SettingsReset => "settings_reset",
            AuditAction::MaintenanceEnabled => "maintenance_enabled",
            AuditAction::MaintenanceDisabled => "maintenance_disabled",
            AuditAction::SmtpConfigCreated => "smtp_config_created",
            AuditAction::SmtpConfigUpdated => "smtp_config_updated",
            AuditAction::SmtpConfigDeleted => "smtp_config_deleted",
            AuditAction::TemplateCreated => "template_created",
            AuditAction::TemplateUpdated => "template_updated",
            AuditAction::TemplateDeleted => "template_deleted",
            AuditAction::BackupCreated => "backup_created",
            AuditAction::BackupFailed => "backup_failed",
            AuditAction::BackupRestored => "backup_restored",
            AuditAction::BackupDeleted => "backup_deleted",
            AuditAction::JobDispatched => "job_dispatched",
            AuditAction::JobsRetried => "jobs_retried",
            AuditAction::JobsFlushed => "jobs_flushed",
            AuditAction::CleanupRun => "cleanup_run",
        };
        write!(f, "{}", s)
    }
}

// Resource types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResourceType {
    User,
    Role,
    Setting,
    SmtpConfig,
    EmailTemplate,
    Backup,
    Job,
    System,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::User => write!(f, "user"),
            ResourceType::Role => write!(f, "role"),
            ResourceType::Setting => write!(f, "setting"),
            ResourceType::SmtpConfig => write!(f, "smtp_config"),
            ResourceType::EmailTemplate => write!(f, "email_template"),
            ResourceType::Backup => write!(f, "backup"),
            ResourceType::Job => write!(f, "job"),
            ResourceType::System => write!(f, "system"),
        }
    }
}

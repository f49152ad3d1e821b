use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, utoipa::ToSchema)]
#[sea_orm(table_name = "backups")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub name: String,
    pub backup_type: String,
    pub status: String,
    pub file_path: Option<String>,
    pub file_hash: Option<String>,
    pub file_size: Option<i64>,
    pub error_message: Option<String>,
    #[schema(value_type = Option<String>)]
    pub expires_at: Option<DateTimeUtc>,
    #[schema(value_type = Option<String>)]
    pub completed_at: Option<DateTimeUtc>,
    #[schema(value_type = Option<String>)]
    pub restored_at: Option<DateTimeUtc>,
    pub created_by: Option<i64>,
    #[schema(value_type = String)]
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// A backup is expired once `now` is strictly past its expiry timestamp
    pub fn is_expired_at(&self, now: DateTimeUtc) -> bool {
        self.expires_at.map(|expires| now > expires).unwrap_or(false)
    }

    pub fn is_completed(&self) -> bool {
        self.status == BackupStatus::Completed.as_str()
    }
}

/// What a backup contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    Database,
    Files,
    Full,
}

impl BackupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupType::Database => "database",
            BackupType::Files => "files",
            BackupType::Full => "full",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "database" | "db" => Some(BackupType::Database),
            "files" => Some(BackupType::Files),
            "full" => Some(BackupType::Full),
            _ => None,
        }
    }

    pub fn includes_database(&self) -> bool {
        matches!(self, BackupType::Database | BackupType::Full)
    }

    pub fn includes_files(&self) -> bool {
        matches!(self, BackupType::Files | BackupType::Full)
    }
}

impl std::fmt::Display for BackupType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupStatus {
    Pending,
    Completed,
    Failed,
}

impl BackupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupStatus::Pending => "pending",
            BackupStatus::Completed => "completed",
            BackupStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

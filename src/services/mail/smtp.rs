//! Stored SMTP configurations
//!
//! At most one configuration is the default at any time; the first stored
//! configuration becomes the default automatically.

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::DbConn;
use crate::error::{AppError, Result};
use crate::models::prelude::*;
use crate::models::smtp_config;

fn default_port() -> i32 {
    587
}

fn default_encryption() -> String {
    "starttls".to_string()
}

fn default_timeout() -> i32 {
    30
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Validate, utoipa::ToSchema)]
pub struct SmtpConfigInput {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(min = 1, message = "Host is required"))]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: i32,
    #[serde(default = "default_encryption")]
    pub encryption: String,
    pub username: Option<String>,
    /// Omit on update to keep the stored password
    pub password: Option<String>,
    #[validate(email(message = "Invalid from address"))]
    pub from_address: String,
    pub from_name: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// `true` promotes this configuration to the default
    #[serde(default)]
    pub is_default: bool,
}

/// SMTP configuration as exposed over the API (password masked)
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct SmtpConfigResponse {
    pub id: i64,
    pub name: String,
    pub host: String,
    pub port: i32,
    pub encryption: String,
    pub username: Option<String>,
    pub has_password: bool,
    pub from_address: String,
    pub from_name: Option<String>,
    pub timeout_secs: i32,
    pub is_default: bool,
    pub is_active: bool,
}

impl From<smtp_config::Model> for SmtpConfigResponse {
    fn from(m: smtp_config::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            host: m.host,
            port: m.port,
            encryption: m.encryption,
            username: m.username,
            has_password: m.password.map(|p| !p.is_empty()).unwrap_or(false),
            from_address: m.from_address,
            from_name: m.from_name,
            timeout_secs: m.timeout_secs,
            is_default: m.is_default,
            is_active: m.is_active,
        }
    }
}

fn candidate(input: &SmtpConfigInput, id: i64, password: Option<String>) -> smtp_config::Model {
    let now = Utc::now();
    smtp_config::Model {
        id,
        name: input.name.trim().to_string(),
        host: input.host.trim().to_string(),
        port: input.port,
        encryption: input.encryption.trim().to_lowercase(),
        username: input.username.clone().filter(|u| !u.is_empty()),
        password,
        from_address: input.from_address.trim().to_string(),
        from_name: input.from_name.clone(),
        timeout_secs: input.timeout_secs,
        is_default: input.is_default,
        is_active: input.is_active,
        created_at: now,
        updated_at: now,
    }
}

fn reject_problems(model: &smtp_config::Model) -> Result<()> {
    let problems = model.validate();
    if problems.is_empty() {
        Ok(())
    } else {
        Err(AppError::BadRequest(problems.join("; ")))
    }
}

async fn ensure_unique_name(db: &DbConn, name: &str, except: Option<i64>) -> Result<()> {
    let mut query = SmtpConfig::find().filter(smtp_config::Column::Name.eq(name));
    if let Some(id) = except {
        query = query.filter(smtp_config::Column::Id.ne(id));
    }
    if query.one(db).await?.is_some() {
        return Err(AppError::Conflict(format!(
            "SMTP configuration '{}' already exists",
            name
        )));
    }
    Ok(())
}

pub async fn list(db: &DbConn) -> Result<Vec<smtp_config::Model>> {
    Ok(SmtpConfig::find()
        .order_by_asc(smtp_config::Column::Name)
        .all(db)
        .await?)
}

pub async fn get(db: &DbConn, id: i64) -> Result<smtp_config::Model> {
    SmtpConfig::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("SMTP configuration {} not found", id)))
}

/// The active default configuration, if any
pub async fn default_config(db: &DbConn) -> Result<Option<smtp_config::Model>> {
    Ok(SmtpConfig::find()
        .filter(smtp_config::Column::IsDefault.eq(true))
        .filter(smtp_config::Column::IsActive.eq(true))
        .one(db)
        .await?)
}

pub async fn create(db: &DbConn, input: SmtpConfigInput) -> Result<smtp_config::Model> {
    input.validate()?;
    let model = candidate(&input, 0, input.password.clone());
    reject_problems(&model)?;
    ensure_unique_name(db, &model.name, None).await?;

    let created = smtp_config::ActiveModel {
        name: Set(model.name),
        host: Set(model.host),
        port: Set(model.port),
        encryption: Set(model.encryption),
        username: Set(model.username),
        password: Set(model.password),
        from_address: Set(model.from_address),
        from_name: Set(model.from_name),
        timeout_secs: Set(model.timeout_secs),
        is_default: Set(false),
        is_active: Set(model.is_active),
        created_at: Set(model.created_at),
        updated_at: Set(model.updated_at),
        ..Default::default()
    }
    .insert(db)
    .await?;

    let total = SmtpConfig::find().count(db).await?;
    if input.is_default || total == 1 {
        return set_default(db, created.id).await;
    }

    Ok(created)
}

pub async fn update(db: &DbConn, id: i64, input: SmtpConfigInput) -> Result<smtp_config::Model> {
    input.validate()?;
    let existing = get(db, id).await?;
    let password = input.password.clone().or_else(|| existing.password.clone());
    let model = candidate(&input, id, password);
    reject_problems(&model)?;
    ensure_unique_name(db, &model.name, Some(id)).await?;

    let mut active: smtp_config::ActiveModel = existing.into();
    active.name = Set(model.name);
    active.host = Set(model.host);
    active.port = Set(model.port);
    active.encryption = Set(model.encryption);
    active.username = Set(model.username);
    active.password = Set(model.password);
    active.from_address = Set(model.from_address);
    active.from_name = Set(model.from_name);
    active.timeout_secs = Set(model.timeout_secs);
    active.is_active = Set(model.is_active);
    active.updated_at = Set(Utc::now());
    let updated = active.update(db).await?;

    if updated.is_default && !updated.is_active {
        return match promote_replacement(db, id).await? {
            Some(_) => get(db, id).await,
            None => Ok(updated),
        };
    }
    if input.is_default && updated.is_active && !updated.is_default {
        return set_default(db, id).await;
    }

    Ok(updated)
}

/// Hand the default flag to the oldest other active configuration
async fn promote_replacement(db: &DbConn, replacing: i64) -> Result<Option<smtp_config::Model>> {
    let replacement = SmtpConfig::find()
        .filter(smtp_config::Column::IsActive.eq(true))
        .filter(smtp_config::Column::Id.ne(replacing))
        .order_by_asc(smtp_config::Column::CreatedAt)
        .order_by_asc(smtp_config::Column::Id)
        .one(db)
        .await?;
    match replacement {
        Some(next) => Ok(Some(set_default(db, next.id).await?)),
        None => Ok(None),
    }
}

/// Delete a configuration; when it was the default the oldest remaining active one is promoted
pub async fn delete(db: &DbConn, id: i64) -> Result<()> {
    let existing = get(db, id).await?;
    SmtpConfig::delete_by_id(id).exec(db).await?;

    if existing.is_default {
        promote_replacement(db, id).await?;
    }

    Ok(())
}

/// Make `id` the only default configuration
pub async fn set_default(db: &DbConn, id: i64) -> Result<smtp_config::Model> {
    let txn = db.begin().await?;

    let target = SmtpConfig::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("SMTP configuration {} not found", id)))?;

    SmtpConfig::update_many()
        .col_expr(smtp_config::Column::IsDefault, Expr::value(false))
        .filter(smtp_config::Column::Id.ne(id))
        .exec(&txn)
        .await?;

    let mut active: smtp_config::ActiveModel = target.into();
    active.is_default = Set(true);
    active.updated_at = Set(Utc::now());
    let updated = active.update(&txn).await?;

    txn.commit().await?;
    tracing::info!(smtp_config_id = id, "Default SMTP configuration changed");
    Ok(updated)
}

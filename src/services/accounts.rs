//! Users, roles and permission lookups shared by endpoints and commands

use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};

use crate::db::DbConn;
use crate::error::{AppError, Result};
use crate::middleware::permissions::{is_known_permission, permission_granted};
use crate::models::prelude::*;
use crate::models::{role, role_permission, user, user_role};
use crate::services::security::hash_password;

pub const ADMIN_ROLE: &str = "admin";

/// How long an account stays locked after too many failed logins
pub const LOCKOUT_MINUTES: i64 = 15;

/// Get all permissions for a user (from all their roles), sorted and deduplicated
pub async fn get_user_permissions(db: &DbConn, user_id: i64) -> Result<Vec<String>> {
    let role_ids: Vec<i64> = UserRole::find()
        .filter(user_role::Column::UserId.eq(user_id))
        .all(db)
        .await?
        .into_iter()
        .map(|ur| ur.role_id)
        .collect();

    if role_ids.is_empty() {
        return Ok(vec![]);
    }

    let mut unique_perms: Vec<String> = RolePermission::find()
        .filter(role_permission::Column::RoleId.is_in(role_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|p| p.permission)
        .collect();

    unique_perms.sort();
    unique_perms.dedup();
    Ok(unique_perms)
}

pub async fn user_has_permission(db: &DbConn, user_id: i64, permission: &str) -> Result<bool> {
    let perms = get_user_permissions(db, user_id).await?;
    Ok(permission_granted(&perms, permission))
}

pub async fn get_user_roles(db: &DbConn, user_id: i64) -> Result<Vec<role::Model>> {
    let role_ids: Vec<i64> = UserRole::find()
        .filter(user_role::Column::UserId.eq(user_id))
        .all(db)
        .await?
        .into_iter()
        .map(|ur| ur.role_id)
        .collect();

    if role_ids.is_empty() {
        return Ok(vec![]);
    }

    Ok(Role::find()
        .filter(role::Column::Id.is_in(role_ids))
        .order_by_asc(role::Column::Name)
        .all(db)
        .await?)
}

pub async fn get_role_permissions(db: &DbConn, role_id: i64) -> Result<Vec<String>> {
    let mut perms: Vec<String> = RolePermission::find()
        .filter(role_permission::Column::RoleId.eq(role_id))
        .all(db)
        .await?
        .into_iter()
        .map(|p| p.permission)
        .collect();
    perms.sort();
    Ok(perms)
}

pub async fn find_role_by_name(db: &DbConn, name: &str) -> Result<role::Model> {
    Role::find()
        .filter(role::Column::Name.eq(name))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Role '{}' not found", name)))
}

pub async fn find_user_by_email(db: &DbConn, email: &str) -> Result<user::Model> {
    User::find()
        .filter(user::Column::Email.eq(email.trim().to_lowercase()))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User '{}' not found", email)))
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub verified: bool,
}

/// Create a user; emails are unique case-insensitively
pub async fn create_user(db: &DbConn, new_user: NewUser) -> Result<user::Model> {
    let email = new_user.email.trim().to_lowercase();

    let existing = User::find()
        .filter(user::Column::Email.eq(&email))
        .one(db)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict(format!(
            "A user with email '{}' already exists",
            email
        )));
    }

    let now = Utc::now();
    let created = user::ActiveModel {
        name: Set(new_user.name.trim().to_string()),
        email: Set(email),
        hashed_password: Set(hash_password(&new_user.password)?),
        email_verified_at: Set(new_user.verified.then_some(now)),
        is_active: Set(true),
        failed_login_count: Set(0),
        locked_until: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    tracing::info!(user_id = created.id, email = %created.email, "User created");
    Ok(created)
}

/// Mark a user's email as verified; the first verification timestamp is kept
pub async fn verify_email(db: &DbConn, user_id: i64) -> Result<user::Model> {
    let found = User::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

    if found.is_verified() {
        return Ok(found);
    }

    let now = Utc::now();
    let mut model: user::ActiveModel = found.into();
    model.email_verified_at = Set(Some(now));
    model.updated_at = Set(now);
    Ok(model.update(db).await?)
}

/// Give a user a role; assigning an already held role is a no-op
pub async fn assign_role(db: &DbConn, user_id: i64, role_id: i64) -> Result<()> {
    let existing = UserRole::find_by_id((user_id, role_id)).one(db).await?;
    if existing.is_some() {
        return Ok(());
    }

    user_role::ActiveModel {
        user_id: Set(user_id),
        role_id: Set(role_id),
    }
    .insert(db)
    .await?;
    Ok(())
}

pub async fn unassign_role(db: &DbConn, user_id: i64, role_id: i64) -> Result<bool> {
    let result = UserRole::delete_by_id((user_id, role_id)).exec(db).await?;
    Ok(result.rows_affected > 0)
}

/// Replace all roles of a user
pub async fn set_user_roles(db: &DbConn, user_id: i64, role_ids: &[i64]) -> Result<Vec<role::Model>> {
    let roles = if role_ids.is_empty() {
        vec![]
    } else {
        Role::find()
            .filter(role::Column::Id.is_in(role_ids.to_vec()))
            .all(db)
            .await?
    };
    if roles.len() != role_ids.len() {
        return Err(AppError::BadRequest("One or more roles do not exist".to_string()));
    }

    let txn = db.begin().await?;
    UserRole::delete_many()
        .filter(user_role::Column::UserId.eq(user_id))
        .exec(&txn)
        .await?;
    for role in &roles {
        user_role::ActiveModel {
            user_id: Set(user_id),
            role_id: Set(role.id),
        }
        .insert(&txn)
        .await?;
    }
    txn.commit().await?;

    Ok(roles)
}

/// Replace the permission list of a role
pub async fn set_role_permissions(db: &DbConn, role_id: i64, permissions: &[String]) -> Result<Vec<String>> {
    if let Some(unknown) = permissions.iter().find(|p| !is_known_permission(p)) {
        return Err(AppError::BadRequest(format!("Unknown permission '{}'", unknown)));
    }

    let mut perms = permissions.to_vec();
    perms.sort();
    perms.dedup();

    let txn = db.begin().await?;
    RolePermission::delete_many()
        .filter(role_permission::Column::RoleId.eq(role_id))
        .exec(&txn)
        .await?;
    for perm in &perms {
        role_permission::ActiveModel {
            role_id: Set(role_id),
            permission: Set(perm.clone()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
    }
    txn.commit().await?;

    Ok(perms)
}

/// Emails of active users holding the admin role
pub async fn admin_emails(db: &DbConn) -> Result<Vec<String>> {
    let admin = match Role::find()
        .filter(role::Column::Name.eq(ADMIN_ROLE))
        .one(db)
        .await?
    {
        Some(role) => role,
        None => return Ok(vec![]),
    };

    let user_ids: Vec<i64> = UserRole::find()
        .filter(user_role::Column::RoleId.eq(admin.id))
        .all(db)
        .await?
        .into_iter()
        .map(|ur| ur.user_id)
        .collect();

    if user_ids.is_empty() {
        return Ok(vec![]);
    }

    Ok(User::find()
        .filter(user::Column::Id.is_in(user_ids))
        .filter(user::Column::IsActive.eq(true))
        .order_by_asc(user::Column::Email)
        .all(db)
        .await?
        .into_iter()
        .map(|u| u.email)
        .collect())
}

// ============================================================================
// User maintenance
// ============================================================================

pub async fn get_user(db: &DbConn, user_id: i64) -> Result<user::Model> {
    User::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
}

pub async fn list_users(db: &DbConn) -> Result<Vec<user::Model>> {
    Ok(User::find().order_by_asc(user::Column::Id).all(db).await?)
}

/// Fields left as `None` are unchanged
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub is_active: Option<bool>,
}

pub async fn update_user(db: &DbConn, user_id: i64, update: UserUpdate) -> Result<user::Model> {
    let existing = get_user(db, user_id).await?;
    let mut model: user::ActiveModel = existing.into();

    if let Some(name) = update.name {
        model.name = Set(name.trim().to_string());
    }
    if let Some(email) = update.email {
        let email = email.trim().to_lowercase();
        let clash = User::find()
            .filter(user::Column::Email.eq(&email))
            .filter(user::Column::Id.ne(user_id))
            .one(db)
            .await?;
        if clash.is_some() {
            return Err(AppError::Conflict(format!(
                "A user with email '{}' already exists",
                email
            )));
        }
        model.email = Set(email);
    }
    // A new password also lifts any lockout
    if let Some(password) = update.password {
        model.hashed_password = Set(hash_password(&password)?);
        model.failed_login_count = Set(0);
        model.locked_until = Set(None);
    }
    if let Some(is_active) = update.is_active {
        model.is_active = Set(is_active);
    }
    model.updated_at = Set(Utc::now());

    Ok(model.update(db).await?)
}

/// Count a failed login; the account locks once `max_attempts` is reached (0 never locks)
pub async fn record_failed_login(
    db: &DbConn,
    account: &user::Model,
    max_attempts: i64,
) -> Result<user::Model> {
    let failures = account.failed_login_count.saturating_add(1);
    let now = Utc::now();
    let mut model: user::ActiveModel = account.clone().into();
    model.failed_login_count = Set(failures);

    if max_attempts > 0 && i64::from(failures) >= max_attempts {
        let until = now + Duration::minutes(LOCKOUT_MINUTES);
        model.locked_until = Set(Some(until));
        tracing::warn!(user_id = account.id, failures, locked_until = %until, "Account locked");
    }
    model.updated_at = Set(now);
    Ok(model.update(db).await?)
}

/// Reset the failure counter after a successful login
pub async fn clear_failed_logins(db: &DbConn, account: user::Model) -> Result<user::Model> {
    if account.failed_login_count == 0 && account.locked_until.is_none() {
        return Ok(account);
    }
    let mut model: user::ActiveModel = account.into();
    model.failed_login_count = Set(0);
    model.locked_until = Set(None);
    Ok(model.update(db).await?)
}

/// Lift a lockout early
pub async fn unlock_user(db: &DbConn, user_id: i64) -> Result<user::Model> {
    let account = get_user(db, user_id).await?;
    clear_failed_logins(db, account).await
}

/// Seconds until a locked account may try again
pub fn lockout_remaining(account: &user::Model, now: DateTime<Utc>) -> Option<i64> {
    account
        .locked_until
        .filter(|until| *until > now)
        .map(|until| (until - now).num_seconds().max(1))
}

pub async fn delete_user(db: &DbConn, user_id: i64) -> Result<()> {
    let txn = db.begin().await?;
    UserRole::delete_many()
        .filter(user_role::Column::UserId.eq(user_id))
        .exec(&txn)
        .await?;
    let result = User::delete_by_id(user_id).exec(&txn).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound(format!("User {} not found", user_id)));
    }
    txn.commit().await?;
    tracing::info!(user_id, "User deleted");
    Ok(())
}

// ============================================================================
// Role maintenance
// ============================================================================

pub async fn get_role(db: &DbConn, role_id: i64) -> Result<role::Model> {
    Role::find_by_id(role_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Role {} not found", role_id)))
}

pub async fn list_roles(db: &DbConn) -> Result<Vec<role::Model>> {
    Ok(Role::find().order_by_asc(role::Column::Name).all(db).await?)
}

pub async fn create_role(
    db: &DbConn,
    name: &str,
    description: Option<String>,
    permissions: &[String],
) -> Result<role::Model> {
    let name = name.trim().to_lowercase();
    if name.is_empty() {
        return Err(AppError::BadRequest("Role name cannot be empty".to_string()));
    }
    if Role::find()
        .filter(role::Column::Name.eq(&name))
        .one(db)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(format!("Role '{}' already exists", name)));
    }

    let created = role::ActiveModel {
        name: Set(name),
        description: Set(description),
        is_system: Set(false),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    set_role_permissions(db, created.id, permissions).await?;
    Ok(created)
}

/// Rename or re-describe a role; system roles keep their name
pub async fn update_role(
    db: &DbConn,
    role_id: i64,
    name: Option<String>,
    description: Option<String>,
) -> Result<role::Model> {
    let existing = get_role(db, role_id).await?;

    let rename = name
        .map(|n| n.trim().to_lowercase())
        .filter(|n| n != &existing.name);
    if let Some(new_name) = &rename {
        if existing.is_system {
            return Err(AppError::BadRequest(format!(
                "System role '{}' cannot be renamed",
                existing.name
            )));
        }
        if Role::find()
            .filter(role::Column::Name.eq(new_name))
            .one(db)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(format!("Role '{}' already exists", new_name)));
        }
    }

    let mut model: role::ActiveModel = existing.into();
    if let Some(new_name) = rename {
        model.name = Set(new_name);
    }
    if description.is_some() {
        model.description = Set(description);
    }
    Ok(model.update(db).await?)
}

pub async fn delete_role(db: &DbConn, role_id: i64) -> Result<()> {
    let existing = get_role(db, role_id).await?;
    if existing.is_system {
        return Err(AppError::BadRequest(format!(
            "System role '{}' cannot be deleted",
            existing.name
        )));
    }

    let txn = db.begin().await?;
    UserRole::delete_many()
        .filter(user_role::Column::RoleId.eq(role_id))
        .exec(&txn)
        .await?;
    RolePermission::delete_many()
        .filter(role_permission::Column::RoleId.eq(role_id))
        .exec(&txn)
        .await?;
    Role::delete_by_id(role_id).exec(&txn).await?;
    txn.commit().await?;
    Ok(())
}

//! Back-office permissions as zero-sized marker types.
//!
//! A handler names what it needs in its signature:
//! ```ignore
//! async fn restore(Authorized(user, _): Authorized<BackupsManage>, ...) -> Result<Json<..>>
//! ```

use std::marker::PhantomData;

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;
use crate::middleware::AuthenticatedUser;
use crate::models::user;

/// Grants every permission
pub const WILDCARD: &str = "*";

pub trait Permission: Send + Sync + 'static {
    /// Stored form, `section.action`
    const NAME: &'static str;
}

/// Declares one marker type per permission plus `ALL_PERMISSIONS`
macro_rules! define_permissions {
    ($($(#[$meta:meta])* $name:ident => $perm:expr),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy)]
            pub struct $name;

            impl Permission for $name {
                const NAME: &'static str = $perm;
            }
        )*

        /// Every known permission string
        pub const ALL_PERMISSIONS: &[&str] = &[$($perm),*];
    };
}

define_permissions! {
    // User management
    /// View users list and details
    UsersView => "users.view",
    /// Create, update, delete and verify users
    UsersManage => "users.manage",

    // Role management
    RolesView => "roles.view",
    RolesManage => "roles.manage",

    // Settings
    SettingsView => "settings.view",
    SettingsManage => "settings.manage",

    // Mail
    /// View SMTP configurations and email templates
    MailView => "mail.view",
    /// Edit SMTP configurations and templates, send test mails
    MailManage => "mail.manage",

    // Backups
    BackupsView => "backups.view",
    /// Create, restore and delete backups
    BackupsManage => "backups.manage",

    // Jobs
    JobsView => "jobs.view",
    JobsManage => "jobs.manage",

    // System
    /// View system status
    SystemView => "system.view",
    /// Toggle maintenance mode; bypasses it too
    SystemManage => "system.manage",

    // Audit
    AuditView => "audit.view",
}

/// Section part of a `section.action` permission
fn section_of(perm: &str) -> Option<&str> {
    perm.split_once('.').map(|(section, _)| section)
}

/// Whether `granted` satisfies `required`, honouring `*` and `section.*`
pub fn permission_granted(granted: &[String], required: &str) -> bool {
    granted.iter().any(|perm| match perm.strip_suffix(".*") {
        _ if perm == WILDCARD || perm == required => true,
        Some(section) => section_of(required) == Some(section),
        None => false,
    })
}

/// Whether a stored permission string is one the application knows
pub fn is_known_permission(perm: &str) -> bool {
    if perm == WILDCARD || ALL_PERMISSIONS.contains(&perm) {
        return true;
    }
    perm.strip_suffix(".*").is_some_and(|section| {
        ALL_PERMISSIONS
            .iter()
            .any(|known| section_of(known) == Some(section))
    })
}

fn current_user(parts: &Parts) -> Result<&AuthenticatedUser, AppError> {
    parts
        .extensions
        .get::<AuthenticatedUser>()
        .ok_or_else(|| AppError::Unauthorized("Sign in required".to_string()))
}

/// Handler argument that only resolves when the caller holds `P`.
/// Missing session gives 401, missing permission 403.
#[derive(Debug, Clone)]
pub struct Authorized<P: Permission>(pub user::Model, pub PhantomData<P>);

impl<P: Permission> Authorized<P> {
    pub fn user(&self) -> &user::Model {
        &self.0
    }

    pub fn user_id(&self) -> i64 {
        self.0.id
    }
}

impl<S, P> FromRequestParts<S> for Authorized<P>
where
    S: Send + Sync,
    P: Permission,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let caller = current_user(parts)?;
        if caller.has_permission(P::NAME) {
            Ok(Authorized(caller.user.clone(), PhantomData))
        } else {
            Err(AppError::Forbidden(format!("Missing permission '{}'", P::NAME)))
        }
    }
}

/// Handler argument for routes open to any signed-in user
#[derive(Debug, Clone)]
pub struct Authenticated(pub AuthenticatedUser);

impl Authenticated {
    pub fn user(&self) -> &user::Model {
        &self.0.user
    }

    pub fn permissions(&self) -> &[String] {
        &self.0.permissions
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        current_user(parts).cloned().map(Authenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perms(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_wildcard_grants_everything() {
        let granted = perms(&["*"]);
        for perm in ALL_PERMISSIONS {
            assert!(permission_granted(&granted, perm));
        }
    }

    #[test]
    fn test_section_wildcard() {
        let granted = perms(&["backups.*"]);
        assert!(permission_granted(&granted, "backups.manage"));
        assert!(!permission_granted(&granted, "backupsx.view"));
        assert!(!permission_granted(&granted, "users.view"));
    }

    #[test]
    fn test_exact_permission() {
        let granted = perms(&["settings.view"]);
        assert!(permission_granted(&granted, SettingsView::NAME));
        assert!(!permission_granted(&granted, SettingsManage::NAME));
        assert!(!permission_granted(&[], SettingsView::NAME));
    }

    #[test]
    fn test_known_permissions() {
        assert!(is_known_permission("*"));
        assert!(is_known_permission("mail.manage"));
        assert!(is_known_permission("jobs.*"));
        assert!(!is_known_permission("apps.install"));
        assert!(!is_known_permission("nothing.*"));
    }
}

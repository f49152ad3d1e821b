pub mod app_setting;
pub mod audit_log;
pub mod backup;
pub mod email_template;
pub mod failed_job;
pub mod job;
pub mod role;
pub mod role_permission;
pub mod smtp_config;
pub mod user;
pub mod user_role;

#[allow(unused_imports)]
pub mod prelude {
    pub use super::app_setting::{self, Entity as AppSetting};
    pub use super::audit_log::{self, Entity as AuditLog};
    pub use super::backup::{self, Entity as Backup};
    pub use super::email_template::{self, Entity as EmailTemplate};
    pub use super::failed_job::{self, Entity as FailedJob};
    pub use super::job::{self, Entity as Job};
    pub use super::role::{self, Entity as Role};
    pub use super::role_permission::{self, Entity as RolePermission};
    pub use super::smtp_config::{self, Entity as SmtpConfig};
    pub use super::user::{self, Entity as User};
    pub use super::user_role::{self, Entity as UserRole};
}

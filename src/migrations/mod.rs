pub use sea_orm_migration::prelude::*;

mod m20260301_000001_create_users;
mod m20260301_000002_create_roles;
mod m20260301_000003_create_user_roles;
mod m20260301_000004_create_role_permissions;
mod m20260301_000005_create_app_settings;
mod m20260301_000006_create_audit_logs;
mod m20260302_000001_create_smtp_configs;
mod m20260302_000002_create_email_templates;
mod m20260303_000001_create_backups;
mod m20260304_000001_create_jobs;
mod m20260305_000001_seed_defaults;
mod m20260306_000001_add_user_lockout;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_create_users::Migration),
            Box::new(m20260301_000002_create_roles::Migration),
            Box::new(m20260301_000003_create_user_roles::Migration),
            Box::new(m20260301_000004_create_role_permissions::Migration),
            Box::new(m20260301_000005_create_app_settings::Migration),
            Box::new(m20260301_000006_create_audit_logs::Migration),
            Box::new(m20260302_000001_create_smtp_configs::Migration),
            Box::new(m20260302_000002_create_email_templates::Migration),
            Box::new(m20260303_000001_create_backups::Migration),
            Box::new(m20260304_000001_create_jobs::Migration),
            Box::new(m20260305_000001_seed_defaults::Migration),
            Box::new(m20260306_000001_add_user_lockout::Migration),
        ]
    }
}

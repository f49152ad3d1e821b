use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, Set};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        seed_roles(db).await?;
        seed_email_templates(db).await?;

        Ok(())
    }

    async fn down(&self, _manager: &SchemaManager) -> Result<(), DbErr> {
        // Seeding is not reversible - data may have been modified
        Ok(())
    }
}

async fn seed_roles(db: &SchemaManagerConnection<'_>) -> Result<(), DbErr> {
    use crate::models::prelude::*;
    use crate::models::{role, role_permission};

    let role_count = Role::find().count(db).await?;
    if role_count > 0 {
        return Ok(());
    }

    let now = chrono::Utc::now();

    let default_roles: [(&str, &str, &[&str]); 3] = [
        ("admin", "Full administrator access", &["*"]),
        (
            "editor",
            "Manages settings, mail and backups",
            &[
                "users.view",
                "roles.view",
                "settings.view",
                "settings.manage",
                "mail.view",
                "mail.manage",
                "backups.view",
                "backups.manage",
                "jobs.view",
                "system.view",
                "audit.view",
            ],
        ),
        (
            "viewer",
            "Read-only access to the back office",
            &[
                "settings.view",
                "mail.view",
                "backups.view",
                "jobs.view",
                "system.view",
            ],
        ),
    ];

    for (name, description, permissions) in default_roles {
        let created = role::ActiveModel {
            name: Set(String::from(name)),
            description: Set(Some(String::from(description))),
            is_system: Set(true),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?;

        for perm in permissions {
            role_permission::ActiveModel {
                role_id: Set(created.id),
                permission: Set(String::from(*perm)),
                ..Default::default()
            }
            .insert(db)
            .await?;
        }
    }

    Ok(())
}

async fn seed_email_templates(db: &SchemaManagerConnection<'_>) -> Result<(), DbErr> {
    use crate::models::email_template;
    use crate::models::prelude::*;

    if EmailTemplate::find().count(db).await? > 0 {
        return Ok(());
    }

    let now = chrono::Utc::now();

    let templates = [
        (
            "welcome",
            "account",
            "Welcome to {{ app_name }}, {{ name }}",
            "<p>Hello {{ name }},</p><p>Your account on {{ app_name }} is ready.</p>",
            "Hello {{ name }},\n\nYour account on {{ app_name }} is ready.",
            r#"["app_name","name"]"#,
        ),
        (
            "password_reset",
            "account",
            "Reset your {{ app_name }} password",
            "<p>Hello {{ name }},</p><p><a href=\"{{ reset_url }}\">Reset your password</a></p>",
            "Hello {{ name }},\n\nReset your password: {{ reset_url }}",
            r#"["app_name","name","reset_url"]"#,
        ),
        (
            "backup_failed",
            "system",
            "[{{ app_name }}] Backup {{ backup_name }} failed",
            "<p>Backup <strong>{{ backup_name }}</strong> failed:</p><pre>{{ error }}</pre>",
            "Backup {{ backup_name }} failed:\n\n{{ error }}",
            r#"["app_name","backup_name","error"]"#,
        ),
        (
            "job_failed",
            "system",
            "[{{ app_name }}] Job {{ job_type }} failed",
            "<p>Job <strong>{{ job_type }}</strong> on queue {{ queue }} failed:</p><pre>{{ error }}</pre>",
            "Job {{ job_type }} on queue {{ queue }} failed:\n\n{{ error }}",
            r#"["app_name","job_type","queue","error"]"#,
        ),
        (
            "test_email",
            "system",
            "{{ app_name }} test email",
            "<p>This is a test email sent at {{ sent_at }}.</p>",
            "This is a test email sent at {{ sent_at }}.",
            r#"["app_name","sent_at"]"#,
        ),
    ];

    for (name, category, subject, html, text, variables) in templates {
        email_template::ActiveModel {
            name: Set(String::from(name)),
            subject: Set(String::from(subject)),
            body_html: Set(String::from(html)),
            body_text: Set(Some(String::from(text))),
            variables: Set(String::from(variables)),
            category: Set(String::from(category)),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?;
    }

    Ok(())
}

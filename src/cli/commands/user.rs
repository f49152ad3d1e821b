use anyhow::Result;
use clap::Subcommand;

use crate::cli::output::{self, print_table};
use crate::models::audit_log::{AuditAction, ResourceType};
use crate::services::accounts::{self, NewUser};
use crate::services::audit::Actor;
use crate::services::security::generate_secure_password;
use crate::state::AppState;

const GENERATED_PASSWORD_LENGTH: usize = 20;

#[derive(Debug, Subcommand)]
pub enum UserCommand {
    /// Create a user
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        /// Generated and printed when omitted
        #[arg(long, env = "BACKOFFICE_USER_PASSWORD")]
        password: Option<String>,
        /// Role names to assign
        #[arg(long = "role")]
        roles: Vec<String>,
        /// Mark the email address as verified
        #[arg(long)]
        verified: bool,
    },
    /// Give a user a role
    AssignRole {
        email: String,
        role: String,
        /// Remove the role instead
        #[arg(long)]
        remove: bool,
    },
    /// Lift a lockout caused by failed logins
    Unlock { email: String },
    /// List users with their roles
    List,
}

pub async fn run(state: &AppState, command: UserCommand) -> Result<()> {
    let actor = Actor::console();
    match command {
        UserCommand::Create {
            name,
            email,
            password,
            roles,
            verified,
        } => {
            let generated = password.is_none();
            let password =
                password.unwrap_or_else(|| generate_secure_password(GENERATED_PASSWORD_LENGTH));
            state.settings.security_policy().await?.check_password(&password)?;

            let mut role_models = Vec::new();
            for role in &roles {
                role_models.push(accounts::find_role_by_name(&state.db, role).await?);
            }

            let created = accounts::create_user(
                &state.db,
                NewUser {
                    name,
                    email,
                    password: password.clone(),
                    verified,
                },
            )
            .await?;
            for role in &role_models {
                accounts::assign_role(&state.db, created.id, role.id).await?;
            }

            state
                .audit
                .log_success(
                    AuditAction::UserCreated,
                    ResourceType::User,
                    Some(created.id.to_string()),
                    &actor,
                    Some(serde_json::json!({ "email": created.email, "roles": roles })),
                )
                .await;

            output::success(format!("User {} <{}> created", created.name, created.email));
            if generated {
                println!("Generated password: {}", password);
            }
        }
        UserCommand::AssignRole {
            email,
            role,
            remove,
        } => {
            let user = accounts::find_user_by_email(&state.db, &email).await?;
            let role = accounts::find_role_by_name(&state.db, &role).await?;

            if remove {
                if !accounts::unassign_role(&state.db, user.id, role.id).await? {
                    anyhow::bail!("{} does not have the {} role", user.email, role.name);
                }
                state
                    .audit
                    .log_success(
                        AuditAction::RoleUnassigned,
                        ResourceType::User,
                        Some(user.id.to_string()),
                        &actor,
                        Some(serde_json::json!({ "role": role.name })),
                    )
                    .await;
                output::success(format!("Removed role {} from {}", role.name, user.email));
            } else {
                accounts::assign_role(&state.db, user.id, role.id).await?;
                state
                    .audit
                    .log_success(
                        AuditAction::RoleAssigned,
                        ResourceType::User,
                        Some(user.id.to_string()),
                        &actor,
                        Some(serde_json::json!({ "role": role.name })),
                    )
                    .await;
                output::success(format!("Assigned role {} to {}", role.name, user.email));
            }
        }
        UserCommand::Unlock { email } => {
            let user = accounts::find_user_by_email(&state.db, &email).await?;
            let user = accounts::unlock_user(&state.db, user.id).await?;
            state
                .audit
                .log_success(
                    AuditAction::UserUpdated,
                    ResourceType::User,
                    Some(user.id.to_string()),
                    &actor,
                    Some(serde_json::json!({ "unlocked": true })),
                )
                .await;
            output::success(format!("Unlocked {}", user.email));
        }
        UserCommand::List => {
            let now = chrono::Utc::now();
            let mut rows = Vec::new();
            for user in accounts::list_users(&state.db).await? {
                let roles: Vec<String> = accounts::get_user_roles(&state.db, user.id)
                    .await?
                    .into_iter()
                    .map(|r| r.name)
                    .collect();
                rows.push(vec![
                    user.id.to_string(),
                    user.name.clone(),
                    user.email.clone(),
                    match (user.is_active, accounts::lockout_remaining(&user, now)) {
                        (false, _) => "disabled",
                        (true, Some(_)) => "locked",
                        (true, None) => "active",
                    }
                    .to_string(),
                    if user.email_verified_at.is_some() { "yes" } else { "no" }.to_string(),
                    roles.join(", "),
                ]);
            }
            print_table(&["ID", "Name", "Email", "State", "Verified", "Roles"], &rows);
        }
    }
    Ok(())
}
